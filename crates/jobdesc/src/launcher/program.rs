use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use futures::future::Either;
use nix::sys::signal::{self, Signal};
use tokio::process::{Child, Command};

use crate::common::error::error;

/// Exit code reported when the program could not be started.
pub const SPAWN_FAILED_EXIT_CODE: i32 = 127;

/// Why a running program was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The launcher itself received the signal
    Signal(Signal),
    TimeLimit,
    Interrupted,
}

impl StopReason {
    /// Signal sent to the process group first.
    fn signal(&self) -> Signal {
        match self {
            StopReason::Signal(signal) => *signal,
            StopReason::TimeLimit | StopReason::Interrupted => Signal::SIGTERM,
        }
    }
}

#[derive(Debug)]
pub struct ProgramEnd {
    pub status: ExitStatus,
    /// Set if the program was asked to stop before it finished on its own
    pub stopped: Option<StopReason>,
}

/// Creates a command that runs `argv` in its own session, so that signals can be
/// delivered to its whole process group without reaching the launcher.
pub fn command_from_argv<K: AsRef<str>, V: AsRef<str>>(
    argv: &[String],
    env: impl IntoIterator<Item = (K, V)>,
    cwd: Option<&Path>,
) -> crate::Result<Command> {
    let Some((program, args)) = argv.split_first() else {
        return error("No command arguments".to_string());
    };

    let mut command = Command::new(program);

    #[cfg(target_os = "linux")]
    unsafe {
        command.pre_exec(|| {
            if let Err(error) = nix::unistd::setsid() {
                log::error!("Cannot set SID for the program: {error:?}");
            }
            // Terminate the program when the launcher dies
            if let Err(error) = nix::sys::prctl::set_pdeathsig(Signal::SIGTERM) {
                log::error!("Cannot set PR_SET_PDEATHSIG for the program: {error:?}");
            }
            Ok(())
        });
    }

    command.kill_on_drop(true);
    command.args(args);
    for (key, value) in env {
        command.env(key.as_ref(), value.as_ref());
    }
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    Ok(command)
}

/// Sends `signal` to the process group led by `pid`.
pub fn signal_process_group(pid: u32, signal: Signal) -> crate::Result<()> {
    let pid = nix::unistd::Pid::from_raw(pid as i32);
    let pgid = nix::unistd::getpgid(Some(pid))
        .map_err(|error| format!("Cannot get PGID for PID {pid}: {error:?}"))?;
    signal::killpg(pgid, Some(signal))
        .map_err(|error| format!("Cannot send signal {signal} to PGID {pgid}: {error:?}"))?;
    Ok(())
}

/// Waits until `child` exits. If `stop` resolves first, the process group of the child
/// receives a termination signal and, if it is still alive after `kill_wait`, SIGKILL.
pub async fn wait_with_stop<S: Future<Output = StopReason>>(
    mut child: Child,
    stop: S,
    kill_wait: Duration,
) -> crate::Result<ProgramEnd> {
    let Some(pid) = child.id() else {
        // Already reaped
        let status = child.wait().await?;
        return Ok(ProgramEnd {
            status,
            stopped: None,
        });
    };

    let reason = {
        let wait_fut = child.wait();
        futures::pin_mut!(wait_fut);
        futures::pin_mut!(stop);

        match futures::future::select(wait_fut, stop).await {
            Either::Left((status, _)) => {
                return Ok(ProgramEnd {
                    status: status?,
                    stopped: None,
                });
            }
            Either::Right((reason, _)) => reason,
        }
    };

    log::debug!(
        "Stopping process {pid} ({reason:?}) with {}",
        reason.signal()
    );
    if let Err(error) = signal_process_group(pid, reason.signal()) {
        log::warn!("{error}");
    }

    let status = match tokio::time::timeout(kill_wait, child.wait()).await {
        Ok(status) => {
            log::debug!("Process {pid} has ended gracefully after a signal");
            status?
        }
        Err(_) => {
            if let Err(error) = signal_process_group(pid, Signal::SIGKILL) {
                log::error!("Unable to kill process {pid}: {error}");
            } else {
                log::debug!("Process {pid} has been killed");
            }
            child.wait().await?
        }
    };
    Ok(ProgramEnd {
        status,
        stopped: Some(reason),
    })
}

/// Exit code of a finished program the way a shell reports it.
pub fn exit_code_of(status: &ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

/// Provide a user-friendly name of a signal.
pub fn signal_name(signal: i32) -> &'static str {
    Signal::try_from(signal)
        .map(|signal| signal.as_str())
        .unwrap_or("unknown")
}
