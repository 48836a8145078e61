//! Task instance side of an array job: `jobdesc run -- <command>`.
pub mod program;
pub mod signals;

use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::Signal;
use signal_hook::consts::{SIGINT, SIGTERM};
use tokio::sync::Notify;

use crate::ArrayTaskId;
use crate::common::env::{JOBDESC_ARRAY_JOB_ID, JOBDESC_ARRAY_TASK_ID};
use crate::common::manager::common::EnvLookup;
use crate::common::manager::info::{InstanceIds, ManagerSelector, detect_instance_ids};
use crate::launcher::program::{
    SPAWN_FAILED_EXIT_CODE, StopReason, command_from_argv, exit_code_of, signal_name,
    wait_with_stop,
};
use crate::launcher::signals::SignalThread;

pub struct LaunchConfig {
    pub selector: ManagerSelector,
    pub job_id: Option<String>,
    pub task_id: Option<ArrayTaskId>,
    pub kill_wait: Duration,
    pub command: Vec<String>,
}

/// Combines the identity found in the environment with explicitly passed ids.
pub fn resolve_instance_ids(
    selector: ManagerSelector,
    job_id: Option<String>,
    task_id: Option<ArrayTaskId>,
    env: &impl EnvLookup,
) -> anyhow::Result<InstanceIds> {
    let detected = match (&job_id, task_id) {
        (Some(_), Some(_)) => None,
        _ => detect_instance_ids(selector, env)?,
    };
    match (detected, job_id) {
        (Some(mut ids), job_id) => {
            if let Some(job_id) = job_id {
                ids.array_job_id = job_id;
            }
            if let Some(task_id) = task_id {
                ids.array_task_id = task_id;
            }
            Ok(ids)
        }
        (None, Some(job_id)) => Ok(InstanceIds::new(None, job_id, task_id.unwrap_or(0))),
        (None, None) => anyhow::bail!(
            "Cannot determine the array job id. Run the command inside a Slurm or PBS job, \
             set {JOBDESC_ARRAY_JOB_ID} and {JOBDESC_ARRAY_TASK_ID}, or pass --job-id"
        ),
    }
}

pub fn write_diagnostics<W: Write>(
    writer: &mut W,
    ids: &InstanceIds,
    hostname: &str,
) -> std::io::Result<()> {
    writeln!(writer, "My array job id is {}.", ids.array_job_id)?;
    writeln!(writer, "My array task id is {}.", ids.array_task_id)?;
    writeln!(writer, "Executing on the machine: {hostname}")?;
    writer.flush()
}

pub fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Variables that identify the instance to the command.
pub fn instance_env(ids: &InstanceIds) -> Vec<(&'static str, String)> {
    vec![
        (JOBDESC_ARRAY_JOB_ID, ids.array_job_id.clone()),
        (JOBDESC_ARRAY_TASK_ID, ids.array_task_id.to_string()),
    ]
}

/// Runs `command` as the given instance and returns the exit code that the instance
/// should report. The command is stopped when `stop` resolves.
pub async fn launch<S: Future<Output = StopReason>>(
    ids: &InstanceIds,
    command: &[String],
    kill_wait: Duration,
    stop: S,
) -> i32 {
    let child = command_from_argv(command, instance_env(ids), None)
        .and_then(|mut command| Ok(command.spawn()?));
    let child = match child {
        Ok(child) => child,
        Err(error) => {
            let program = command.first().map(String::as_str).unwrap_or_default();
            log::error!("Cannot start `{program}`: {error}");
            return SPAWN_FAILED_EXIT_CODE;
        }
    };

    match wait_with_stop(child, stop, kill_wait).await {
        Ok(end) => {
            let code = exit_code_of(&end.status);
            if let Some(reason) = end.stopped {
                log::info!("Command was stopped ({reason:?}), exit code {code}");
            } else if let Some(signal) = end.status.signal() {
                log::warn!(
                    "Command was terminated by signal {signal} ({})",
                    signal_name(signal)
                );
            }
            code
        }
        Err(error) => {
            log::error!("Waiting for the command failed: {error}");
            1
        }
    }
}

/// Entry point of `jobdesc run`.
pub async fn run_launcher(config: LaunchConfig, env: &impl EnvLookup) -> anyhow::Result<i32> {
    if config.command.is_empty() {
        anyhow::bail!("No command to run");
    }
    let ids = resolve_instance_ids(config.selector, config.job_id, config.task_id, env)?;

    let mut stdout = std::io::stdout().lock();
    write_diagnostics(&mut stdout, &ids, &hostname()).context("Cannot write to stdout")?;
    drop(stdout);

    let notify = Arc::new(Notify::new());
    let received = Arc::new(AtomicI32::new(SIGTERM));
    let _signal_thread = {
        let notify = notify.clone();
        let received = received.clone();
        SignalThread::new(&[SIGINT, SIGTERM], move |signal| {
            received.store(signal, Ordering::SeqCst);
            notify.notify_one();
        })?
    };
    let stop = async move {
        notify.notified().await;
        let signal = Signal::try_from(received.load(Ordering::SeqCst)).unwrap_or(Signal::SIGTERM);
        StopReason::Signal(signal)
    };

    Ok(launch(&ids, &config.command, config.kill_wait, stop).await)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::common::manager::common::env_from;
    use crate::common::manager::info::{InstanceIds, ManagerSelector, ManagerType};
    use crate::launcher::program::SPAWN_FAILED_EXIT_CODE;
    use crate::launcher::{launch, resolve_instance_ids, write_diagnostics};

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn diagnostics_lines() {
        let mut buffer = vec![];
        write_diagnostics(
            &mut buffer,
            &InstanceIds::new(Some(ManagerType::Slurm), "4641914", 0),
            "node42",
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "My array job id is 4641914.\nMy array task id is 0.\nExecuting on the machine: node42\n"
        );
    }

    #[test]
    fn explicit_ids_skip_detection() {
        let env = env_from(&[]);
        let ids =
            resolve_instance_ids(ManagerSelector::Auto, Some("7".to_string()), Some(2), &env)
                .unwrap();
        assert_eq!(ids, InstanceIds::new(None, "7", 2));
    }

    #[test]
    fn task_id_overrides_detected_pbs_job() {
        let env = env_from(&[("PBS_ENVIRONMENT", "PBS_BATCH"), ("PBS_JOBID", "99.srv")]);
        let ids = resolve_instance_ids(ManagerSelector::Auto, None, Some(5), &env).unwrap();
        assert_eq!(ids, InstanceIds::new(Some(ManagerType::Pbs), "99.srv", 5));
    }

    #[test]
    fn missing_identity() {
        let env = env_from(&[]);
        assert!(resolve_instance_ids(ManagerSelector::Auto, None, None, &env).is_err());
        let env = env_from(&[("SLURM_JOB_ID", "1")]);
        assert!(resolve_instance_ids(ManagerSelector::Pbs, None, None, &env).is_err());
    }

    #[tokio::test]
    async fn propagate_exit_code() {
        let ids = InstanceIds::new(None, "1", 0);
        let never = futures::future::pending();
        assert_eq!(launch(&ids, &sh("exit 0"), Duration::from_secs(1), never).await, 0);
        let never = futures::future::pending();
        assert_eq!(launch(&ids, &sh("exit 42"), Duration::from_secs(1), never).await, 42);
    }

    #[tokio::test]
    async fn command_sees_instance_ids() {
        let ids = InstanceIds::new(None, "100", 3);
        let never = futures::future::pending();
        let code = launch(
            &ids,
            &sh(r#"test "$JOBDESC_ARRAY_JOB_ID-$JOBDESC_ARRAY_TASK_ID" = "100-3""#),
            Duration::from_secs(1),
            never,
        )
        .await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn spawn_failure() {
        let ids = InstanceIds::new(None, "1", 0);
        let never = futures::future::pending();
        let code = launch(
            &ids,
            &["/nonexistent/jobdesc-program".to_string()],
            Duration::from_secs(1),
            never,
        )
        .await;
        assert_eq!(code, SPAWN_FAILED_EXIT_CODE);
    }
}
