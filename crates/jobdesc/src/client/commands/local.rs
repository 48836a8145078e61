use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use tokio::sync::watch;

use crate::client::commands::descriptor::{DescriptorOpts, load_descriptor};
use crate::client::globalsettings::GlobalSettings;
use crate::common::utils::time::ArgDuration;
use crate::launcher::hostname;
use crate::launcher::signals::SignalThread;
use crate::local::{LocalRunOptions, default_local_job_id, run_local};

#[derive(Parser)]
pub struct LocalOpts {
    /// Array job id of the run [default: local-<unix time>]
    #[arg(long)]
    pub job_id: Option<String>,

    /// Maximum number of instances running at once
    /// [default: `max_concurrent` of the job, or all instances]
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// How long to wait after SIGTERM before an instance is killed
    #[arg(long, default_value = "30s", value_name = "DURATION")]
    pub kill_wait: ArgDuration,

    #[clap(flatten)]
    pub descriptor: DescriptorOpts,
}

/// Runs all instances on this machine. Returns `true` if every instance has finished
/// successfully.
pub async fn command_local(gsettings: &GlobalSettings, opts: LocalOpts) -> anyhow::Result<bool> {
    let descriptor = load_descriptor(gsettings, opts.descriptor)?;
    let options = LocalRunOptions {
        job_id: opts.job_id.unwrap_or_else(default_local_job_id),
        max_parallel: opts.max_parallel,
        kill_wait: opts.kill_wait.unpack(),
        base_dir: std::env::current_dir()?,
        hostname: hostname(),
    };

    let (interrupt_tx, interrupt_rx) = watch::channel(false);
    let _signal_thread = SignalThread::new(&[SIGINT, SIGTERM], move |_| {
        if !interrupt_tx.send_replace(true) {
            log::warn!("Interrupting all running instances");
        }
    })?;

    let report = run_local(&descriptor, &options, interrupt_rx).await;
    gsettings.printer().print_local_report(&report);
    Ok(report.all_finished())
}
