use clap::Parser;

use crate::ArrayTaskId;
use crate::common::manager::common::ProcessEnv;
use crate::common::manager::info::ManagerSelector;
use crate::common::utils::time::ArgDuration;
use crate::launcher::{LaunchConfig, run_launcher};

#[derive(Parser)]
pub struct RunOpts {
    /// Where to look for the array job id and array task id
    #[arg(long, value_enum, default_value_t = ManagerSelector::Auto)]
    pub manager: ManagerSelector,

    /// Array job id, overrides the detected one
    #[arg(long)]
    pub job_id: Option<String>,

    /// Array task id, overrides the detected one
    #[arg(long)]
    pub task_id: Option<ArrayTaskId>,

    /// How long to wait after forwarding a termination signal before the command is killed
    #[arg(long, default_value = "30s", value_name = "DURATION")]
    pub kill_wait: ArgDuration,

    /// Command to execute
    #[arg(trailing_var_arg(true), required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Runs a single task instance and returns its exit code.
pub async fn command_run(opts: RunOpts) -> anyhow::Result<i32> {
    let config = LaunchConfig {
        selector: opts.manager,
        job_id: opts.job_id,
        task_id: opts.task_id,
        kill_wait: opts.kill_wait.unpack(),
        command: opts.command,
    };
    run_launcher(config, &ProcessEnv).await
}
