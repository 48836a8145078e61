//! Emulates a scheduler on the current machine: every index of the array becomes one
//! instance of the command.
use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::watch;

use crate::ArrayTaskId;
use crate::common::env::{
    JOBDESC_JOB_NAME, SLURM_ARRAY_JOB_ID, SLURM_ARRAY_TASK_ID, SLURM_JOB_NAME,
};
use crate::common::manager::info::InstanceIds;
use crate::common::placeholders::{TemplateValues, resolve_log_path};
use crate::common::utils::fs::{create_parent_dir, resolve_path};
use crate::descriptor::JobDescriptor;
use crate::launcher::program::{StopReason, command_from_argv, wait_with_stop};
use crate::launcher::{instance_env, write_diagnostics};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceStatus {
    Finished,
    Failed {
        exit_code: Option<i32>,
        signal: Option<i32>,
    },
    TimedOut,
    /// Stopped, or never started, because the local run was interrupted
    Interrupted,
    SpawnFailed {
        message: String,
    },
}

impl InstanceStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, InstanceStatus::Finished)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceOutcome {
    pub task_id: ArrayTaskId,
    pub status: InstanceStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub hostname: String,
}

/// Result of `jobdesc local`.
#[derive(Debug, Serialize)]
pub struct LocalRunReport {
    pub job_name: String,
    pub job_id: String,
    /// Sorted by task id
    pub instances: Vec<InstanceOutcome>,
}

impl LocalRunReport {
    pub fn all_finished(&self) -> bool {
        self.instances.iter().all(|i| i.status.is_finished())
    }
}

pub struct LocalRunOptions {
    pub job_id: String,
    /// Defaults to `max_concurrent` of the descriptor or the number of instances
    pub max_parallel: Option<usize>,
    pub kill_wait: Duration,
    /// Directory used when the descriptor has no working directory
    pub base_dir: PathBuf,
    pub hostname: String,
}

/// Job id of a local run that was not given one explicitly.
pub fn default_local_job_id() -> String {
    format!("local-{}", Utc::now().timestamp())
}

struct LocalContext<'a> {
    descriptor: &'a JobDescriptor,
    options: &'a LocalRunOptions,
    workdir: PathBuf,
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    create_parent_dir(path)?;
    File::create(path)
}

async fn wait_for_interrupt(interrupt: &mut watch::Receiver<bool>) {
    if interrupt.wait_for(|interrupted| *interrupted).await.is_err() {
        // Nobody can interrupt the run anymore
        futures::future::pending::<()>().await;
    }
}

/// Creates the log files, writes the diagnostic lines and starts the command.
fn spawn_instance(
    ctx: &LocalContext<'_>,
    ids: &InstanceIds,
    outcome: &InstanceOutcome,
    env: Vec<(String, String)>,
) -> crate::Result<Child> {
    let mut stdout = open_log_file(&outcome.stdout)?;
    let stderr = if outcome.stderr == outcome.stdout {
        stdout.try_clone()?
    } else {
        open_log_file(&outcome.stderr)?
    };
    write_diagnostics(&mut stdout, ids, &ctx.options.hostname)?;

    let mut command = command_from_argv(&ctx.descriptor.command, env, Some(&ctx.workdir))?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    Ok(command.spawn()?)
}

async fn run_instance(
    ctx: &LocalContext<'_>,
    task_id: ArrayTaskId,
    mut interrupt: watch::Receiver<bool>,
) -> InstanceOutcome {
    let descriptor = ctx.descriptor;
    let options = ctx.options;
    let job_id = format!("{}_{task_id}", options.job_id);
    let values = TemplateValues {
        job_name: &descriptor.name,
        array_job_id: &options.job_id,
        array_task_id: task_id,
        job_id: &job_id,
    };
    let stdout_path = resolve_log_path(&descriptor.output, &values, &ctx.workdir);
    let stderr_path = resolve_log_path(&descriptor.error, &values, &ctx.workdir);

    let mut outcome = InstanceOutcome {
        task_id,
        status: InstanceStatus::Interrupted,
        started_at: None,
        finished_at: None,
        stdout: stdout_path,
        stderr: stderr_path,
        hostname: options.hostname.clone(),
    };
    if *interrupt.borrow() {
        return outcome;
    }

    let ids = InstanceIds::new(None, options.job_id.clone(), task_id);
    let mut env: Vec<(String, String)> = descriptor
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    env.extend(
        instance_env(&ids)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v)),
    );
    env.extend([
        (JOBDESC_JOB_NAME.to_string(), descriptor.name.clone()),
        (SLURM_ARRAY_JOB_ID.to_string(), options.job_id.clone()),
        (SLURM_ARRAY_TASK_ID.to_string(), task_id.to_string()),
        (SLURM_JOB_NAME.to_string(), descriptor.name.clone()),
    ]);

    outcome.started_at = Some(Utc::now());
    let spawned = spawn_instance(ctx, &ids, &outcome, env);
    let child = match spawned {
        Ok(child) => child,
        Err(error) => {
            log::error!("Instance {task_id} could not be started: {error}");
            outcome.status = InstanceStatus::SpawnFailed {
                message: error.to_string(),
            };
            outcome.finished_at = Some(Utc::now());
            return outcome;
        }
    };
    log::debug!("Instance {task_id} started");

    let time_limit = descriptor.time_limit;
    let stop = async move {
        tokio::select! {
            _ = tokio::time::sleep(time_limit) => StopReason::TimeLimit,
            _ = wait_for_interrupt(&mut interrupt) => StopReason::Interrupted,
        }
    };

    outcome.status = match wait_with_stop(child, stop, options.kill_wait).await {
        Ok(end) => match end.stopped {
            Some(StopReason::TimeLimit) => InstanceStatus::TimedOut,
            Some(_) => InstanceStatus::Interrupted,
            None if end.status.success() => InstanceStatus::Finished,
            None => InstanceStatus::Failed {
                exit_code: end.status.code(),
                signal: end.status.signal(),
            },
        },
        Err(error) => InstanceStatus::SpawnFailed {
            message: error.to_string(),
        },
    };
    outcome.finished_at = Some(Utc::now());
    log::debug!("Instance {task_id} ended: {:?}", outcome.status);
    outcome
}

/// Runs every instance of the array. Instances that are running when `interrupt`
/// switches to `true` are stopped, instances that have not started yet are skipped.
pub async fn run_local(
    descriptor: &JobDescriptor,
    options: &LocalRunOptions,
    interrupt: watch::Receiver<bool>,
) -> LocalRunReport {
    let workdir = match &descriptor.workdir {
        Some(workdir) => resolve_path(&options.base_dir, workdir),
        None => options.base_dir.clone(),
    };
    let ctx = LocalContext {
        descriptor,
        options,
        workdir,
    };
    let parallelism = options
        .max_parallel
        .or(descriptor.max_concurrent.map(|limit| limit as usize))
        .unwrap_or(descriptor.task_count() as usize)
        .max(1);
    log::info!(
        "Running {} instance(s) of `{}` locally, at most {parallelism} at once",
        descriptor.task_count(),
        descriptor.name
    );

    let mut instances: Vec<InstanceOutcome> = futures::stream::iter(descriptor.task_ids())
        .map(|task_id| run_instance(&ctx, task_id, interrupt.clone()))
        .buffer_unordered(parallelism)
        .collect()
        .await;
    instances.sort_unstable_by_key(|instance| instance.task_id);

    LocalRunReport {
        job_name: descriptor.name.clone(),
        job_id: options.job_id.clone(),
        instances,
    }
}
