use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::ArrayTaskId;
use crate::common::env::{JOBDESC_ARRAY_JOB_ID, JOBDESC_ARRAY_TASK_ID};
use crate::common::manager::common::{EnvLookup, parse_task_id};
use crate::common::manager::{pbs, slurm};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ManagerType {
    Slurm,
    Pbs,
}

impl ManagerType {
    /// Name used on the command line (`--manager slurm`).
    pub fn cli_name(&self) -> &'static str {
        match self {
            ManagerType::Slurm => "slurm",
            ManagerType::Pbs => "pbs",
        }
    }
}

impl Display for ManagerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerType::Pbs => f.write_str("PBS"),
            ManagerType::Slurm => f.write_str("SLURM"),
        }
    }
}

/// Where should a task instance look for its identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ManagerSelector {
    /// Try Slurm, then PBS, then variables set by `jobdesc local`
    #[default]
    Auto,
    Slurm,
    Pbs,
    Local,
}

/// Identity of a single task instance of an array job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceIds {
    /// `None` when the identity was not provided by a cluster scheduler
    pub manager: Option<ManagerType>,
    pub array_job_id: String,
    pub array_task_id: ArrayTaskId,
}

impl InstanceIds {
    pub fn new(
        manager: Option<ManagerType>,
        array_job_id: impl Into<String>,
        array_task_id: ArrayTaskId,
    ) -> Self {
        Self {
            manager,
            array_job_id: array_job_id.into(),
            array_task_id,
        }
    }
}

fn try_get_local_ids(env: &impl EnvLookup) -> anyhow::Result<Option<InstanceIds>> {
    log::debug!("Detecting jobdesc local environment");
    match (
        env.lookup(JOBDESC_ARRAY_JOB_ID),
        env.lookup(JOBDESC_ARRAY_TASK_ID),
    ) {
        (Some(job_id), Some(task_id)) => Ok(Some(InstanceIds::new(
            None,
            job_id,
            parse_task_id(JOBDESC_ARRAY_TASK_ID, &task_id)?,
        ))),
        _ => Ok(None),
    }
}

/// Finds out which array job and task the current process belongs to.
pub fn detect_instance_ids(
    selector: ManagerSelector,
    env: &impl EnvLookup,
) -> anyhow::Result<Option<InstanceIds>> {
    match selector {
        ManagerSelector::Slurm => slurm::try_get_slurm_ids(env),
        ManagerSelector::Pbs => pbs::try_get_pbs_ids(env),
        ManagerSelector::Local => try_get_local_ids(env),
        ManagerSelector::Auto => {
            if let Some(ids) = slurm::try_get_slurm_ids(env)? {
                return Ok(Some(ids));
            }
            if let Some(ids) = pbs::try_get_pbs_ids(env)? {
                return Ok(Some(ids));
            }
            try_get_local_ids(env)
        }
    }
}
