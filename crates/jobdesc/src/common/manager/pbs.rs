use std::time::Duration;

use crate::common::env::{PBS_ARRAY_ID, PBS_ARRAY_INDEX, PBS_ENVIRONMENT, PBS_JOBID};
use crate::common::manager::common::{EnvLookup, parse_task_id};
use crate::common::manager::info::{InstanceIds, ManagerType};
use crate::common::memory::{GIB, KIB, MIB, TIB, split_memory_units};
use crate::common::utils::time::format_hms;

/// Format a duration as a PBS time string, e.g. 01:05:02
pub fn format_pbs_duration(duration: &Duration) -> String {
    format_hms(duration)
}

/// Format memory as a PBS size value (`40gb`), rounded up to kilobytes.
pub fn format_pbs_memory(bytes: u64) -> String {
    let (amount, unit) =
        split_memory_units(bytes, &[(KIB, "kb"), (MIB, "mb"), (GIB, "gb"), (TIB, "tb")]);
    format!("{amount}{unit}")
}

/// `qsub` prints just the job id.
pub fn parse_qsub_job_id(output: &str) -> anyhow::Result<String> {
    match output.trim() {
        "" => anyhow::bail!("qsub did not print a job id"),
        id => Ok(id.to_string()),
    }
}

pub fn try_get_pbs_ids(env: &impl EnvLookup) -> anyhow::Result<Option<InstanceIds>> {
    log::debug!("Detecting PBS environment");

    if let (Some(job_id), Some(task_id)) = (env.lookup(PBS_ARRAY_ID), env.lookup(PBS_ARRAY_INDEX))
    {
        let task_id = parse_task_id(PBS_ARRAY_INDEX, &task_id)?;
        return Ok(Some(InstanceIds::new(Some(ManagerType::Pbs), job_id, task_id)));
    }
    if env.lookup(PBS_ENVIRONMENT).is_none() {
        return Ok(None);
    }
    Ok(env
        .lookup(PBS_JOBID)
        .map(|job_id| InstanceIds::new(Some(ManagerType::Pbs), job_id, 0)))
}
