use std::time::Duration;

use anyhow::anyhow;
use nom::branch::alt;
use nom::character::complete::char;
use nom::combinator::{map_res, opt};
use nom::sequence::{preceded, tuple};
use nom::Parser;
use nom_supreme::ParserExt;

use crate::common::env::{SLURM_ARRAY_JOB_ID, SLURM_ARRAY_TASK_ID, SLURM_JOB_ID, SLURM_JOBID};
use crate::common::manager::common::{EnvLookup, parse_task_id};
use crate::common::manager::info::{InstanceIds, ManagerType};
use crate::common::memory::{GIB, KIB, MIB, TIB, split_memory_units};
use crate::common::parser::{NomResult, consume_all, p_u32};
use crate::common::utils::time::format_hms;

/// Format a duration as a SLURM time string, e.g. 01:05:02
pub fn format_slurm_duration(duration: &Duration) -> String {
    format_hms(duration)
}

/// Format memory for `--mem-per-cpu`, using the largest unit that represents it exactly.
pub fn format_slurm_memory(bytes: u64) -> String {
    let (amount, unit) =
        split_memory_units(bytes, &[(KIB, "K"), (MIB, "M"), (GIB, "G"), (TIB, "T")]);
    format!("{amount}{unit}")
}

fn to_duration(days: u32, hours: u32, minutes: u32, seconds: u32) -> Duration {
    Duration::from_secs(
        days as u64 * 86400 + hours as u64 * 3600 + minutes as u64 * 60 + seconds as u64,
    )
}

fn p_clock_part(input: &str) -> NomResult<Option<u32>> {
    opt(preceded(char(':'), p_u32))(input)
}

fn p_slurm_duration(input: &str) -> NomResult<Duration> {
    let with_days = map_res(
        tuple((p_u32, char('-'), p_u32, p_clock_part, p_clock_part)),
        |parsed| match parsed {
            (days, _, hours, None, None) => Ok(to_duration(days, hours, 0, 0)),
            (days, _, hours, Some(minutes), None) => Ok(to_duration(days, hours, minutes, 0)),
            (days, _, hours, Some(minutes), Some(seconds)) => {
                Ok(to_duration(days, hours, minutes, seconds))
            }
            _ => Err(anyhow!("Invalid time specification")),
        },
    );
    let without_days = map_res(tuple((p_u32, p_clock_part, p_clock_part)), |parsed| {
        match parsed {
            (minutes, None, None) => Ok(to_duration(0, 0, minutes, 0)),
            (minutes, Some(seconds), None) => Ok(to_duration(0, 0, minutes, seconds)),
            (hours, Some(minutes), Some(seconds)) => Ok(to_duration(0, hours, minutes, seconds)),
            _ => Err(anyhow!("Invalid time specification")),
        }
    });
    alt((with_days, without_days))
        .context("Slurm time limit")
        .parse(input)
}

/// Parses time in the formats accepted by `sbatch --time`: `M`, `M:S`, `H:M:S`, `D-H`,
/// `D-H:M` and `D-H:M:S`.
pub fn parse_slurm_duration(value: &str) -> anyhow::Result<Duration> {
    consume_all(p_slurm_duration, value.trim())
}

/// Extracts the job id from `sbatch` output (`Submitted batch job <id>`).
pub fn parse_sbatch_job_id(output: &str) -> anyhow::Result<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Submitted batch job "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(|id| id.to_string())
        .ok_or_else(|| anyhow!("Missing job id in sbatch output: {output}"))
}

pub fn try_get_slurm_ids(env: &impl EnvLookup) -> anyhow::Result<Option<InstanceIds>> {
    log::debug!("Detecting SLURM environment");

    if let (Some(job_id), Some(task_id)) =
        (env.lookup(SLURM_ARRAY_JOB_ID), env.lookup(SLURM_ARRAY_TASK_ID))
    {
        let task_id = parse_task_id(SLURM_ARRAY_TASK_ID, &task_id)?;
        return Ok(Some(InstanceIds::new(
            Some(ManagerType::Slurm),
            job_id,
            task_id,
        )));
    }

    Ok(env
        .lookup(SLURM_JOB_ID)
        .or_else(|| env.lookup(SLURM_JOBID))
        .map(|job_id| InstanceIds::new(Some(ManagerType::Slurm), job_id, 0)))
}

#[cfg(test)]
mod test {
    use crate::common::manager::slurm::{
        format_slurm_memory, parse_sbatch_job_id, parse_slurm_duration,
    };
    use crate::common::memory::{GIB, KIB, MIB};
    use std::time::Duration;

    fn hms(hours: u64, minutes: u64, seconds: u64) -> Duration {
        Duration::from_secs(hours * 3600 + minutes * 60 + seconds)
    }

    #[test]
    fn test_parse_slurm_duration() {
        assert_eq!(parse_slurm_duration("10:20:30").unwrap(), hms(10, 20, 30));
        assert_eq!(parse_slurm_duration("15:59:00").unwrap(), hms(15, 59, 0));
        assert_eq!(
            parse_slurm_duration("17-01:00:11").unwrap(),
            hms(17 * 24 + 1, 0, 11)
        );
    }

    #[test]
    fn test_parse_slurm_duration_short_forms() {
        assert_eq!(parse_slurm_duration("30").unwrap(), hms(0, 30, 0));
        assert_eq!(parse_slurm_duration("30:15").unwrap(), hms(0, 30, 15));
        assert_eq!(parse_slurm_duration("2-12").unwrap(), hms(60, 0, 0));
        assert_eq!(parse_slurm_duration("1-02:30").unwrap(), hms(26, 30, 0));
    }

    #[test]
    fn test_parse_slurm_duration_invalid() {
        assert!(parse_slurm_duration("").is_err());
        assert!(parse_slurm_duration("1-").is_err());
        let error = parse_slurm_duration("UNLIMITED").unwrap_err().to_string();
        assert!(error.contains("expected Slurm time limit"), "{error}");
        assert!(parse_slurm_duration("1:2:3:4").is_err());
    }

    #[test]
    fn test_format_slurm_memory() {
        assert_eq!(format_slurm_memory(40 * GIB), "40G");
        assert_eq!(format_slurm_memory(512 * MIB), "512M");
        assert_eq!(format_slurm_memory(1536 * MIB), "1536M");
        assert_eq!(format_slurm_memory(3 * KIB), "3K");
        assert_eq!(format_slurm_memory(100), "1K");
    }

    #[test]
    fn test_parse_sbatch_output() {
        assert_eq!(
            parse_sbatch_job_id("Submitted batch job 4641914").unwrap(),
            "4641914"
        );
        assert_eq!(
            parse_sbatch_job_id("Submitted batch job 77 on cluster c1\n").unwrap(),
            "77"
        );
        assert!(parse_sbatch_job_id("sbatch: error: invalid partition").is_err());
    }
}
