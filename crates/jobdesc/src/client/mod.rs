use std::path::PathBuf;

pub mod commands;
pub mod globalsettings;
pub mod output;
pub mod utils;

/// Job file used when none is given on the command line
pub const DEFAULT_JOB_FILE: &str = "jobdesc.toml";

pub fn default_job_file_path() -> PathBuf {
    PathBuf::from(DEFAULT_JOB_FILE)
}
