use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use crate::client::globalsettings::GlobalSettings;
use crate::descriptor::directives::import_script_from_file;
use crate::descriptor::jobfile::{JOB_FILE_TEMPLATE, JobDef};

#[derive(Parser)]
pub struct ImportOpts {
    /// Batch script with `#SBATCH` directives
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub script: PathBuf,

    /// Write the job file into a file instead of stdout
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub out: Option<PathBuf>,

    /// Overwrite an existing job file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser)]
pub struct InitOpts {
    /// Where to write the job file [default: the global job file]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub path: Option<PathBuf>,

    /// Overwrite an existing job file
    #[arg(long)]
    pub force: bool,
}

fn write_job_file(path: &Path, content: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Job file {} already exists, use --force to overwrite it",
            path.display()
        );
    }
    std::fs::write(path, content)
        .with_context(|| format!("Cannot write job file {}", path.display()))
}

pub fn command_import(gsettings: &GlobalSettings, opts: ImportOpts) -> anyhow::Result<()> {
    let jdef = import_script_from_file(&opts.script)?;
    let content = jdef.to_toml()?;
    // Validate before anything is written
    let descriptor = jdef.into_descriptor()?;

    match opts.out {
        Some(path) => {
            write_job_file(&path, &content, opts.force)?;
            gsettings.printer().print_job_file_written(&path, &descriptor);
        }
        None => gsettings.printer().print_job_file(&content),
    }
    Ok(())
}

pub fn command_init(gsettings: &GlobalSettings, opts: InitOpts) -> anyhow::Result<()> {
    let path = opts
        .path
        .unwrap_or_else(|| gsettings.job_file().to_path_buf());
    let descriptor = JobDef::parse(JOB_FILE_TEMPLATE)?.into_descriptor()?;
    write_job_file(&path, JOB_FILE_TEMPLATE, opts.force)?;
    gsettings.printer().print_job_file_written(&path, &descriptor);
    Ok(())
}
