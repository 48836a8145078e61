use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::client::commands::descriptor::{DescriptorOpts, load_descriptor};
use crate::client::globalsettings::GlobalSettings;
use crate::common::manager::info::ManagerType;
use crate::common::utils::fs::absolute_path;
use crate::emitter::{LauncherMode, RenderOptions, create_emitter, render_script, submit_script};

/// Default directory of submitted scripts
const DEFAULT_SUBMIT_DIR: &str = "jobdesc-submit";

#[derive(Parser)]
pub struct ScriptOpts {
    /// Scheduler whose script should be generated
    #[arg(long, value_enum, default_value_t = ManagerType::Slurm)]
    pub manager: ManagerType,

    /// How the script starts the command
    #[arg(long, value_enum, default_value_t = LauncherMode::Wrapped)]
    pub launcher: LauncherMode,

    #[clap(flatten)]
    pub descriptor: DescriptorOpts,
}

#[derive(Parser)]
pub struct RenderOpts {
    #[clap(flatten)]
    pub script: ScriptOpts,

    /// Write the script into a file instead of stdout
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub out: Option<PathBuf>,
}

#[derive(Parser)]
pub struct SubmitOpts {
    #[clap(flatten)]
    pub script: ScriptOpts,

    /// Directory where the submitted scripts are stored
    #[arg(long, value_hint = clap::ValueHint::DirPath, default_value = DEFAULT_SUBMIT_DIR)]
    pub submit_dir: PathBuf,

    /// Only write the script, do not submit it
    #[arg(long)]
    pub dry_run: bool,
}

fn build_script(gsettings: &GlobalSettings, opts: ScriptOpts) -> anyhow::Result<(String, String)> {
    let descriptor = load_descriptor(gsettings, opts.descriptor)?;
    let options = RenderOptions::new(opts.launcher)?;
    let emitter = create_emitter(opts.manager);
    let script = render_script(emitter.as_ref(), &descriptor, &options)?;
    Ok((descriptor.name, script))
}

pub fn command_render(gsettings: &GlobalSettings, opts: RenderOpts) -> anyhow::Result<()> {
    let manager = opts.script.manager;
    let (_, script) = build_script(gsettings, opts.script)?;
    match opts.out {
        Some(path) => {
            std::fs::write(&path, &script)
                .with_context(|| format!("Cannot write script into {}", path.display()))?;
            gsettings.printer().print_script_written(manager, &path);
        }
        None => gsettings.printer().print_script(manager, &script),
    }
    Ok(())
}

pub async fn command_submit(gsettings: &GlobalSettings, opts: SubmitOpts) -> anyhow::Result<()> {
    let manager = opts.script.manager;
    let (name, script) = build_script(gsettings, opts.script)?;
    let submit_dir = absolute_path(opts.submit_dir)?;
    let emitter = create_emitter(manager);
    let job = submit_script(emitter.as_ref(), &script, &submit_dir, &name, opts.dry_run).await?;
    gsettings.printer().print_job_submitted(manager, &job);
    Ok(())
}
