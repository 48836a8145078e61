pub mod common;
pub mod pbs;
pub mod slurm;

use std::path::PathBuf;

use crate::ArrayTaskId;
use crate::common::manager::info::ManagerType;
use crate::descriptor::JobDescriptor;
use crate::emitter::pbs::PbsEmitter;
use crate::emitter::slurm::SlurmEmitter;

/// What the batch script executes for every task instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LauncherMode {
    /// Run the command through `jobdesc run`, which prints the instance identity,
    /// forwards termination signals and propagates the exit code
    #[default]
    Wrapped,
    /// Print the instance identity from the shell and `exec` the command
    Shell,
}

pub struct RenderOptions {
    pub launcher: LauncherMode,
    /// Executable invoked by wrapped scripts
    pub jobdesc_path: PathBuf,
}

impl RenderOptions {
    pub fn new(launcher: LauncherMode) -> anyhow::Result<Self> {
        use anyhow::Context;
        let jobdesc_path = std::env::current_exe().context("Cannot get jobdesc path")?;
        Ok(Self {
            launcher,
            jobdesc_path,
        })
    }
}

/// Translates a descriptor into the batch script dialect of one scheduler.
pub trait ScriptEmitter {
    fn manager(&self) -> ManagerType;

    /// Directive lines, including the scheduler prefix (`#SBATCH`, `#PBS`).
    fn directives(&self, descriptor: &JobDescriptor) -> crate::Result<Vec<String>>;

    /// Shell lines executed before the command.
    fn prologue(&self, _descriptor: &JobDescriptor) -> Vec<String> {
        vec![]
    }

    /// Task id that the scheduler does not expose and has to be passed to the launcher.
    fn fixed_task_id(&self, _descriptor: &JobDescriptor) -> Option<ArrayTaskId> {
        None
    }

    /// Shell expressions that expand to the array job id and array task id.
    fn shell_ids(&self, descriptor: &JobDescriptor) -> (String, String);

    /// Program that submits a script.
    fn submit_program(&self) -> &'static str;

    /// Extracts the job id from the output of the submit program.
    fn parse_job_id(&self, output: &str) -> anyhow::Result<String>;
}

pub fn create_emitter(manager: ManagerType) -> Box<dyn ScriptEmitter> {
    match manager {
        ManagerType::Slurm => Box::new(SlurmEmitter),
        ManagerType::Pbs => Box::new(PbsEmitter),
    }
}

pub use common::{SubmittedJob, render_script, submit_script};
