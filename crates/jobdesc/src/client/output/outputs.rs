use std::path::Path;

use crate::common::manager::info::ManagerType;
use crate::descriptor::JobDescriptor;
use crate::emitter::SubmittedJob;
use crate::local::LocalRunReport;

#[derive(clap::ValueEnum, Clone)]
pub enum Outputs {
    CLI,
    JSON,
    Quiet,
}

pub trait Output {
    // Descriptors
    fn print_descriptor(&self, descriptor: &JobDescriptor);
    fn print_job_file(&self, content: &str);
    fn print_job_file_written(&self, path: &Path, descriptor: &JobDescriptor);

    // Scripts
    fn print_script(&self, manager: ManagerType, script: &str);
    fn print_script_written(&self, manager: ManagerType, path: &Path);
    fn print_job_submitted(&self, manager: ManagerType, job: &SubmittedJob);

    // Local runs
    fn print_local_report(&self, report: &LocalRunReport);

    fn print_error(&self, error: anyhow::Error);
}
