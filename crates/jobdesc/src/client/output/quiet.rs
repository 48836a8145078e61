use std::path::Path;

use crate::client::output::outputs::Output;
use crate::common::manager::info::ManagerType;
use crate::descriptor::JobDescriptor;
use crate::emitter::SubmittedJob;
use crate::local::{InstanceStatus, LocalRunReport};

#[derive(Default)]
pub struct Quiet;

impl Output for Quiet {
    fn print_descriptor(&self, _descriptor: &JobDescriptor) {}
    fn print_job_file(&self, content: &str) {
        print!("{content}");
    }
    fn print_job_file_written(&self, path: &Path, _descriptor: &JobDescriptor) {
        println!("{}", path.display());
    }

    fn print_script(&self, _manager: ManagerType, script: &str) {
        print!("{script}");
    }
    fn print_script_written(&self, _manager: ManagerType, path: &Path) {
        println!("{}", path.display());
    }
    fn print_job_submitted(&self, _manager: ManagerType, job: &SubmittedJob) {
        match &job.job_id {
            Some(job_id) => println!("{job_id}"),
            None => println!("{}", job.script_path.display()),
        }
    }

    fn print_local_report(&self, report: &LocalRunReport) {
        for instance in &report.instances {
            println!("{} {}", instance.task_id, format_status(&instance.status));
        }
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}

fn format_status(status: &InstanceStatus) -> &str {
    match status {
        InstanceStatus::Finished => "FINISHED",
        InstanceStatus::Failed { .. } => "FAILED",
        InstanceStatus::TimedOut => "TIMED_OUT",
        InstanceStatus::Interrupted => "INTERRUPTED",
        InstanceStatus::SpawnFailed { .. } => "NOT_STARTED",
    }
}
