use std::path::Path;

use serde_json::json;

use crate::client::output::outputs::Output;
use crate::common::manager::info::ManagerType;
use crate::descriptor::JobDescriptor;
use crate::emitter::SubmittedJob;
use crate::local::LocalRunReport;

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    fn print(&self, data: serde_json::Value) {
        match serde_json::to_string_pretty(&data) {
            Ok(text) => println!("{text}"),
            Err(error) => log::error!("Cannot format JSON output: {error}"),
        }
    }
}

impl Output for JsonOutput {
    fn print_descriptor(&self, descriptor: &JobDescriptor) {
        self.print(json!(descriptor));
    }

    fn print_job_file(&self, content: &str) {
        self.print(json!({ "job_file": content }));
    }

    fn print_job_file_written(&self, path: &Path, descriptor: &JobDescriptor) {
        self.print(json!({
            "path": path,
            "descriptor": descriptor,
        }));
    }

    fn print_script(&self, manager: ManagerType, script: &str) {
        self.print(json!({
            "manager": manager,
            "script": script,
        }));
    }

    fn print_script_written(&self, manager: ManagerType, path: &Path) {
        self.print(json!({
            "manager": manager,
            "path": path,
        }));
    }

    fn print_job_submitted(&self, manager: ManagerType, job: &SubmittedJob) {
        self.print(json!({
            "manager": manager,
            "job_id": job.job_id,
            "directory": job.directory,
            "script": job.script_path,
        }));
    }

    fn print_local_report(&self, report: &LocalRunReport) {
        self.print(json!(report));
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(json!({ "error": format!("{error:?}") }));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::descriptor::tests::reference_descriptor;

    #[test]
    fn descriptor_json() {
        let value = json!(reference_descriptor());
        assert_eq!(value["name"], "l2o_train");
        assert_eq!(value["array"], "0");
        assert_eq!(value["time_limit"], "15h 59m");
        assert_eq!(value["resources"]["gpus"], 1);
        assert_eq!(value["resources"]["mem_per_cpu"], 40u64 << 30);
        assert_eq!(value["mail"]["events"], json!(["begin", "end", "fail"]));
    }
}
