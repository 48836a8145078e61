use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Context;
use bstr::ByteSlice;
use tokio::process::Command;

use crate::common::env::{JOBDESC_ARRAY_JOB_ID, JOBDESC_ARRAY_TASK_ID};
use crate::common::utils::fs::create_numbered_dir;
use crate::common::utils::str::{shell_join, shell_quote};
use crate::descriptor::JobDescriptor;
use crate::emitter::{LauncherMode, RenderOptions, ScriptEmitter};

/// Name of a script that will be submitted to Slurm/PBS.
const SUBMIT_SCRIPT_NAME: &str = "submit.sh";

/// Name of a file that will store the job id of a submitted Slurm/PBS job.
const JOBID_FILE_NAME: &str = "jobid";

/// Renders a complete batch script: shebang, scheduler directives and a body that
/// runs the command of the descriptor.
pub fn render_script(
    emitter: &dyn ScriptEmitter,
    descriptor: &JobDescriptor,
    options: &RenderOptions,
) -> crate::Result<String> {
    let mut script = String::from("#!/bin/bash\n");
    for directive in emitter.directives(descriptor)? {
        script.push_str(&directive);
        script.push('\n');
    }
    script.push('\n');

    for line in emitter.prologue(descriptor) {
        script.push_str(&line);
        script.push('\n');
    }
    for (key, value) in &descriptor.env {
        writeln!(script, "export {key}={}", shell_quote(value)).ok();
    }

    match options.launcher {
        LauncherMode::Wrapped => {
            write!(
                script,
                "{} run --manager {}",
                shell_quote(&options.jobdesc_path.to_string_lossy()),
                emitter.manager().cli_name()
            )
            .ok();
            if let Some(task_id) = emitter.fixed_task_id(descriptor) {
                write!(script, " --task-id {task_id}").ok();
            }
            writeln!(script, " -- {}", shell_join(&descriptor.command)).ok();
        }
        LauncherMode::Shell => {
            let (job_id, task_id) = emitter.shell_ids(descriptor);
            writeln!(script, "export {JOBDESC_ARRAY_JOB_ID}=\"{job_id}\"").ok();
            writeln!(script, "export {JOBDESC_ARRAY_TASK_ID}=\"{task_id}\"").ok();
            writeln!(
                script,
                "echo \"My array job id is ${{{JOBDESC_ARRAY_JOB_ID}}}.\""
            )
            .ok();
            writeln!(
                script,
                "echo \"My array task id is ${{{JOBDESC_ARRAY_TASK_ID}}}.\""
            )
            .ok();
            writeln!(script, "echo \"Executing on the machine: $(hostname)\"").ok();
            writeln!(script, "exec {}", shell_join(&descriptor.command)).ok();
        }
    }
    Ok(script)
}

#[derive(Debug)]
pub struct SubmittedJob {
    /// Directory containing the submitted script
    pub directory: PathBuf,
    pub script_path: PathBuf,
    /// `None` for a dry run
    pub job_id: Option<String>,
}

/// Writes `script` into a fresh numbered directory under `<submit_dir>/<name>` and,
/// unless `dry_run` is set, submits it into PBS/Slurm.
pub async fn submit_script(
    emitter: &dyn ScriptEmitter,
    script: &str,
    submit_dir: &Path,
    name: &str,
    dry_run: bool,
) -> anyhow::Result<SubmittedJob> {
    let directory = create_numbered_dir(&submit_dir.join(name)).with_context(|| {
        format!(
            "Cannot create submit directory in {}",
            submit_dir.join(name).display()
        )
    })?;
    let script_path = directory.join(SUBMIT_SCRIPT_NAME);
    std::fs::write(&script_path, script)
        .with_context(|| format!("Cannot write script into {}", script_path.display()))?;
    log::debug!("Script written into {}", script_path.display());

    if dry_run {
        return Ok(SubmittedJob {
            directory,
            script_path,
            job_id: None,
        });
    }

    let program = emitter.submit_program();
    let program_path = which::which(program).with_context(|| {
        format!(
            "Cannot find `{program}`. Make sure that {} is available on this machine.",
            emitter.manager()
        )
    })?;

    log::debug!("Running command `{program} {}`", script_path.display());
    let output = Command::new(&program_path)
        .arg(&script_path)
        .current_dir(&directory)
        .output()
        .await
        .with_context(|| format!("{program} start failed"))?;
    let output =
        check_command_output(output).with_context(|| format!("{program} execution failed"))?;
    let stdout = output
        .stdout
        .to_str()
        .map_err(|e| anyhow::anyhow!("Invalid UTF-8 {program} output: {e:?}"))?
        .trim();

    let job_id = emitter.parse_job_id(stdout)?;

    // Write the job id next to the script as a debug information
    std::fs::write(directory.join(JOBID_FILE_NAME), &job_id)?;

    Ok(SubmittedJob {
        directory,
        script_path,
        job_id: Some(job_id),
    })
}

pub fn check_command_output(output: Output) -> anyhow::Result<Output> {
    let status = output.status;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "Exit code: {}\nStderr: {}\nStdout: {}",
            status.code().unwrap_or(-1),
            output.stderr.to_str().unwrap_or("Invalid UTF-8"),
            output.stdout.to_str().unwrap_or("Invalid UTF-8")
        ));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    use crate::emitter::common::check_command_output;

    #[test]
    fn check_failed_output() {
        let output = Output {
            status: ExitStatus::from_raw(1 << 8),
            stdout: b"out".to_vec(),
            stderr: b"sbatch: error: invalid partition".to_vec(),
        };
        let error = check_command_output(output).unwrap_err().to_string();
        assert_eq!(
            error,
            "Exit code: 1\nStderr: sbatch: error: invalid partition\nStdout: out"
        );
    }

    #[test]
    fn check_successful_output() {
        let output = Output {
            status: ExitStatus::from_raw(0),
            stdout: b"Submitted batch job 1".to_vec(),
            stderr: vec![],
        };
        assert!(check_command_output(output).is_ok());
    }
}
