use crate::common::env::{SLURM_ARRAY_JOB_ID, SLURM_ARRAY_TASK_ID, SLURM_JOB_ID};
use crate::common::manager::info::ManagerType;
use crate::common::manager::slurm::{
    format_slurm_duration, format_slurm_memory, parse_sbatch_job_id,
};
use crate::common::utils::str::shell_quote;
use crate::descriptor::{JobDescriptor, MailEvent};
use crate::emitter::ScriptEmitter;

pub struct SlurmEmitter;

fn mail_type(event: MailEvent) -> &'static str {
    match event {
        MailEvent::Begin => "BEGIN",
        MailEvent::End => "END",
        MailEvent::Fail => "FAIL",
    }
}

impl ScriptEmitter for SlurmEmitter {
    fn manager(&self) -> ManagerType {
        ManagerType::Slurm
    }

    fn directives(&self, descriptor: &JobDescriptor) -> crate::Result<Vec<String>> {
        let resources = &descriptor.resources;
        let mut options = vec![
            format!("--job-name={}", shell_quote(&descriptor.name)),
            format!("--output={}", shell_quote(&descriptor.output)),
            format!("--error={}", shell_quote(&descriptor.error)),
            format!("--nodes={}", resources.nodes),
            format!("--ntasks={}", resources.ntasks),
            format!("--cpus-per-task={}", resources.cpus_per_task),
        ];
        if let Some(memory) = resources.mem_per_cpu {
            options.push(format!("--mem-per-cpu={}", format_slurm_memory(memory)));
        }
        options.push(match descriptor.max_concurrent {
            Some(limit) => format!("--array={}%{limit}", descriptor.array),
            None => format!("--array={}", descriptor.array),
        });
        options.push(format!(
            "--time={}",
            format_slurm_duration(&descriptor.time_limit)
        ));
        if let Some(mail) = &descriptor.mail {
            let events: Vec<_> = mail.events.iter().map(|e| mail_type(*e)).collect();
            options.push(format!("--mail-type={}", events.join(",")));
            options.push(format!("--mail-user={}", shell_quote(&mail.user)));
        }
        if resources.gpus > 0 {
            options.push(format!("--gres=gpu:{}", resources.gpus));
        }
        if let Some(partition) = &descriptor.partition {
            options.push(format!("--partition={}", shell_quote(partition)));
        }
        if let Some(account) = &descriptor.account {
            options.push(format!("--account={}", shell_quote(account)));
        }
        if let Some(workdir) = &descriptor.workdir {
            options.push(format!(
                "--chdir={}",
                shell_quote(&workdir.to_string_lossy())
            ));
        }
        options.extend(descriptor.additional_args.iter().cloned());

        Ok(options
            .into_iter()
            .map(|option| format!("#SBATCH {option}"))
            .collect())
    }

    fn shell_ids(&self, _descriptor: &JobDescriptor) -> (String, String) {
        (
            format!("${{{SLURM_ARRAY_JOB_ID}:-${SLURM_JOB_ID}}}"),
            format!("${{{SLURM_ARRAY_TASK_ID}:-0}}"),
        )
    }

    fn submit_program(&self) -> &'static str {
        "sbatch"
    }

    fn parse_job_id(&self, output: &str) -> anyhow::Result<String> {
        parse_sbatch_job_id(output)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::descriptor::tests::reference_descriptor;
    use crate::emitter::slurm::SlurmEmitter;
    use crate::emitter::{LauncherMode, RenderOptions, ScriptEmitter, render_script, submit_script};

    fn options(launcher: LauncherMode) -> RenderOptions {
        RenderOptions {
            launcher,
            jobdesc_path: PathBuf::from("/opt/bin/jobdesc"),
        }
    }

    #[test]
    fn render_reference_script() {
        let script = render_script(
            &SlurmEmitter,
            &reference_descriptor(),
            &options(LauncherMode::Wrapped),
        )
        .unwrap();
        assert_eq!(
            script,
            r#"#!/bin/bash
#SBATCH --job-name=l2o_train
#SBATCH --output=%x-%A_%a.out
#SBATCH --error=%x-%A_%a.err
#SBATCH --nodes=1
#SBATCH --ntasks=1
#SBATCH --cpus-per-task=1
#SBATCH --mem-per-cpu=40G
#SBATCH --array=0
#SBATCH --time=15:59:00
#SBATCH --mail-type=BEGIN,END,FAIL
#SBATCH --mail-user=user@example.com
#SBATCH --gres=gpu:1

/opt/bin/jobdesc run --manager slurm -- train unconstrained_qp cluster
"#
        );
    }

    #[test]
    fn render_shell_launcher() {
        let script = render_script(
            &SlurmEmitter,
            &reference_descriptor(),
            &options(LauncherMode::Shell),
        )
        .unwrap();
        let body = script.split("\n\n").nth(1).unwrap();
        assert_eq!(
            body,
            r#"export JOBDESC_ARRAY_JOB_ID="${SLURM_ARRAY_JOB_ID:-$SLURM_JOB_ID}"
export JOBDESC_ARRAY_TASK_ID="${SLURM_ARRAY_TASK_ID:-0}"
echo "My array job id is ${JOBDESC_ARRAY_JOB_ID}."
echo "My array task id is ${JOBDESC_ARRAY_TASK_ID}."
echo "Executing on the machine: $(hostname)"
exec train unconstrained_qp cluster
"#
        );
    }

    #[test]
    fn render_optional_directives() {
        let mut descriptor = reference_descriptor();
        descriptor.array = "0-9,20".parse().unwrap();
        descriptor.max_concurrent = Some(2);
        descriptor.resources.gpus = 0;
        descriptor.mail = None;
        descriptor.resources.mem_per_cpu = None;
        descriptor.partition = Some("gpu".to_string());
        descriptor.account = Some("proj-1".to_string());
        descriptor.workdir = Some(PathBuf::from("/scratch/my run"));
        descriptor.additional_args = vec!["--exclusive".to_string()];

        let directives = SlurmEmitter.directives(&descriptor).unwrap();
        assert_eq!(
            directives,
            vec![
                "#SBATCH --job-name=l2o_train",
                "#SBATCH --output=%x-%A_%a.out",
                "#SBATCH --error=%x-%A_%a.err",
                "#SBATCH --nodes=1",
                "#SBATCH --ntasks=1",
                "#SBATCH --cpus-per-task=1",
                "#SBATCH --array=0-9,20%2",
                "#SBATCH --time=15:59:00",
                "#SBATCH --partition=gpu",
                "#SBATCH --account=proj-1",
                "#SBATCH --chdir='/scratch/my run'",
                "#SBATCH --exclusive",
            ]
        );
    }

    #[test]
    fn render_env_and_quoted_command() {
        let mut descriptor = reference_descriptor();
        descriptor
            .env
            .insert("OMP_NUM_THREADS".to_string(), "1".to_string());
        descriptor
            .env
            .insert("GREETING".to_string(), "hello world".to_string());
        descriptor.command = vec![
            "python".to_string(),
            "-c".to_string(),
            "print('x')".to_string(),
        ];
        let script = render_script(
            &SlurmEmitter,
            &descriptor,
            &options(LauncherMode::Wrapped),
        )
        .unwrap();
        assert!(script.ends_with(
            r#"
export GREETING='hello world'
export OMP_NUM_THREADS=1
/opt/bin/jobdesc run --manager slurm -- python -c 'print('\''x'\'')'
"#
        ));
    }

    #[test]
    fn parse_submitted_job_id() {
        assert_eq!(
            SlurmEmitter
                .parse_job_id("Submitted batch job 4521\n")
                .unwrap(),
            "4521"
        );
        assert!(SlurmEmitter.parse_job_id("sbatch: error").is_err());
    }

    #[tokio::test]
    async fn dry_run_writes_numbered_scripts() {
        let dir = tempfile::TempDir::with_prefix("jobdesc").unwrap();
        let first = submit_script(&SlurmEmitter, "#!/bin/bash\n", dir.path(), "l2o", true)
            .await
            .unwrap();
        let second = submit_script(&SlurmEmitter, "#!/bin/bash\n", dir.path(), "l2o", true)
            .await
            .unwrap();

        assert_eq!(first.job_id, None);
        assert_eq!(first.script_path, dir.path().join("l2o/0/submit.sh"));
        assert_eq!(second.script_path, dir.path().join("l2o/1/submit.sh"));
        assert_eq!(
            std::fs::read_to_string(&first.script_path).unwrap(),
            "#!/bin/bash\n"
        );
    }
}
