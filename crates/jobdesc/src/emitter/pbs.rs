use crate::ArrayTaskId;
use crate::common::env::{PBS_ARRAY_ID, PBS_ARRAY_INDEX, PBS_JOBID};
use crate::common::error::JobDescError;
use crate::common::manager::info::ManagerType;
use crate::common::manager::pbs::{format_pbs_duration, format_pbs_memory, parse_qsub_job_id};
use crate::common::placeholders::translate_template_to_pbs;
use crate::common::utils::str::shell_quote;
use crate::descriptor::{JobDescriptor, MailEvent};
use crate::emitter::ScriptEmitter;

/// Directory from which `qsub` was invoked
const PBS_O_WORKDIR: &str = "PBS_O_WORKDIR";

pub struct PbsEmitter;

fn mail_flag(event: MailEvent) -> char {
    match event {
        MailEvent::Begin => 'b',
        MailEvent::End => 'e',
        MailEvent::Fail => 'a',
    }
}

/// PBS cannot expand `^array_index^` outside of array jobs, so single instance jobs
/// get the index written directly into their log paths.
fn log_path(template: &str, descriptor: &JobDescriptor, fixed_id: Option<ArrayTaskId>) -> String {
    let path = translate_template_to_pbs(template, &descriptor.name);
    match fixed_id {
        Some(id) => path.replace("^array_index^", &id.to_string()),
        None => path,
    }
}

impl PbsEmitter {
    /// Value of `-J`, or `None` if the job has a single index.
    fn array_range(&self, descriptor: &JobDescriptor) -> crate::Result<Option<String>> {
        if descriptor.task_count() == 1 {
            return Ok(None);
        }
        let range = descriptor.array.as_single_range().ok_or_else(|| {
            JobDescError::RenderError(format!(
                "PBS only supports arrays with evenly spaced indices, `{}` was requested",
                descriptor.array
            ))
        })?;
        Ok(Some(if range.step == 1 {
            format!("{}-{}", range.start, range.end)
        } else {
            format!("{}-{}:{}", range.start, range.end, range.step)
        }))
    }
}

impl ScriptEmitter for PbsEmitter {
    fn manager(&self) -> ManagerType {
        ManagerType::Pbs
    }

    fn directives(&self, descriptor: &JobDescriptor) -> crate::Result<Vec<String>> {
        let resources = &descriptor.resources;
        let array = self.array_range(descriptor)?;
        let fixed_id = self.fixed_task_id(descriptor);

        let mut select = format!(
            "select={}:ncpus={}",
            resources.nodes,
            resources.total_cpus()?
        );
        if let Some(memory) = resources.total_memory()? {
            select.push_str(&format!(":mem={}", format_pbs_memory(memory)));
        }
        if resources.gpus > 0 {
            select.push_str(&format!(":ngpus={}", resources.gpus));
        }

        let mut options = vec![
            format!("-N {}", shell_quote(&descriptor.name)),
            format!(
                "-o {}",
                shell_quote(&log_path(&descriptor.output, descriptor, fixed_id))
            ),
            format!(
                "-e {}",
                shell_quote(&log_path(&descriptor.error, descriptor, fixed_id))
            ),
            format!("-l {select}"),
            format!(
                "-l walltime={}",
                format_pbs_duration(&descriptor.time_limit)
            ),
        ];
        if let Some(array) = array {
            options.push(format!("-J {array}"));
            if let Some(limit) = descriptor.max_concurrent {
                options.push(format!("-W max_run_subjobs={limit}"));
            }
        }
        if let Some(mail) = &descriptor.mail {
            let mut flags: Vec<char> = mail.events.iter().map(|e| mail_flag(*e)).collect();
            flags.sort_unstable();
            options.push(format!("-m {}", flags.into_iter().collect::<String>()));
            options.push(format!("-M {}", shell_quote(&mail.user)));
        }
        if let Some(partition) = &descriptor.partition {
            options.push(format!("-q {}", shell_quote(partition)));
        }
        if let Some(account) = &descriptor.account {
            options.push(format!("-A {}", shell_quote(account)));
        }
        options.extend(descriptor.additional_args.iter().cloned());

        Ok(options
            .into_iter()
            .map(|option| format!("#PBS {option}"))
            .collect())
    }

    fn prologue(&self, descriptor: &JobDescriptor) -> Vec<String> {
        // PBS starts jobs in the home directory
        match &descriptor.workdir {
            Some(workdir) => vec![format!("cd {}", shell_quote(&workdir.to_string_lossy()))],
            None => vec![format!("cd \"${PBS_O_WORKDIR}\"")],
        }
    }

    fn fixed_task_id(&self, descriptor: &JobDescriptor) -> Option<ArrayTaskId> {
        match descriptor.task_count() {
            1 => descriptor.task_ids().next(),
            _ => None,
        }
    }

    fn shell_ids(&self, descriptor: &JobDescriptor) -> (String, String) {
        let default_task = self.fixed_task_id(descriptor).unwrap_or(0);
        (
            format!("${{{PBS_ARRAY_ID}:-${PBS_JOBID}}}"),
            format!("${{{PBS_ARRAY_INDEX}:-{default_task}}}"),
        )
    }

    fn submit_program(&self) -> &'static str {
        "qsub"
    }

    fn parse_job_id(&self, output: &str) -> anyhow::Result<String> {
        parse_qsub_job_id(output)
    }
}
