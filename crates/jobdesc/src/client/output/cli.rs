use std::path::Path;

use chrono::{DateTime, Local, SubsecRound, Utc};
use cli_table::format::{Justify, Separator};
use cli_table::{Cell, CellStruct, Color, ColorChoice, Style, Table, TableStruct, print_stdout};
use colored::Color as Colorization;
use colored::Colorize;

use crate::client::output::outputs::Output;
use crate::common::manager::info::ManagerType;
use crate::common::memory::format_memory;
use crate::common::utils::str::{pluralize, shell_join};
use crate::common::utils::time::format_hms;
use crate::descriptor::JobDescriptor;
use crate::emitter::SubmittedJob;
use crate::launcher::program::signal_name;
use crate::local::{InstanceOutcome, InstanceStatus, LocalRunReport};

pub const INSTANCE_COLOR_FAILED: Colorization = Colorization::Red;
pub const INSTANCE_COLOR_FINISHED: Colorization = Colorization::Green;

pub struct CliOutput {
    color_policy: ColorChoice,
}

impl CliOutput {
    pub fn new(color_policy: ColorChoice) -> CliOutput {
        CliOutput { color_policy }
    }

    fn print_vertical_table(&self, rows: Vec<Vec<CellStruct>>) {
        let table = rows.table().separator(
            Separator::builder()
                .column(Some(Default::default()))
                .build(),
        );
        self.print_table(table);
    }

    fn print_horizontal_table(&self, rows: Vec<Vec<CellStruct>>, header: Vec<CellStruct>) {
        let table = rows
            .table()
            .separator(
                Separator::builder()
                    .title(Some(Default::default()))
                    .column(Some(Default::default()))
                    .build(),
            )
            .title(header);
        self.print_table(table);
    }

    fn print_table(&self, table: TableStruct) {
        let table = table.color_choice(self.color_policy);
        if let Err(e) = print_stdout(table) {
            log::error!("Cannot print table to stdout: {e:?}");
        }
    }
}

impl Output for CliOutput {
    fn print_descriptor(&self, descriptor: &JobDescriptor) {
        let resources = &descriptor.resources;
        let mut rows = vec![
            vec!["Name".cell().bold(true), descriptor.name.as_str().cell()],
            vec![
                "Array".cell().bold(true),
                format!(
                    "{} ({} {})",
                    descriptor.array,
                    descriptor.task_count(),
                    pluralize("instance", descriptor.task_count() as usize)
                )
                .cell(),
            ],
        ];
        if let Some(limit) = descriptor.max_concurrent {
            rows.push(vec![
                "Max concurrent".cell().bold(true),
                limit.cell().justify(Justify::Left),
            ]);
        }
        rows.push(vec![
            "Resources".cell().bold(true),
            format!(
                "nodes: {}, tasks: {}, cpus per task: {}, gpus: {}",
                resources.nodes, resources.ntasks, resources.cpus_per_task, resources.gpus
            )
            .cell(),
        ]);
        rows.push(vec![
            "Memory per CPU".cell().bold(true),
            resources
                .mem_per_cpu
                .map(format_memory)
                .unwrap_or_else(|| "scheduler default".to_string())
                .cell(),
        ]);
        rows.push(vec![
            "Time limit".cell().bold(true),
            format_hms(&descriptor.time_limit).cell(),
        ]);
        if let Some(mail) = &descriptor.mail {
            let events: Vec<_> = mail.events.iter().map(|e| e.to_string()).collect();
            rows.push(vec![
                "Mail".cell().bold(true),
                format!("{} ({})", mail.user, events.join(", ")).cell(),
            ]);
        }
        rows.push(vec![
            "Command".cell().bold(true),
            shell_join(&descriptor.command).cell(),
        ]);
        rows.push(vec![
            "Stdout".cell().bold(true),
            descriptor.output.as_str().cell(),
        ]);
        rows.push(vec![
            "Stderr".cell().bold(true),
            descriptor.error.as_str().cell(),
        ]);
        if let Some(workdir) = &descriptor.workdir {
            rows.push(vec![
                "Working directory".cell().bold(true),
                workdir.display().cell(),
            ]);
        }
        if !descriptor.env.is_empty() {
            let env: Vec<_> = descriptor
                .env
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            rows.push(vec!["Environment".cell().bold(true), env.join("\n").cell()]);
        }
        for (label, value) in [
            ("Partition", &descriptor.partition),
            ("Account", &descriptor.account),
        ] {
            if let Some(value) = value {
                rows.push(vec![label.cell().bold(true), value.as_str().cell()]);
            }
        }
        if !descriptor.additional_args.is_empty() {
            rows.push(vec![
                "Additional arguments".cell().bold(true),
                descriptor.additional_args.join("\n").cell(),
            ]);
        }
        self.print_vertical_table(rows);
    }

    fn print_job_file(&self, content: &str) {
        print!("{content}");
    }

    fn print_job_file_written(&self, path: &Path, descriptor: &JobDescriptor) {
        println!(
            "Job file for `{}` written to {}",
            descriptor.name.bold(),
            path.display()
        );
    }

    fn print_script(&self, _manager: ManagerType, script: &str) {
        print!("{script}");
    }

    fn print_script_written(&self, manager: ManagerType, path: &Path) {
        println!("{manager} script written to {}", path.display());
    }

    fn print_job_submitted(&self, manager: ManagerType, job: &SubmittedJob) {
        match &job.job_id {
            Some(job_id) => println!(
                "Job submitted successfully, {manager} job ID: {}",
                job_id.as_str().bold()
            ),
            None => println!(
                "Dry run, {manager} script written to {}",
                job.script_path.display()
            ),
        }
    }

    fn print_local_report(&self, report: &LocalRunReport) {
        let rows: Vec<_> = report
            .instances
            .iter()
            .map(|instance| {
                vec![
                    instance.task_id.cell(),
                    instance_status_to_cell(&instance.status),
                    format_duration_cell(instance),
                    instance.stdout.display().cell(),
                    instance.stderr.display().cell(),
                ]
            })
            .collect();
        let header = vec![
            "Task ID".cell().bold(true),
            "State".cell().bold(true),
            "Runtime".cell().bold(true),
            "Stdout".cell().bold(true),
            "Stderr".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);

        let finished = report
            .instances
            .iter()
            .filter(|i| i.status.is_finished())
            .count();
        let total = report.instances.len();
        let summary = format!(
            "Job `{}` ({}): {finished}/{total} {} finished",
            report.job_name,
            report.job_id,
            pluralize("instance", total)
        );
        if finished == total {
            println!("{}", summary.color(INSTANCE_COLOR_FINISHED));
        } else {
            println!("{}", summary.color(INSTANCE_COLOR_FAILED));
        }
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}

fn format_duration_cell(instance: &InstanceOutcome) -> CellStruct {
    match (instance.started_at, instance.finished_at) {
        (Some(start), Some(end)) => {
            let duration = (end - start).to_std().unwrap_or_default();
            humantime::format_duration(round_to_millis(duration))
                .to_string()
                .cell()
        }
        (Some(start), None) => format!("started at {}", format_datetime(start)).cell(),
        _ => "".cell(),
    }
}

fn round_to_millis(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(duration.as_millis() as u64)
}

fn format_datetime(time: DateTime<Utc>) -> String {
    let datetime: DateTime<Local> = time.into();
    datetime.round_subsecs(0).format("%d.%m.%Y %H:%M:%S").to_string()
}

fn instance_status_to_cell(status: &InstanceStatus) -> CellStruct {
    match status {
        InstanceStatus::Finished => "FINISHED".cell().foreground_color(Some(Color::Green)),
        InstanceStatus::Failed { exit_code, signal } => {
            let detail = match (exit_code, signal) {
                (Some(code), _) => format!("FAILED (exit code {code})"),
                (None, Some(signal)) => {
                    format!("FAILED (signal {signal}, {})", signal_name(*signal))
                }
                (None, None) => "FAILED".to_string(),
            };
            detail.cell().foreground_color(Some(Color::Red))
        }
        InstanceStatus::TimedOut => "TIMED OUT".cell().foreground_color(Some(Color::Yellow)),
        InstanceStatus::Interrupted => "INTERRUPTED"
            .cell()
            .foreground_color(Some(Color::Magenta)),
        InstanceStatus::SpawnFailed { message } => format!("NOT STARTED: {message}")
            .cell()
            .foreground_color(Some(Color::Red)),
    }
}
