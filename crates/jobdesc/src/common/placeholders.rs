use std::fmt::Write;
use std::path::{Path, PathBuf};

use nom::character::complete::{anychar, char, digit1};
use nom::combinator::{map, opt};
use nom::sequence::{preceded, tuple};

use crate::ArrayTaskId;
use crate::common::parser::NomResult;
use crate::common::utils::fs::resolve_path;

/// Array job id (`%A`)
pub const ARRAY_JOB_ID_PLACEHOLDER: char = 'A';
/// Array task id (`%a`)
pub const ARRAY_TASK_ID_PLACEHOLDER: char = 'a';
/// Job id of a single task instance (`%j`)
pub const JOB_ID_PLACEHOLDER: char = 'j';
/// Job name (`%x`)
pub const JOB_NAME_PLACEHOLDER: char = 'x';

/// Default template of the standard output log of a task instance.
pub const DEFAULT_STDOUT_TEMPLATE: &str = "%x-%A_%a.out";
/// Default template of the standard error log of a task instance.
pub const DEFAULT_STDERR_TEMPLATE: &str = "%x-%A_%a.err";

/// PBS expands this string to the index of the subjob.
const PBS_ARRAY_INDEX: &str = "^array_index^";

#[derive(Debug, Eq, PartialEq)]
pub enum StringPart<'a> {
    Verbatim(&'a str),
    /// `%[width]<name>`, where `width` zero-pads numeric values.
    Placeholder { name: char, width: Option<usize> },
}

/// Widths above this are clamped, as Slurm does.
const MAX_PLACEHOLDER_WIDTH: usize = 10;

fn parse_width(digits: &str) -> usize {
    digits
        .parse::<usize>()
        .map_or(MAX_PLACEHOLDER_WIDTH, |width| width.min(MAX_PLACEHOLDER_WIDTH))
}

fn parse_placeholder(data: &str) -> NomResult<(Option<usize>, char)> {
    preceded(
        char('%'),
        tuple((opt(map(digit1, parse_width)), anychar)),
    )(data)
}

/// Splits a log file template into verbatim text and `%` placeholders.
/// `%%` is returned as a verbatim `%`.
pub fn parse_template(data: &str) -> Vec<StringPart<'_>> {
    let mut parts = vec![];
    let mut start = 0;
    let mut input = data;

    while start < input.len() {
        if !input[start..].starts_with('%') {
            start += input[start..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
            continue;
        }
        match parse_placeholder(&input[start..]) {
            Ok((rest, (width, name))) => {
                if start > 0 {
                    parts.push(StringPart::Verbatim(&input[..start]));
                }
                if name == '%' {
                    parts.push(StringPart::Verbatim("%"));
                } else {
                    parts.push(StringPart::Placeholder { name, width });
                }
                input = rest;
                start = 0;
            }
            // A trailing `%` is kept as it is
            Err(_) => start += 1,
        }
    }

    if start > 0 {
        parts.push(StringPart::Verbatim(&input[..start]));
    }

    parts
}

/// Values of placeholders of a single task instance.
pub struct TemplateValues<'a> {
    pub job_name: &'a str,
    pub array_job_id: &'a str,
    pub array_task_id: ArrayTaskId,
    pub job_id: &'a str,
}

fn write_padded(buffer: &mut String, value: &str, width: Option<usize>) -> std::fmt::Result {
    match width {
        Some(width) => write!(buffer, "{value:0>width$}"),
        None => buffer.write_str(value),
    }
}

/// Resolves `%A`, `%a`, `%j`, `%x` and `%%` in `template` the way Slurm does for
/// `--output`/`--error`.
pub fn resolve_template(template: &str, values: &TemplateValues) -> String {
    let mut buffer = String::with_capacity(template.len());
    for part in parse_template(template) {
        let result = match part {
            StringPart::Verbatim(data) => buffer.write_str(data),
            StringPart::Placeholder { name, width } => match name {
                ARRAY_JOB_ID_PLACEHOLDER => write_padded(&mut buffer, values.array_job_id, width),
                ARRAY_TASK_ID_PLACEHOLDER => {
                    write_padded(&mut buffer, &values.array_task_id.to_string(), width)
                }
                JOB_ID_PLACEHOLDER => write_padded(&mut buffer, values.job_id, width),
                JOB_NAME_PLACEHOLDER => buffer.write_str(values.job_name),
                _ => {
                    log::warn!("Encountered an unknown placeholder `%{name}` in `{template}`");
                    match width {
                        Some(width) => write!(buffer, "%{width}{name}"),
                        None => write!(buffer, "%{name}"),
                    }
                }
            },
        };
        // Writing into a String cannot fail
        let _ = result;
    }
    buffer
}

/// Resolves `template` into a path of a task instance log file. Relative paths are
/// resolved against `directory`.
pub fn resolve_log_path(template: &str, values: &TemplateValues, directory: &Path) -> PathBuf {
    let resolved = resolve_template(template, values);
    resolve_path(directory, Path::new(&resolved))
}

/// Translates a Slurm log template into a PBS path. PBS only knows the subjob index;
/// the job id placeholders are replaced by the job name.
pub fn translate_template_to_pbs(template: &str, job_name: &str) -> String {
    let mut buffer = String::with_capacity(template.len());
    for part in parse_template(template) {
        match part {
            StringPart::Verbatim(data) => buffer.push_str(data),
            StringPart::Placeholder { name, width } => {
                if width.is_some() {
                    log::warn!("PBS does not support padding of placeholders in `{template}`");
                }
                match name {
                    ARRAY_TASK_ID_PLACEHOLDER => buffer.push_str(PBS_ARRAY_INDEX),
                    JOB_NAME_PLACEHOLDER => buffer.push_str(job_name),
                    ARRAY_JOB_ID_PLACEHOLDER | JOB_ID_PLACEHOLDER => {
                        log::warn!(
                            "PBS cannot expand `%{name}` in `{template}`, the job name will be used instead"
                        );
                        buffer.push_str(job_name);
                    }
                    _ => {
                        log::warn!("Encountered an unknown placeholder `%{name}` in `{template}`");
                        buffer.push('%');
                        buffer.push(name);
                    }
                }
            }
        }
    }
    buffer
}
