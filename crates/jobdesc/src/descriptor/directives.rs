use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use bstr::{BStr, ByteSlice};
use nom::branch::alt;
use nom::bytes::complete::{escaped, take_while};
use nom::character::complete::{char, none_of, one_of, space0, space1};
use nom::combinator::{cut, map};
use nom::multi::{many1, separated_list0};
use nom::sequence::{delimited, preceded, terminated};

use crate::common::arrayparser::parse_throttled_array;
use crate::common::manager::slurm::parse_slurm_duration;
use crate::common::memory::{MIB, parse_memory_with_default_unit};
use crate::common::parser::{NomResult, consume_all};
use crate::common::placeholders::{DEFAULT_STDERR_TEMPLATE, DEFAULT_STDOUT_TEMPLATE};
use crate::common::utils::fs::read_at_most;
use crate::descriptor::MailEvent;
use crate::descriptor::jobfile::{CommandDef, JobDef, MailDef, ResourcesDef};

const MAX_PREFIX_OF_SCRIPT: usize = 32 * 1024; // 32KiB

const SBATCH_PREFIX: &[u8] = b"#SBATCH";

fn p_double_quoted(input: &str) -> NomResult<&str> {
    preceded(
        char('"'),
        cut(terminated(
            escaped(none_of("\"\\"), '\\', one_of("\"\\")),
            char('"'),
        )),
    )(input)
}

fn p_single_quoted(input: &str) -> NomResult<&str> {
    delimited(char('\''), take_while(|c| c != '\''), cut(char('\'')))(input)
}

fn p_bare(input: &str) -> NomResult<String> {
    map(escaped(none_of(" \t\"'\\"), '\\', one_of(" \"'\\")), |s: &str| {
        let mut unescaped = String::with_capacity(s.len());
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => unescaped.extend(chars.next()),
                c => unescaped.push(c),
            }
        }
        unescaped
    })(input)
}

fn p_word_part(input: &str) -> NomResult<String> {
    alt((
        map(p_double_quoted, |s| s.replace("\\\"", "\"").replace("\\\\", "\\")),
        map(p_single_quoted, |s| s.to_string()),
        p_bare,
    ))(input)
}

/// One shell word, possibly glued from several differently quoted parts (`--name="a b"`).
fn p_arg(input: &str) -> NomResult<String> {
    map(many1(p_non_empty(p_word_part)), |parts| parts.concat())(input)
}

/// Fails if `parser` does not consume anything, so that `many1` terminates.
fn p_non_empty<'a>(
    mut parser: impl FnMut(&'a str) -> NomResult<'a, String>,
) -> impl FnMut(&'a str) -> NomResult<'a, String> {
    move |input: &'a str| {
        let (rest, value) = parser(input)?;
        if rest.len() == input.len() {
            Err(nom::Err::Error(nom::error::ParseError::from_error_kind(
                input,
                nom::error::ErrorKind::NonEmpty,
            )))
        } else {
            Ok((rest, value))
        }
    }
}

/// Splits a line into words, honoring single quotes, double quotes and backslash escapes.
pub(crate) fn parse_args(input: &str) -> anyhow::Result<Vec<String>> {
    consume_all(
        delimited(space0, separated_list0(space1, p_arg), space0),
        input,
    )
}

/// Returns the contents of `#SBATCH` lines of the leading comment block.
fn extract_directives(data: &BStr) -> Vec<String> {
    let mut args = Vec::new();
    for line in data.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix(SBATCH_PREFIX) {
            if rest.first().is_some_and(|c| c.is_ascii_whitespace()) {
                let value = rest.trim();
                if !value.is_empty() {
                    args.push(String::from_utf8_lossy(value).to_string());
                }
                continue;
            }
        }
        match line.first() {
            Some(b'#') | None => continue,
            _ => break,
        }
    }
    args
}

/// Lines of the script body that are not comments or empty.
fn body_lines(data: &BStr) -> impl Iterator<Item = String> + '_ {
    data.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && line.first() != Some(&b'#'))
        .map(|line| String::from_utf8_lossy(line).to_string())
}

fn is_setup_line(line: &str) -> bool {
    let program = line.split_whitespace().next().unwrap_or_default();
    matches!(program, "echo" | "export" | "module")
}

/// Maps short `sbatch` options to their long names.
fn long_option_name(short: char) -> Option<&'static str> {
    Some(match short {
        'J' => "job-name",
        'o' => "output",
        'e' => "error",
        'N' => "nodes",
        'n' => "ntasks",
        'c' => "cpus-per-task",
        'a' => "array",
        't' => "time",
        'p' => "partition",
        'A' => "account",
        'D' => "chdir",
        'G' => "gpus",
        _ => return None,
    })
}

const KNOWN_OPTIONS: &[&str] = &[
    "job-name",
    "output",
    "error",
    "nodes",
    "ntasks",
    "cpus-per-task",
    "mem-per-cpu",
    "array",
    "time",
    "mail-type",
    "mail-user",
    "gres",
    "gpus",
    "partition",
    "account",
    "chdir",
];

#[derive(Debug, PartialEq)]
enum DirectiveItem {
    Known { name: &'static str, value: String },
    Unknown(String),
}

fn split_directive_args(args: Vec<String>) -> anyhow::Result<Vec<DirectiveItem>> {
    let mut items = Vec::new();
    let mut iter = args.into_iter().peekable();
    while let Some(arg) = iter.next() {
        let (name, inline_value) = if let Some(long) = arg.strip_prefix("--") {
            match long.split_once('=') {
                Some((name, value)) => (Some(name.to_string()), Some(value.to_string())),
                None => (Some(long.to_string()), None),
            }
        } else if let Some(short) = arg.strip_prefix('-') {
            let mut chars = short.chars();
            match chars.next().and_then(long_option_name) {
                Some(name) => {
                    let rest = chars.as_str();
                    let rest = rest.strip_prefix('=').unwrap_or(rest);
                    (
                        Some(name.to_string()),
                        (!rest.is_empty()).then(|| rest.to_string()),
                    )
                }
                None => (None, None),
            }
        } else {
            (None, None)
        };

        let known = name
            .as_deref()
            .and_then(|name| KNOWN_OPTIONS.iter().copied().find(|known| *known == name));
        match known {
            Some(known) => {
                let value = match inline_value {
                    Some(value) => value,
                    None => iter
                        .next()
                        .ok_or_else(|| anyhow!("Missing value of option `{arg}`"))?,
                };
                items.push(DirectiveItem::Known {
                    name: known,
                    value,
                });
            }
            None => {
                let mut raw = arg;
                if inline_value.is_none()
                    && raw.starts_with('-')
                    && iter.peek().is_some_and(|next| !next.starts_with('-'))
                {
                    if let Some(value) = iter.next() {
                        raw.push(' ');
                        raw.push_str(&value);
                    }
                }
                items.push(DirectiveItem::Unknown(raw));
            }
        }
    }
    Ok(items)
}

fn parse_mail_types(value: &str) -> Vec<MailEvent> {
    let mut events = Vec::new();
    for item in value.split(',').map(|s| s.trim().to_ascii_uppercase()) {
        match item.as_str() {
            "ALL" => events.extend(MailEvent::ALL),
            "BEGIN" => events.push(MailEvent::Begin),
            "END" => events.push(MailEvent::End),
            "FAIL" => events.push(MailEvent::Fail),
            "NONE" | "" => {}
            other => log::warn!("Mail type `{other}` is not supported and will be ignored"),
        }
    }
    events.sort_unstable();
    events.dedup();
    events
}

fn parse_gpu_gres(value: &str) -> Option<u32> {
    let mut parts = value.split(':');
    if parts.next()? != "gpu" {
        return None;
    }
    match parts.next_back() {
        Some(count) => count.parse().ok(),
        None => Some(1),
    }
}

/// Converts a batch script into a job file.
pub fn import_script(data: &[u8], default_name: &str) -> anyhow::Result<JobDef> {
    let data = BStr::new(data);

    let mut name = None;
    let mut array = None;
    let mut max_concurrent = None;
    let mut time_limit = None;
    let mut output = None;
    let mut error = None;
    let mut workdir = None;
    let mut partition = None;
    let mut account = None;
    let mut additional_args = Vec::new();
    let mut resources = ResourcesDef::default();
    let mut mail_user = None;
    let mut mail_events = None;

    for directive in extract_directives(data) {
        let args = parse_args(&directive)
            .with_context(|| format!("Cannot parse directive `#SBATCH {directive}`"))?;
        for item in split_directive_args(args)? {
            let (option, value) = match item {
                DirectiveItem::Known { name, value } => (name, value),
                DirectiveItem::Unknown(raw) => {
                    log::debug!("Keeping unknown directive `{raw}`");
                    additional_args.push(raw);
                    continue;
                }
            };
            let invalid = |error: anyhow::Error| error.context(format!("Invalid --{option}"));
            let parse_count = |value: &str| -> anyhow::Result<u32> {
                value
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| invalid(anyhow!("`{value}`: {e}")))
            };
            match option {
                "job-name" => name = Some(value),
                "output" => output = Some(value),
                "error" => error = Some(value),
                "nodes" => resources.nodes = parse_count(&value)?,
                "ntasks" => resources.ntasks = parse_count(&value)?,
                "cpus-per-task" => resources.cpus_per_task = parse_count(&value)?,
                "gpus" => resources.gpus = parse_count(&value)?,
                "mem-per-cpu" => {
                    resources.mem_per_cpu =
                        Some(parse_memory_with_default_unit(&value, MIB).map_err(invalid)?)
                }
                "array" => {
                    let (ids, limit) = parse_throttled_array(&value).map_err(invalid)?;
                    array = Some(ids);
                    max_concurrent = limit;
                }
                "time" => time_limit = Some(parse_slurm_duration(&value).map_err(invalid)?),
                "mail-type" => mail_events = Some(parse_mail_types(&value)),
                "mail-user" => mail_user = Some(value),
                "gres" => match parse_gpu_gres(&value) {
                    Some(gpus) => resources.gpus = gpus,
                    None => additional_args.push(format!("--gres={value}")),
                },
                "partition" => partition = Some(value),
                "account" => account = Some(value),
                "chdir" => workdir = Some(PathBuf::from(value)),
                _ => unreachable!("Option {option} is listed as known but not handled"),
            }
        }
    }

    let mut env = BTreeMap::new();
    let mut command = None;
    for line in body_lines(data) {
        if let Some(assignment) = line.strip_prefix("export ") {
            for arg in parse_args(assignment)? {
                if let Some((key, value)) = arg.split_once('=') {
                    env.insert(key.to_string(), value.to_string());
                }
            }
        }
        if !is_setup_line(&line) {
            command = Some(line);
        }
    }
    let command = command.ok_or_else(|| anyhow!("The script does not contain any command"))?;
    let mut argv = parse_args(&command)
        .with_context(|| format!("Cannot split command `{command}` into arguments"))?;
    if argv.first().is_some_and(|program| program == "exec") {
        argv.remove(0);
    }

    let mail = match (mail_user, mail_events) {
        (Some(user), Some(events)) if events.is_empty() => {
            log::warn!("Mail notifications for {user} are disabled by --mail-type");
            None
        }
        (Some(user), events) => Some(MailDef {
            user,
            events: events.unwrap_or_else(|| MailEvent::ALL.to_vec()),
        }),
        (None, Some(events)) if !events.is_empty() => {
            log::warn!("--mail-type is ignored, because --mail-user is not specified");
            None
        }
        (None, _) => None,
    };

    Ok(JobDef {
        name: name.unwrap_or_else(|| default_name.to_string()),
        array: array.unwrap_or_else(|| crate::common::arraydef::IntArray::from_id(0)),
        max_concurrent,
        time_limit: time_limit.ok_or_else(|| {
            anyhow!("The script does not specify a time limit (`#SBATCH --time`)")
        })?,
        output: output.unwrap_or_else(|| DEFAULT_STDOUT_TEMPLATE.to_string()),
        error: error.unwrap_or_else(|| DEFAULT_STDERR_TEMPLATE.to_string()),
        workdir,
        partition,
        account,
        additional_args,
        command: CommandDef::Argv(argv),
        resources,
        mail,
        env,
    })
}

pub fn import_script_from_file(path: &Path) -> anyhow::Result<JobDef> {
    log::debug!("Extracting directives from file: {}", path.display());

    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let data = read_at_most(file, MAX_PREFIX_OF_SCRIPT)?;
    let default_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "job".to_string());
    import_script(&data, &default_name)
}
