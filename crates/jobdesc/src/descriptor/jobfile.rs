use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{MapAccess, SeqAccess};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::arraydef::IntArray;
use crate::common::error::JobDescError;
use crate::common::manager::slurm::format_slurm_memory;
use crate::common::memory::parse_memory;
use crate::common::placeholders::{DEFAULT_STDERR_TEMPLATE, DEFAULT_STDOUT_TEMPLATE};
use crate::common::utils::time::{format_hms, parse_hms_or_human_time};
use crate::descriptor::{JobDescriptor, MailConfig, MailEvent, ResourceRequest};

/// Tag that the invoked program uses to decide where it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    Local,
    Cluster,
}

impl Display for RunEnvironment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunEnvironment::Local => "local",
            RunEnvironment::Cluster => "cluster",
        })
    }
}

fn deserialize_human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    parse_hms_or_human_time(&buf).map_err(serde::de::Error::custom)
}

fn serialize_hms_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_hms(duration))
}

fn deserialize_memory_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MemoryInput {
        Bytes(u64),
        Text(String),
    }

    match Option::<MemoryInput>::deserialize(deserializer)? {
        None => Ok(None),
        Some(MemoryInput::Bytes(bytes)) => Ok(Some(bytes)),
        Some(MemoryInput::Text(text)) => parse_memory(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn serialize_memory_opt<S: Serializer>(
    memory: &Option<u64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match memory {
        Some(bytes) => serializer.serialize_str(&format_slurm_memory(*bytes)),
        None => serializer.serialize_none(),
    }
}

fn default_one() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResourcesDef {
    #[serde(default = "default_one")]
    pub nodes: u32,
    #[serde(default = "default_one")]
    pub ntasks: u32,
    #[serde(default = "default_one")]
    pub cpus_per_task: u32,
    #[serde(default)]
    #[serde(
        deserialize_with = "deserialize_memory_opt",
        serialize_with = "serialize_memory_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub mem_per_cpu: Option<u64>,
    #[serde(default)]
    pub gpus: u32,
}

impl Default for ResourcesDef {
    fn default() -> Self {
        Self {
            nodes: 1,
            ntasks: 1,
            cpus_per_task: 1,
            mem_per_cpu: None,
            gpus: 0,
        }
    }
}

fn default_mail_events() -> Vec<MailEvent> {
    MailEvent::ALL.to_vec()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MailDef {
    pub user: String,
    #[serde(default = "default_mail_events")]
    pub events: Vec<MailEvent>,
}

/// The invoked program followed by the benchmark name and the environment tag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WorkloadDef {
    pub program: Vec<String>,
    pub benchmark: String,
    pub environment: RunEnvironment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDef {
    Argv(Vec<String>),
    Workload(WorkloadDef),
}

impl CommandDef {
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            CommandDef::Argv(args) => args.clone(),
            CommandDef::Workload(workload) => {
                let mut args = workload.program.clone();
                args.push(workload.benchmark.clone());
                args.push(workload.environment.to_string());
                args
            }
        }
    }
}

impl Serialize for CommandDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CommandDef::Argv(args) => args.serialize(serializer),
            CommandDef::Workload(workload) => workload.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CommandDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CommandVisitor;
        impl<'de> serde::de::Visitor<'de> for CommandVisitor {
            type Value = CommandDef;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(
                    formatter,
                    "a list of program arguments or a structure with attributes `program`, `benchmark` and `environment`"
                )
            }

            fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                Ok(CommandDef::Argv(Vec::<String>::deserialize(
                    serde::de::value::SeqAccessDeserializer::new(seq),
                )?))
            }

            fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                Ok(CommandDef::Workload(WorkloadDef::deserialize(
                    serde::de::value::MapAccessDeserializer::new(map),
                )?))
            }
        }

        deserializer.deserialize_any(CommandVisitor)
    }
}

/// Contents of a job file. Plain values come before tables so that the TOML output stays
/// readable.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct JobDef {
    pub name: String,

    #[serde(default = "default_array")]
    pub array: IntArray,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<u32>,

    #[serde(
        deserialize_with = "deserialize_human_duration",
        serialize_with = "serialize_hms_duration"
    )]
    pub time_limit: Duration,

    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_error")]
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_args: Vec<String>,

    pub command: CommandDef,

    #[serde(default)]
    pub resources: ResourcesDef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailDef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_array() -> IntArray {
    IntArray::from_id(0)
}

fn default_output() -> String {
    DEFAULT_STDOUT_TEMPLATE.to_string()
}

fn default_error() -> String {
    DEFAULT_STDERR_TEMPLATE.to_string()
}

/// Values given on the command line that take precedence over the job file.
#[derive(Debug, Default, Clone)]
pub struct DescriptorOverrides {
    pub name: Option<String>,
    pub array: Option<IntArray>,
    /// Replaces the throttle of the job file only when `array` is given
    pub max_concurrent: Option<u32>,
    pub time_limit: Option<Duration>,
    pub benchmark: Option<String>,
    pub environment: Option<RunEnvironment>,
}

impl JobDef {
    pub fn parse(str: &str) -> crate::Result<JobDef> {
        let jdef: JobDef = toml::from_str(str)?;
        Ok(jdef)
    }

    pub fn load(path: &Path) -> crate::Result<JobDef> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            JobDescError::GenericError(format!(
                "Cannot read job file {}: {error}",
                path.display()
            ))
        })?;
        Self::parse(&content).map_err(|error| match error {
            JobDescError::DeserializationError(msg) => JobDescError::DeserializationError(
                format!("Invalid job file {}: {msg}", path.display()),
            ),
            error => error,
        })
    }

    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn apply_overrides(&mut self, overrides: DescriptorOverrides) -> crate::Result<()> {
        let DescriptorOverrides {
            name,
            array,
            max_concurrent,
            time_limit,
            benchmark,
            environment,
        } = overrides;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(array) = array {
            self.array = array;
            self.max_concurrent = max_concurrent;
        }
        if let Some(time_limit) = time_limit {
            self.time_limit = time_limit;
        }
        if benchmark.is_some() || environment.is_some() {
            let CommandDef::Workload(workload) = &mut self.command else {
                return Err(JobDescError::InvalidDescriptor(
                    "`--benchmark` and `--environment` require `command` to be a table with `program`, `benchmark` and `environment`".to_string(),
                ));
            };
            if let Some(benchmark) = benchmark {
                workload.benchmark = benchmark;
            }
            if let Some(environment) = environment {
                workload.environment = environment;
            }
        }
        Ok(())
    }

    /// Builds and validates the descriptor.
    pub fn into_descriptor(self) -> crate::Result<JobDescriptor> {
        let command = self.command.to_argv();
        let descriptor = JobDescriptor {
            name: self.name,
            array: self.array,
            max_concurrent: self.max_concurrent,
            resources: ResourceRequest {
                nodes: self.resources.nodes,
                ntasks: self.resources.ntasks,
                cpus_per_task: self.resources.cpus_per_task,
                mem_per_cpu: self.resources.mem_per_cpu,
                gpus: self.resources.gpus,
            },
            time_limit: self.time_limit,
            mail: self.mail.map(|mail| MailConfig::new(mail.user, mail.events)),
            command,
            output: self.output,
            error: self.error,
            workdir: self.workdir,
            env: self.env,
            additional_args: self.additional_args,
            partition: self.partition,
            account: self.account,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Job file written by `jobdesc init`.
pub const JOB_FILE_TEMPLATE: &str = r#"# Name of the array job
name = "l2o_train"
# Array indices, e.g. "0", "0-9", "0-10:2,15"
array = "0"
# Wall-clock limit of every instance (HH:MM:SS or e.g. "15h 59m")
time_limit = "15:59:00"
# Log files; %x = job name, %A = array job id, %a = array task id, %j = job id
output = "%x-%A_%a.out"
error = "%x-%A_%a.err"

[command]
program = ["python", "l2o_train.py"]
benchmark = "unconstrained_qp"
environment = "cluster"

[resources]
nodes = 1
ntasks = 1
cpus_per_task = 1
mem_per_cpu = "40G"
gpus = 1

[mail]
user = "user@example.com"
events = ["begin", "end", "fail"]
"#;

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::common::error::JobDescError;
    use crate::common::memory::GIB;
    use crate::descriptor::MailEvent;
    use crate::descriptor::jobfile::{
        CommandDef, DescriptorOverrides, JOB_FILE_TEMPLATE, JobDef, RunEnvironment,
    };

    #[test]
    fn test_read_minimal_def() {
        let jdef = JobDef::parse(
            r#"
        name = "train"
        time_limit = "10m"
        command = ["sleep", "1"]
        "#,
        )
        .unwrap();
        assert_eq!(jdef.array.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(jdef.time_limit, Duration::from_secs(600));
        assert_eq!(
            jdef.command,
            CommandDef::Argv(vec!["sleep".to_string(), "1".to_string()])
        );
        let desc = jdef.into_descriptor().unwrap();
        assert_eq!(desc.resources.cpus_per_task, 1);
        assert_eq!(desc.output, "%x-%A_%a.out");
        assert!(desc.mail.is_none());
    }

    #[test]
    fn test_template_is_valid() {
        let desc = JobDef::parse(JOB_FILE_TEMPLATE)
            .unwrap()
            .into_descriptor()
            .unwrap();
        assert_eq!(desc.name, "l2o_train");
        assert_eq!(
            desc.command,
            vec!["python", "l2o_train.py", "unconstrained_qp", "cluster"]
        );
        assert_eq!(desc.resources.mem_per_cpu, Some(40 * GIB));
        assert_eq!(desc.resources.gpus, 1);
        assert_eq!(desc.time_limit, Duration::from_secs(57540));
        assert_eq!(desc.mail.unwrap().events, MailEvent::ALL.to_vec());
    }

    #[test]
    fn test_unknown_fields() {
        let r = JobDef::parse(
            r#"
        name = "x"
        time_limit = "1h"
        command = ["sleep", "1"]
        some_unknown_field_xxx = "123"
        "#,
        );
        assert!(matches!(r, Err(JobDescError::DeserializationError(_))))
    }

    #[test]
    fn test_mail_aliases_and_default_events() {
        let jdef = JobDef::parse(
            r#"
        name = "x"
        time_limit = "1h"
        command = ["sleep", "1"]
        [mail]
        user = "a@b.c"
        "#,
        )
        .unwrap();
        assert_eq!(jdef.mail.unwrap().events, MailEvent::ALL.to_vec());

        let jdef = JobDef::parse(
            r#"
        name = "x"
        time_limit = "1h"
        command = ["sleep", "1"]
        mail = { user = "a@b.c", events = ["fault", "start"] }
        "#,
        )
        .unwrap();
        let desc = jdef.into_descriptor().unwrap();
        assert_eq!(
            desc.mail.unwrap().events,
            vec![MailEvent::Begin, MailEvent::Fail]
        );
    }

    #[test]
    fn test_memory_as_bytes() {
        let jdef = JobDef::parse(
            r#"
        name = "x"
        time_limit = "1h"
        command = ["sleep", "1"]
        resources = { mem_per_cpu = 2048 }
        "#,
        )
        .unwrap();
        assert_eq!(jdef.resources.mem_per_cpu, Some(2048));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let parse = |body: &str| {
            JobDef::parse(&format!(
                "name = \"x\"\ncommand = [\"sleep\"]\n{body}"
            ))
            .and_then(|jdef| jdef.into_descriptor())
        };
        assert!(matches!(
            parse("time_limit = \"0\""),
            Err(JobDescError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            parse("time_limit = \"1h\"\nresources = { cpus_per_task = 0 }"),
            Err(JobDescError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            parse("time_limit = \"soon\""),
            Err(JobDescError::DeserializationError(_))
        ));
        assert!(matches!(
            parse("time_limit = \"1h\"\narray = \"3-1\""),
            Err(JobDescError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut jdef = JobDef::parse(JOB_FILE_TEMPLATE).unwrap();
        jdef.apply_overrides(DescriptorOverrides {
            name: Some("other".to_string()),
            array: Some("0-2".parse().unwrap()),
            max_concurrent: Some(1),
            time_limit: Some(Duration::from_secs(60)),
            benchmark: Some("sparse_coding".to_string()),
            environment: Some(RunEnvironment::Local),
        })
        .unwrap();
        let desc = jdef.into_descriptor().unwrap();
        assert_eq!(desc.name, "other");
        assert_eq!(desc.task_count(), 3);
        assert_eq!(desc.time_limit, Duration::from_secs(60));
        assert_eq!(
            desc.command,
            vec!["python", "l2o_train.py", "sparse_coding", "local"]
        );
    }

    #[test]
    fn test_benchmark_override_needs_workload() {
        let mut jdef = JobDef::parse(
            r#"
        name = "x"
        time_limit = "1h"
        command = ["sleep", "1"]
        "#,
        )
        .unwrap();
        let result = jdef.apply_overrides(DescriptorOverrides {
            benchmark: Some("sine".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(JobDescError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_serialize_roundtrip_of_template() {
        let jdef = JobDef::parse(JOB_FILE_TEMPLATE).unwrap();
        let text = jdef.to_toml().unwrap();
        assert!(text.contains("mem_per_cpu = \"40G\""), "{text}");
        assert!(text.contains("time_limit = \"15:59:00\""), "{text}");
        let parsed = JobDef::parse(&text).unwrap();
        assert_eq!(parsed.command, jdef.command);
        assert_eq!(parsed.resources, jdef.resources);
    }
}
