pub mod directives;
pub mod jobfile;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::ArrayTaskId;
use crate::common::arraydef::IntArray;
use crate::common::error::{JobDescError, invalid};

/// Resource shape requested for every task instance of the array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRequest {
    pub nodes: u32,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    /// Bytes
    pub mem_per_cpu: Option<u64>,
    pub gpus: u32,
}

impl Default for ResourceRequest {
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

impl ResourceRequest {
    /// CPUs of all tasks of one instance.
    pub fn total_cpus(&self) -> crate::Result<u32> {
        self.cpus_per_task.checked_mul(self.ntasks).ok_or_else(|| {
            JobDescError::InvalidDescriptor(format!(
                "`resources.cpus_per_task` * `resources.ntasks` ({} * {}) is too large",
                self.cpus_per_task, self.ntasks
            ))
        })
    }

    /// Memory of all CPUs of all tasks of one instance.
    pub fn total_memory(&self) -> crate::Result<Option<u64>> {
        let Some(mem) = self.mem_per_cpu else {
            return Ok(None);
        };
        let cpus = self.total_cpus()?;
        mem.checked_mul(cpus as u64).map(Some).ok_or_else(|| {
            JobDescError::InvalidDescriptor(
                "`resources.mem_per_cpu` of all CPUs of an instance is too large".to_string(),
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailEvent {
    #[serde(alias = "start", alias = "BEGIN")]
    Begin,
    #[serde(alias = "END")]
    End,
    #[serde(alias = "fault", alias = "FAIL")]
    Fail,
}

impl MailEvent {
    pub const ALL: [MailEvent; 3] = [MailEvent::Begin, MailEvent::End, MailEvent::Fail];
}

impl Display for MailEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MailEvent::Begin => "begin",
            MailEvent::End => "end",
            MailEvent::Fail => "fail",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailConfig {
    pub user: String,
    /// Sorted, without duplicates
    pub events: Vec<MailEvent>,
}

impl MailConfig {
    pub fn new(user: String, mut events: Vec<MailEvent>) -> Self {
        events.sort_unstable();
        events.dedup();
        Self { user, events }
    }
}

pub(crate) fn serialize_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
}

/// Declarative description of an array job: what to run, how many times and with
/// which resources.
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptor {
    pub name: String,
    pub array: IntArray,
    /// Maximum number of simultaneously running instances
    pub max_concurrent: Option<u32>,
    pub resources: ResourceRequest,
    #[serde(serialize_with = "serialize_duration")]
    pub time_limit: Duration,
    pub mail: Option<MailConfig>,
    pub command: Vec<String>,
    /// Template of the stdout log path of an instance
    pub output: String,
    /// Template of the stderr log path of an instance
    pub error: String,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Raw scheduler directives appended after the generated ones
    pub additional_args: Vec<String>,
    pub partition: Option<String>,
    pub account: Option<String>,
}

impl JobDescriptor {
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return invalid("`name` must not be empty");
        }
        if self.name.contains(['\n', '\r']) {
            return invalid("`name` must be a single line");
        }
        if self.array.is_empty() {
            return invalid("`array` must contain at least one index");
        }
        if self.max_concurrent == Some(0) {
            return invalid("`max_concurrent` must be at least 1");
        }
        let resources = &self.resources;
        for (field, value) in [
            ("nodes", resources.nodes),
            ("ntasks", resources.ntasks),
            ("cpus_per_task", resources.cpus_per_task),
        ] {
            if value == 0 {
                return invalid(format!("`resources.{field}` must be at least 1"));
            }
        }
        if resources.mem_per_cpu == Some(0) {
            return invalid("`resources.mem_per_cpu` must be positive");
        }
        resources.total_cpus()?;
        resources.total_memory()?;
        if self.time_limit < Duration::from_secs(1) {
            return invalid("`time_limit` must be at least one second");
        }
        match self.command.first() {
            None => return invalid("`command` must not be empty"),
            Some(program) if program.is_empty() => {
                return invalid("`command` must start with a program name");
            }
            _ => {}
        }
        if let Some(mail) = &self.mail {
            if mail.user.trim().is_empty() {
                return invalid("`mail.user` must not be empty");
            }
            if mail.events.is_empty() {
                return invalid("`mail.events` must contain at least one event");
            }
        }
        if self.output.is_empty() || self.error.is_empty() {
            return invalid("`output` and `error` templates must not be empty");
        }
        if let Some(key) = self
            .env
            .keys()
            .find(|key| key.is_empty() || key.contains('='))
        {
            return invalid(format!("`env` contains an invalid variable name `{key}`"));
        }
        Ok(())
    }

    pub fn task_ids(&self) -> impl Iterator<Item = ArrayTaskId> + '_ {
        self.array.iter()
    }

    pub fn task_count(&self) -> u32 {
        self.array.id_count()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::{JobDescriptor, MailConfig, MailEvent, ResourceRequest};
    use crate::common::error::JobDescError;
    use crate::common::memory::GIB;
    use crate::common::placeholders::{DEFAULT_STDERR_TEMPLATE, DEFAULT_STDOUT_TEMPLATE};

    /// Single instance training job with one GPU.
    pub fn reference_descriptor() -> JobDescriptor {
        JobDescriptor {
            name: "l2o_train".to_string(),
            array: "0".parse().unwrap(),
            max_concurrent: None,
            resources: ResourceRequest {
                nodes: 1,
                ntasks: 1,
                cpus_per_task: 1,
                mem_per_cpu: Some(40 * GIB),
                gpus: 1,
            },
            time_limit: Duration::from_secs(15 * 3600 + 59 * 60),
            mail: Some(MailConfig::new(
                "user@example.com".to_string(),
                MailEvent::ALL.to_vec(),
            )),
            command: vec![
                "train".to_string(),
                "unconstrained_qp".to_string(),
                "cluster".to_string(),
            ],
            output: DEFAULT_STDOUT_TEMPLATE.to_string(),
            error: DEFAULT_STDERR_TEMPLATE.to_string(),
            workdir: None,
            env: BTreeMap::new(),
            additional_args: vec![],
            partition: None,
            account: None,
        }
    }

    fn assert_invalid(descriptor: JobDescriptor, field: &str) {
        match descriptor.validate() {
            Err(JobDescError::InvalidDescriptor(message)) => {
                assert!(message.contains(field), "{message}")
            }
            result => panic!("Expected invalid descriptor, got {result:?}"),
        }
    }

    #[test]
    fn reference_descriptor_is_valid() {
        reference_descriptor().validate().unwrap();
    }

    #[test]
    fn reject_zero_cpus() {
        let mut desc = reference_descriptor();
        desc.resources.cpus_per_task = 0;
        assert_invalid(desc, "cpus_per_task");
    }

    #[test]
    fn reject_zero_nodes_and_tasks() {
        let mut desc = reference_descriptor();
        desc.resources.nodes = 0;
        assert_invalid(desc, "nodes");

        let mut desc = reference_descriptor();
        desc.resources.ntasks = 0;
        assert_invalid(desc, "ntasks");
    }

    #[test]
    fn reject_zero_time_limit() {
        let mut desc = reference_descriptor();
        desc.time_limit = Duration::ZERO;
        assert_invalid(desc, "time_limit");
    }

    #[test]
    fn reject_sub_second_time_limit() {
        let mut desc = reference_descriptor();
        desc.time_limit = Duration::from_millis(500);
        assert_invalid(desc, "time_limit");

        let mut desc = reference_descriptor();
        desc.time_limit = Duration::from_secs(1);
        desc.validate().unwrap();
    }

    #[test]
    fn reject_empty_array() {
        let mut desc = reference_descriptor();
        desc.array = crate::common::arraydef::IntArray::new(vec![]);
        assert_invalid(desc, "array");
    }

    #[test]
    fn reject_empty_command() {
        let mut desc = reference_descriptor();
        desc.command.clear();
        assert_invalid(desc, "command");
    }

    #[test]
    fn reject_empty_mail_user() {
        let mut desc = reference_descriptor();
        desc.mail = Some(MailConfig::new(String::new(), MailEvent::ALL.to_vec()));
        assert_invalid(desc, "mail.user");
    }

    #[test]
    fn reject_invalid_env_name() {
        let mut desc = reference_descriptor();
        desc.env.insert("A=B".to_string(), "x".to_string());
        assert_invalid(desc, "env");
    }

    #[test]
    fn mail_events_are_normalized() {
        let mail = MailConfig::new(
            "a@b".to_string(),
            vec![MailEvent::Fail, MailEvent::Begin, MailEvent::Fail],
        );
        assert_eq!(mail.events, vec![MailEvent::Begin, MailEvent::Fail]);
    }

    #[test]
    fn total_memory_of_instance() {
        let mut resources = ResourceRequest {
            cpus_per_task: 4,
            ntasks: 2,
            mem_per_cpu: Some(GIB),
            ..Default::default()
        };
        assert_eq!(resources.total_cpus().unwrap(), 8);
        assert_eq!(resources.total_memory().unwrap(), Some(8 * GIB));
        resources.mem_per_cpu = None;
        assert_eq!(resources.total_memory().unwrap(), None);
    }

    #[test]
    fn reject_overflowing_resources() {
        let mut desc = reference_descriptor();
        desc.resources.cpus_per_task = u32::MAX;
        desc.resources.ntasks = 2;
        assert_invalid(desc, "resources.cpus_per_task");

        let mut desc = reference_descriptor();
        desc.resources.cpus_per_task = 1 << 16;
        desc.resources.ntasks = 1 << 15;
        desc.resources.mem_per_cpu = Some(u64::MAX / 4);
        assert_invalid(desc, "resources.mem_per_cpu");
    }
}
