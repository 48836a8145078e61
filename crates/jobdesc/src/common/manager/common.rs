use anyhow::Context;

use crate::ArrayTaskId;

/// Source of environment variables. Tests pass a closure over a map instead of the process
/// environment.
pub trait EnvLookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<F: Fn(&str) -> Option<String>> EnvLookup for F {
    fn lookup(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Environment of the current process.
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

pub(super) fn parse_task_id(variable: &str, value: &str) -> anyhow::Result<ArrayTaskId> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid array task id `{value}` in {variable}"))
}

#[cfg(test)]
pub(crate) fn env_from(items: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let items: crate::Map<String, String> = items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| items.get(name).cloned()
}

#[cfg(test)]
mod test {
    use super::{EnvLookup, env_from, parse_task_id};

    #[test]
    fn test_env_from_map() {
        let env = env_from(&[("A", "1")]);
        assert_eq!(env.lookup("A").as_deref(), Some("1"));
        assert_eq!(env.lookup("B"), None);
    }

    #[test]
    fn test_parse_task_id() {
        assert_eq!(parse_task_id("X", "12").unwrap(), 12);
        assert_eq!(parse_task_id("X", " 7\n").unwrap(), 7);
        assert!(parse_task_id("X", "abc").is_err());
        assert!(parse_task_id("X", "-1").is_err());
    }
}
