pub mod client;
pub mod common;
pub mod descriptor;
pub mod emitter;
pub mod launcher;
pub mod local;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::JobDescError;
pub type Result<T> = std::result::Result<T, Error>;

pub type Map<K, V> = std::collections::HashMap<K, V>;

/// Index of a single task instance inside an array job.
pub type ArrayTaskId = u32;

pub const JOBDESC_VERSION: &str = {
    match option_env!("JOBDESC_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
