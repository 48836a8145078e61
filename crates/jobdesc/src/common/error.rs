use thiserror::Error;

use crate::common::error::JobDescError::GenericError;

#[derive(Debug, Error)]
pub enum JobDescError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Invalid job descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Cannot render script: {0}")]
    RenderError(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<serde_json::error::Error> for JobDescError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for JobDescError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(error.to_string())
    }
}

impl From<toml::de::Error> for JobDescError {
    fn from(error: toml::de::Error) -> Self {
        Self::DeserializationError(error.to_string())
    }
}

impl From<toml::ser::Error> for JobDescError {
    fn from(error: toml::ser::Error) -> Self {
        Self::SerializationError(error.to_string())
    }
}

pub fn error<T>(message: String) -> crate::Result<T> {
    Err(GenericError(message))
}

pub fn invalid<T>(message: impl Into<String>) -> crate::Result<T> {
    Err(JobDescError::InvalidDescriptor(message.into()))
}

impl From<String> for JobDescError {
    fn from(e: String) -> Self {
        GenericError(e)
    }
}
