//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to parse pipeline YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid pipeline: {message}")]
    Invalid { message: String },

    #[error("Pipeline defines both stages and steps")]
    ConflictingShape,

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl SchemaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
