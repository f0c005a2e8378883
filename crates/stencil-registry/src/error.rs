//! Error types for template sources

use std::path::PathBuf;
use thiserror::Error;

/// Template source errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("Unsupported template type `{kind}` for {name}")]
    UnsupportedType { name: String, kind: String },

    #[error("Template path escapes the registry root: {path}")]
    OutsideRoot { path: PathBuf },

    #[error("Registry root does not exist: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RegistryError>;
