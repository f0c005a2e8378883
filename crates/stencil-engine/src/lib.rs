//! Stencil Engine - Sandboxed pipeline template rendering
//!
//! This crate expands pipeline templates written in a Go-template style
//! dialect into concrete steps, secrets and services:
//! - A pest-based parser producing a closed set of directive nodes
//! - A static sandbox that rejects host-environment functions before any
//!   template code runs
//! - An explicit, injectable function catalogue
//! - Step and build renderers that splice template output back into a build
//! - Source-annotated diagnostics with suggestions

pub mod ast;
pub mod build;
pub mod config;
pub mod engine;
pub mod error;
mod evaluator;
pub mod fragment;
pub mod functions;
pub mod parser;
pub mod sandbox;
pub mod step;
pub mod suggestions;
pub mod value;

pub use build::BuildRenderer;
pub use config::{EngineConfig, Limits, StepNaming};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, LimitKind, ResourceKind, Result, TemplateError, TemplateErrorKind};
pub use fragment::parse_fragment;
pub use functions::{CallContext, Function, FunctionCatalog, FunctionError};
pub use sandbox::{HOST_ENVIRONMENT_FUNCTIONS, Sandbox};
