//! Stencil Core - Pipeline schema types and variable context
//!
//! This crate provides the foundational types used throughout Stencil:
//! - `Build`: The top-level pipeline definition (stages or steps)
//! - `Step`, `Stage`, `Secret`, `Service`: Pipeline resources
//! - `TemplateDecl` / `StepTemplate`: Template declarations and bindings
//! - `VariableContext`: Precedence-resolved variables available to templates
//! - `Template`: Raw template text with its reference
//! - `Fragment`: The typed result of rendering one template

pub mod context;
pub mod error;
pub mod fragment;
pub mod pipeline;
pub mod template;

pub use context::{PLATFORM_PREFIX, VariableContext};
pub use error::{Result, SchemaError};
pub use fragment::Fragment;
pub use pipeline::{
    Build, Environment, Pull, Secret, Service, Stage, Stages, Step, StepSecret, StepTemplate,
    TemplateDecl, parse_build, serialize_build, yaml_scalar_to_string,
};
pub use template::Template;
