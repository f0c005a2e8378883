//! Stencil Registry - Where template bodies come from
//!
//! Rendering never talks to a registry directly. It asks a [`TemplateSource`]
//! for the text of a declared template, so hosts can plug in whatever
//! registry they use. Two sources ship with the crate:
//! - [`MemorySource`]: templates registered up front (tests, embedding)
//! - [`FileSource`]: templates read from a directory on disk

pub mod error;
pub mod file;
pub mod source;

pub use error::{RegistryError, Result};
pub use file::FileSource;
pub use source::{MemorySource, TemplateSource};
