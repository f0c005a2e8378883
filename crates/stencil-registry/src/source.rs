//! Template source trait and the in-memory source

use std::collections::HashMap;

use stencil_core::TemplateDecl;

use crate::error::{RegistryError, Result};

/// Anything that can return the body of a declared template
///
/// Implementations must be side-effect free from the renderer's point of
/// view: fetching the same declaration twice returns the same text.
pub trait TemplateSource: Send + Sync {
    /// Source name for diagnostics
    fn name(&self) -> &str;

    /// Return the template text for a declaration
    fn fetch(&self, template: &TemplateDecl) -> Result<String>;
}

impl<T: TemplateSource + ?Sized> TemplateSource for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, template: &TemplateDecl) -> Result<String> {
        (**self).fetch(template)
    }
}

/// Templates held in memory, keyed by declaration `source` or `name`
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    templates: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template body under a key
    pub fn with_template(mut self, key: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(key, body);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(key.into(), body.into());
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TemplateSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, template: &TemplateDecl) -> Result<String> {
        // The declared source is the more specific key
        let found = [template.source.as_str(), template.name.as_str()]
            .into_iter()
            .filter(|key| !key.is_empty())
            .find_map(|key| self.templates.get(key));

        match found {
            Some(body) => {
                tracing::debug!(template = %template.name, "fetched template from memory");
                Ok(body.clone())
            }
            None => Err(RegistryError::TemplateNotFound {
                name: template.reference(),
            }),
        }
    }
}
