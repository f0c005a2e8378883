//! Rendered template fragment

use crate::pipeline::{Secret, Service, Step};

/// The typed result of rendering one template
///
/// `reference` names the template the items came from, so anything taken
/// out of a fragment can still be attributed in diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub reference: String,
    pub steps: Vec<Step>,
    pub secrets: Vec<Secret>,
    pub services: Vec<Service>,
}

impl Fragment {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.secrets.is_empty() && self.services.is_empty()
    }

    /// Split into the (steps, secrets, services) triple
    pub fn into_parts(self) -> (Vec<Step>, Vec<Secret>, Vec<Service>) {
        (self.steps, self.secrets, self.services)
    }
}
