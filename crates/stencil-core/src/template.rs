//! Loaded template text

/// Raw template text and the reference it was loaded from
///
/// A template is immutable once loaded; renderers only ever borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    reference: String,
    body: String,
}

impl Template {
    pub fn new(reference: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            body: body.into(),
        }
    }

    /// Name used when reporting errors for this template
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}
