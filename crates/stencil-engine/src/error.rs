//! Engine error types with source-annotated diagnostics

use std::fmt;

use miette::{Diagnostic, NamedSource, SourceSpan};
use stencil_core::SchemaError;
use stencil_registry::RegistryError;
use thiserror::Error;

use crate::ast::Span;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template syntax error: {0}")]
    Syntax(TemplateError),

    #[error("Template evaluation error: {0}")]
    Evaluation(TemplateError),

    #[error("Function `{name}` is not allowed in templates ({template})")]
    DisallowedFunction { name: String, template: String },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Duplicate {kind} `{name}`")]
    DuplicateResource { kind: ResourceKind, name: String },

    #[error("Resource limit exceeded: {limit} (max {max})")]
    ResourceLimitExceeded { limit: LimitKind, max: usize },

    #[error("Step `{step}` references undeclared template `{name}`")]
    MissingTemplate { step: String, name: String },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Step `{step}` failed to render template {template}: {source}")]
    Template {
        step: String,
        template: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Wrap with the step and template the failure came from
    pub fn in_template(self, step: impl Into<String>, template: impl Into<String>) -> Self {
        Self::Template {
            step: step.into(),
            template: template.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, past any `Template` wrappers
    pub fn root(&self) -> &EngineError {
        let mut current = self;
        while let Self::Template { source, .. } = current {
            current = source;
        }
        current
    }

    /// The template diagnostic, for syntax and evaluation errors
    pub fn template_error(&self) -> Option<&TemplateError> {
        match self.root() {
            Self::Syntax(e) | Self::Evaluation(e) => Some(e),
            _ => None,
        }
    }
}

/// Kind of pipeline resource involved in a name collision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Step,
    Secret,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::Secret => write!(f, "secret"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// Which rendering limit was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    OutputBytes,
    Iterations,
    Depth,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutputBytes => write!(f, "rendered output size"),
            Self::Iterations => write!(f, "range iterations"),
            Self::Depth => write!(f, "block nesting depth"),
        }
    }
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    SyntaxError,
    UnknownFunction,
    UndefinedVariable,
    TypeError,
    InvalidOperation,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax",
            Self::UnknownFunction => "unknown_function",
            Self::UndefinedVariable => "undefined_variable",
            Self::TypeError => "type",
            Self::InvalidOperation => "invalid_operation",
        }
    }
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(stencil::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    pub fn new(
        kind: TemplateErrorKind,
        message: impl Into<String>,
        template_name: &str,
        template_source: &str,
        span: Option<Span>,
    ) -> Self {
        Self {
            message: message.into(),
            kind,
            src: NamedSource::new(template_name, template_source.to_string()),
            span: span.map(|s| SourceSpan::from((s.offset, s.len))),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }

    /// Byte offset of the error in the template source
    pub fn offset(&self) -> Option<usize> {
        self.span.map(|s| s.offset())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
