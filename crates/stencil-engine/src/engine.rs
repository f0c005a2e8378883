//! Template engine

use indexmap::IndexMap;
use serde_json::Value;
use serde_yaml::Value as YamlValue;
use stencil_core::{SchemaError, Template, VariableContext};

use crate::ast::Tree;
use crate::config::{Limits, StepNaming};
use crate::error::{EngineError, Result};
use crate::evaluator::Evaluator;
use crate::functions::FunctionCatalog;
use crate::parser;
use crate::sandbox::Sandbox;
use crate::value;

/// Template engine builder
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    strict_mode: bool,
    limits: Limits,
    step_naming: StepNaming,
    functions: FunctionCatalog,
    sandbox: Sandbox,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            strict_mode: false,
            limits: Limits::default(),
            step_naming: StepNaming::default(),
            functions: FunctionCatalog::standard(),
            sandbox: Sandbox::default(),
        }
    }

    /// Set strict mode (fail on undefined keys)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn step_naming(mut self, step_naming: StepNaming) -> Self {
        self.step_naming = step_naming;
        self
    }

    /// Replace the function catalogue
    pub fn functions(mut self, functions: FunctionCatalog) -> Self {
        self.functions = functions;
        self
    }

    /// Replace the deny-list
    pub fn sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Build the engine
    ///
    /// Denied names are removed from the catalogue, so no registration can
    /// weaken the sandbox.
    pub fn build(mut self) -> Engine {
        let denied: Vec<String> = self.sandbox.denied().map(str::to_string).collect();
        for name in denied {
            if self.functions.remove(&name) {
                tracing::warn!(function = %name, "dropping denied function from template catalogue");
            }
        }

        Engine {
            strict_mode: self.strict_mode,
            limits: self.limits,
            step_naming: self.step_naming,
            functions: self.functions,
            sandbox: self.sandbox,
        }
    }
}

/// The template engine
///
/// An engine holds no per-render state and can be shared across threads.
#[derive(Debug, Clone)]
pub struct Engine {
    strict_mode: bool,
    limits: Limits,
    step_naming: StepNaming,
    functions: FunctionCatalog,
    sandbox: Sandbox,
}

impl Default for Engine {
    fn default() -> Self {
        EngineBuilder::new().build()
    }
}

impl Engine {
    /// Create a new engine with default settings
    pub fn new(strict_mode: bool) -> Self {
        EngineBuilder::new().strict(strict_mode).build()
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn is_strict(&self) -> bool {
        self.strict_mode
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn step_naming(&self) -> StepNaming {
        self.step_naming
    }

    pub fn functions(&self) -> &FunctionCatalog {
        &self.functions
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Parse a template and run the sandbox checks
    pub fn compile(&self, body: &str, name: &str) -> Result<Tree> {
        let tree = parser::parse(body, name, self.limits.max_depth)?;
        self.sandbox.validate(&tree, body, &self.functions)?;
        Ok(tree)
    }

    /// Render a single template string
    ///
    /// `data` is the root value (`.` and `$`); `context` backs the platform
    /// functions.
    pub fn render_string(
        &self,
        body: &str,
        data: Value,
        context: &VariableContext,
        name: &str,
    ) -> Result<String> {
        let tree = self.compile(body, name).inspect_err(|e| log_failure(name, e))?;
        let rendered = Evaluator::new(
            &tree,
            body,
            &self.functions,
            context,
            &self.limits,
            self.strict_mode,
        )
        .run(data)
        .inspect_err(|e| log_failure(name, e))?;

        tracing::trace!(template = name, bytes = rendered.len(), "rendered template");
        Ok(rendered)
    }

    /// Render a template with the variable context as its data
    pub fn evaluate(&self, template: &Template, context: &VariableContext) -> Result<String> {
        self.render_string(
            template.body(),
            Value::Object(context.to_json()),
            context,
            template.reference(),
        )
    }
}

fn log_failure(template: &str, error: &EngineError) {
    match error.template_error() {
        Some(e) => tracing::debug!(
            template,
            kind = e.kind().to_code_string(),
            offset = e.offset(),
            "template failed: {}",
            e.message
        ),
        None => tracing::debug!(template, "template failed: {}", error),
    }
}

/// Root data for a step render: context entries overlaid with template vars
pub(crate) fn template_data(
    context: &VariableContext,
    vars: Option<&IndexMap<String, YamlValue>>,
) -> Result<Value> {
    let mut data = context.to_json();

    for (key, var) in vars.into_iter().flatten() {
        let value = value::from_yaml(var).map_err(|e| {
            SchemaError::invalid(format!("template variable `{}` is not valid: {}", key, e))
        })?;
        data.insert(key.clone(), value);
    }

    Ok(Value::Object(data))
}
