//! Expand one templated step into a fragment

use std::collections::HashSet;

use indexmap::IndexMap;
use stencil_core::{Fragment, Step, Template, VariableContext};

use crate::engine::{Engine, template_data};
use crate::error::{EngineError, ResourceKind, Result};
use crate::fragment::parse_fragment;

impl Engine {
    /// Render a template bound to a step
    ///
    /// The variable context holds only the step's own environment. Produced
    /// steps are renamed according to the engine's [`StepNaming`] policy.
    ///
    /// [`StepNaming`]: crate::config::StepNaming
    pub fn render_step(&self, template: &Template, step: &Step) -> Result<Fragment> {
        let empty = IndexMap::new();
        let context = VariableContext::build(&empty, &empty, &step.environment);
        self.expand_step(template, step, &context)
    }

    /// Render a template bound to a step, layering the step's environment
    /// over a shared context
    pub fn render_step_with_context(
        &self,
        template: &Template,
        step: &Step,
        base: &VariableContext,
    ) -> Result<Fragment> {
        let context = base.layer(&step.environment);
        self.expand_step(template, step, &context)
    }

    fn expand_step(
        &self,
        template: &Template,
        step: &Step,
        context: &VariableContext,
    ) -> Result<Fragment> {
        let vars = step.template.as_ref().map(|binding| &binding.vars);
        let data = template_data(context, vars)?;

        let rendered = self.render_string(template.body(), data, context, template.reference())?;
        let mut fragment = parse_fragment(&rendered, template.reference())?;

        let fan_out = fragment.steps.len() > 1;
        for produced in &mut fragment.steps {
            produced.name = self.step_naming().apply(&step.name, &produced.name, fan_out);
        }

        ensure_unique(ResourceKind::Step, fragment.steps.iter().map(|s| s.name.as_str()))?;
        ensure_unique(ResourceKind::Secret, fragment.secrets.iter().map(|s| s.name.as_str()))?;
        ensure_unique(ResourceKind::Service, fragment.services.iter().map(|s| s.name.as_str()))?;

        tracing::debug!(
            step = %step.name,
            template = template.reference(),
            steps = fragment.steps.len(),
            secrets = fragment.secrets.len(),
            services = fragment.services.len(),
            "expanded step template"
        );

        Ok(fragment)
    }
}

fn ensure_unique<'a>(kind: ResourceKind, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(EngineError::DuplicateResource {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
