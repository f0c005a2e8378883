//! Expand every templated step of a build

use std::collections::HashSet;

use indexmap::IndexMap;
use stencil_core::{
    Build, Secret, Service, Step, Template, TemplateDecl, VariableContext, parse_build,
};
use stencil_registry::TemplateSource;

use crate::engine::Engine;
use crate::error::{EngineError, ResourceKind, Result};

/// Renders a whole build against a template source
///
/// Steps are expanded one at a time in declaration order. Stages are
/// expanded left to right and keep their names and `needs`.
pub struct BuildRenderer<'a, S: TemplateSource + ?Sized> {
    engine: &'a Engine,
    source: &'a S,
}

impl<'a, S: TemplateSource + ?Sized> BuildRenderer<'a, S> {
    pub fn new(engine: &'a Engine, source: &'a S) -> Self {
        Self { engine, source }
    }

    /// Parse a pipeline document and expand it
    pub fn render(&self, build_text: &str, platform: &IndexMap<String, String>) -> Result<Build> {
        let build = parse_build(build_text)?;
        self.expand(build, platform)
    }

    /// Expand an already parsed build
    ///
    /// Nothing is returned unless every templated step rendered.
    pub fn expand(&self, mut build: Build, platform: &IndexMap<String, String>) -> Result<Build> {
        let shared = VariableContext::build(platform, &build.environment, &IndexMap::new());
        let mut resources = Resources::new(&build.secrets, &build.services);

        tracing::debug!(
            source = self.source.name(),
            stages = build.stages.len(),
            steps = build.steps.len(),
            "rendering build"
        );

        let mut stages = std::mem::take(&mut build.stages);
        let steps = std::mem::take(&mut build.steps);

        if stages.is_empty() {
            build.steps = self.expand_steps(steps, &build, &shared, &mut resources)?;
        } else {
            for stage in stages.iter_mut() {
                let steps = std::mem::take(&mut stage.steps);
                stage.steps = self.expand_steps(steps, &build, &shared, &mut resources)?;
                tracing::debug!(stage = %stage.name, steps = stage.steps.len(), "expanded stage");
            }
            build.stages = stages;
        }

        build.secrets = resources.secrets;
        build.services = resources.services;
        Ok(build)
    }

    /// Expand one step collection, splicing produced steps in place
    fn expand_steps(
        &self,
        steps: Vec<Step>,
        build: &Build,
        shared: &VariableContext,
        resources: &mut Resources,
    ) -> Result<Vec<Step>> {
        let mut expanded = Vec::with_capacity(steps.len());

        for step in steps {
            let Some(template_name) = step.template.as_ref().map(|t| t.name.clone()) else {
                resources.claim_step(&step.name)?;
                expanded.push(step);
                continue;
            };

            let decl = build.template(&template_name).ok_or_else(|| {
                EngineError::MissingTemplate {
                    step: step.name.clone(),
                    name: template_name.clone(),
                }
                .in_template(&step.name, &template_name)
            })?;
            let reference = decl.reference();

            let produced = self
                .expand_one(&step, decl, shared, resources)
                .map_err(|e| e.in_template(&step.name, &reference))?;
            expanded.extend(produced);
        }

        Ok(expanded)
    }

    fn expand_one(
        &self,
        step: &Step,
        decl: &TemplateDecl,
        shared: &VariableContext,
        resources: &mut Resources,
    ) -> Result<Vec<Step>> {
        let body = self.source.fetch(decl)?;
        let template = Template::new(decl.reference(), body);

        let fragment = self
            .engine
            .render_step_with_context(&template, step, shared)?;
        let (steps, secrets, services) = fragment.into_parts();

        resources.absorb(&steps, secrets, services)?;
        Ok(steps)
    }
}

/// Names and resources accumulated across a build
struct Resources {
    step_names: HashSet<String>,
    secrets: Vec<Secret>,
    services: Vec<Service>,
}

impl Resources {
    fn new(secrets: &[Secret], services: &[Service]) -> Self {
        Self {
            step_names: HashSet::new(),
            secrets: secrets.to_vec(),
            services: services.to_vec(),
        }
    }

    fn claim_step(&mut self, name: &str) -> Result<()> {
        if !self.step_names.insert(name.to_string()) {
            return Err(EngineError::DuplicateResource {
                kind: ResourceKind::Step,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Add what one template produced, all or nothing
    fn absorb(&mut self, steps: &[Step], secrets: Vec<Secret>, services: Vec<Service>) -> Result<()> {
        if let Some(step) = steps.iter().find(|s| self.step_names.contains(&s.name)) {
            return Err(EngineError::DuplicateResource {
                kind: ResourceKind::Step,
                name: step.name.clone(),
            });
        }
        for secret in &secrets {
            if self.secrets.iter().any(|s| s.name == secret.name) {
                return Err(EngineError::DuplicateResource {
                    kind: ResourceKind::Secret,
                    name: secret.name.clone(),
                });
            }
        }
        for service in &services {
            if self.services.iter().any(|s| s.name == service.name) {
                return Err(EngineError::DuplicateResource {
                    kind: ResourceKind::Service,
                    name: service.name.clone(),
                });
            }
        }

        self.step_names.extend(steps.iter().map(|s| s.name.clone()));
        self.secrets.extend(secrets);
        self.services.extend(services);
        Ok(())
    }
}

impl Engine {
    /// Parse and expand a pipeline document
    pub fn render_build<S: TemplateSource + ?Sized>(
        &self,
        build_text: &str,
        platform: &IndexMap<String, String>,
        source: &S,
    ) -> Result<Build> {
        BuildRenderer::new(self, source).render(build_text, platform)
    }
}
