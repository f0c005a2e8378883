//! Parse rendered template output into a fragment

use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use stencil_core::{Fragment, SchemaError, Secret, Service, Step};

/// Top-level keys a template may produce; anything else is ignored
#[derive(Deserialize)]
struct RenderedDocument {
    #[serde(default)]
    steps: Vec<Step>,
    #[serde(default)]
    secrets: Vec<Secret>,
    #[serde(default)]
    services: Vec<Service>,
}

/// Deserialize rendered text into steps, secrets and services
///
/// A document holding only whitespace or comments yields an empty fragment.
/// Templates cannot declare stages, and the steps they produce cannot bind
/// another template.
pub fn parse_fragment(rendered: &str, reference: &str) -> Result<Fragment, SchemaError> {
    if rendered.trim().is_empty() {
        return Ok(Fragment::new(reference));
    }

    let value: YamlValue = serde_yaml::from_str(rendered)?;
    let mapping = match value {
        YamlValue::Null => return Ok(Fragment::new(reference)),
        YamlValue::Mapping(mapping) => mapping,
        _ => {
            return Err(SchemaError::invalid(format!(
                "template {} must render to a mapping",
                reference
            )));
        }
    };

    if mapping.contains_key("stages") {
        return Err(SchemaError::invalid(format!(
            "template {} cannot declare stages",
            reference
        )));
    }

    let document: RenderedDocument = serde_yaml::from_value(YamlValue::Mapping(mapping))?;

    for (i, step) in document.steps.iter().enumerate() {
        if step.name.is_empty() {
            return Err(SchemaError::MissingField {
                field: format!("steps[{}].name", i),
            });
        }
        if step.is_templated() {
            return Err(SchemaError::invalid(format!(
                "step `{}` in template {} cannot reference another template",
                step.name, reference
            )));
        }
    }

    for (i, secret) in document.secrets.iter().enumerate() {
        if secret.name.is_empty() {
            return Err(SchemaError::MissingField {
                field: format!("secrets[{}].name", i),
            });
        }
    }

    for (i, service) in document.services.iter().enumerate() {
        if service.name.is_empty() {
            return Err(SchemaError::MissingField {
                field: format!("services[{}].name", i),
            });
        }
    }

    Ok(Fragment {
        reference: reference.to_string(),
        steps: document.steps,
        secrets: document.secrets,
        services: document.services,
    })
}
