//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::engine::EngineBuilder;
use crate::error::Result;
use crate::sandbox::Sandbox;

/// Bounds on a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    /// Maximum size of one rendered template, in bytes
    pub max_output_bytes: usize,
    /// Maximum `range` iterations across one evaluation
    pub max_iterations: usize,
    /// Maximum `if`/`range` nesting depth
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_output_bytes: 1024 * 1024,
            max_iterations: 10_000,
            max_depth: 64,
        }
    }
}

/// How steps produced by a template are named
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepNaming {
    /// Prefix with the templated step's name only when the template fans out
    #[default]
    FanOut,
    /// Always prefix with the templated step's name
    Always,
}

impl StepNaming {
    /// Final name of a produced step
    pub fn apply(self, step: &str, produced: &str, fan_out: bool) -> String {
        match self {
            Self::FanOut if !fan_out => produced.to_string(),
            _ => format!("{}_{}", step, produced),
        }
    }
}

/// Serializable engine settings
///
/// ```yaml
/// strict: true
/// stepNaming: always
/// limits:
///   maxIterations: 500
/// deniedFunctions: [lookup]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Fail on missing keys instead of rendering them empty
    pub strict: bool,
    pub step_naming: StepNaming,
    pub limits: Limits,
    /// Names denied in addition to the host environment functions
    pub denied_functions: Vec<String>,
}

impl EngineConfig {
    /// Load settings from YAML
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(text).map_err(stencil_core::SchemaError::from)?;
        Ok(config)
    }

    /// A builder carrying these settings and the standard catalogue
    pub fn into_builder(self) -> EngineBuilder {
        let sandbox = self
            .denied_functions
            .into_iter()
            .fold(Sandbox::default(), |sandbox, name| sandbox.deny(name));

        EngineBuilder::new()
            .strict(self.strict)
            .step_naming(self.step_naming)
            .limits(self.limits)
            .sandbox(sandbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.strict);
        assert_eq!(config.step_naming, StepNaming::FanOut);
        assert_eq!(config.limits.max_output_bytes, 1024 * 1024);
        assert_eq!(config.limits.max_iterations, 10_000);
        assert_eq!(config.limits.max_depth, 64);
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = EngineConfig::from_yaml(
            "strict: true\nstepNaming: always\nlimits:\n  maxIterations: 500\ndeniedFunctions: [sha256sum]\n",
        )
        .unwrap();

        assert!(config.strict);
        assert_eq!(config.step_naming, StepNaming::Always);
        assert_eq!(config.limits.max_iterations, 500);
        assert_eq!(config.limits.max_depth, 64);
        assert_eq!(config.denied_functions, vec!["sha256sum".to_string()]);
    }

    #[test]
    fn test_from_yaml_empty() {
        assert_eq!(EngineConfig::from_yaml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_from_yaml_invalid() {
        assert!(EngineConfig::from_yaml("stepNaming: sometimes").is_err());
    }

    #[test]
    fn test_into_builder() {
        let config = EngineConfig::from_yaml("strict: true\ndeniedFunctions: [sha256sum]\n").unwrap();
        let engine = config.into_builder().build();

        assert!(engine.is_strict());
        assert!(engine.sandbox().is_denied("sha256sum"));
        assert!(engine.sandbox().is_denied("env"));
        assert!(!engine.functions().contains("sha256sum"));
        assert!(engine.functions().contains("upper"));
    }

    #[test]
    fn test_step_naming() {
        assert_eq!(StepNaming::FanOut.apply("sample", "build", false), "build");
        assert_eq!(StepNaming::FanOut.apply("sample", "build", true), "sample_build");
        assert_eq!(StepNaming::Always.apply("sample", "build", false), "sample_build");
    }
}
