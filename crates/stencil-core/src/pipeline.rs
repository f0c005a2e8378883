//! Pipeline schema types
//!
//! These types mirror the YAML pipeline format accepted before and after
//! template rendering. Deserialization is lenient where the format allows
//! several spellings (environment as map or `KEY=VALUE` list, commands as a
//! single string or list), serialization always emits the canonical form.

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::ops::{Deref, DerefMut};

use crate::error::{Result, SchemaError};

/// Top-level pipeline definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Build {
    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<YamlValue>,

    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<YamlValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateDecl>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,

    #[serde(default, skip_serializing_if = "Stages::is_empty")]
    pub stages: Stages,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

impl Build {
    /// Whether this build groups its steps into stages
    pub fn uses_stages(&self) -> bool {
        !self.stages.is_empty()
    }

    /// Find a template declaration by name
    pub fn template(&self, name: &str) -> Option<&TemplateDecl> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Check the structural rules serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !self.stages.is_empty() && !self.steps.is_empty() {
            return Err(SchemaError::ConflictingShape);
        }

        for (i, step) in self.steps.iter().enumerate() {
            step.validate(&format!("steps[{}]", i))?;
        }

        for stage in self.stages.iter() {
            if stage.name.is_empty() {
                return Err(SchemaError::MissingField {
                    field: "stages.<name>".to_string(),
                });
            }
            for (i, step) in stage.steps.iter().enumerate() {
                step.validate(&format!("stages.{}.steps[{}]", stage.name, i))?;
            }
        }

        for (i, template) in self.templates.iter().enumerate() {
            if template.name.is_empty() {
                return Err(SchemaError::MissingField {
                    field: format!("templates[{}].name", i),
                });
            }
        }

        Ok(())
    }
}

/// Parse a pipeline document
pub fn parse_build(text: &str) -> Result<Build> {
    if text.trim().is_empty() {
        return Err(SchemaError::invalid("pipeline document is empty"));
    }

    let build: Build = serde_yaml::from_str(text)?;
    build.validate()?;
    Ok(build)
}

/// Serialize a pipeline document
pub fn serialize_build(build: &Build) -> Result<String> {
    Ok(serde_yaml::to_string(build)?)
}

/// A build-level template declaration (`templates:` entry)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDecl {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl TemplateDecl {
    /// Identifier used in diagnostics: `name` or `name (source)`
    pub fn reference(&self) -> String {
        if self.source.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.source)
        }
    }
}

/// A step's binding to a declared template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub name: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub vars: IndexMap<String, YamlValue>,
}

/// One executable unit in a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: String,

    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<Pull>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub commands: Vec<String>,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub entrypoint: Vec<String>,

    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<StepSecret>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<StepTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<YamlValue>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, YamlValue>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub detach: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub privileged: bool,
}

impl Step {
    /// Create a step with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether this step is expanded from a template
    pub fn is_templated(&self) -> bool {
        self.template.is_some()
    }

    fn validate(&self, path: &str) -> Result<()> {
        if self.name.is_empty() {
            return Err(SchemaError::MissingField {
                field: format!("{}.name", path),
            });
        }
        if let Some(template) = &self.template
            && template.name.is_empty()
        {
            return Err(SchemaError::MissingField {
                field: format!("{}.template.name", path),
            });
        }
        Ok(())
    }
}

/// Image pull behavior: a flag or a policy string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pull {
    Flag(bool),
    Policy(String),
}

/// Secret reference inside a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepSecret {
    Name(String),
    Mapped { source: String, target: String },
}

/// Build-level secret declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,

    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub key: String,

    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub engine: String,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub kind: String,
}

/// Build-level service declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,

    #[serde(
        default,
        deserialize_with = "scalar_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub image: String,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub entrypoint: Vec<String>,

    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,

    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ports: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<Pull>,
}

/// A named group of steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage {
    pub name: String,
    pub needs: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Serialize, Deserialize)]
struct StageBody {
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    needs: Vec<String>,

    #[serde(default)]
    steps: Vec<Step>,
}

/// Ordered stages, written in YAML as a mapping from stage name to body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stages(pub Vec<Stage>);

impl Stages {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Stages {
    type Target = Vec<Stage>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Stages {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Serialize for Stages {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for stage in &self.0 {
            let body = StageBody {
                needs: stage.needs.clone(),
                steps: stage.steps.clone(),
            };
            map.serialize_entry(&stage.name, &body)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Stages {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<IndexMap<String, StageBody>>::deserialize(deserializer)?;
        let stages = raw
            .unwrap_or_default()
            .into_iter()
            .map(|(name, body)| Stage {
                name,
                needs: body.needs,
                steps: body.steps,
            })
            .collect();
        Ok(Stages(stages))
    }
}

/// Environment variables, accepted as a mapping or a `KEY=VALUE` list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(pub IndexMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for Environment {
    type Target = IndexMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Environment {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEnvironment {
    Empty,
    Map(IndexMap<String, YamlValue>),
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawEnvironment::deserialize(deserializer).map_err(|_| {
            de::Error::custom("environment must be a mapping or a list of KEY=VALUE strings")
        })?;

        let mut env = IndexMap::new();
        match raw {
            RawEnvironment::Empty => {}
            RawEnvironment::Map(map) => {
                for (key, value) in map {
                    let value = yaml_scalar_to_string(&value).ok_or_else(|| {
                        de::Error::custom(format!(
                            "environment value for `{}` must be a scalar",
                            key
                        ))
                    })?;
                    env.insert(key, value);
                }
            }
            RawEnvironment::List(entries) => {
                for entry in entries {
                    let (key, value) = entry.split_once('=').ok_or_else(|| {
                        de::Error::custom(format!(
                            "environment entry `{}` is not in KEY=VALUE form",
                            entry
                        ))
                    })?;
                    env.insert(key.to_string(), value.to_string());
                }
            }
        }

        Ok(Environment(env))
    }
}

/// Render a YAML scalar as the string a shell would see
pub fn yaml_scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::Null => Some(String::new()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = YamlValue::deserialize(deserializer)?;
    yaml_scalar_to_string(&value).ok_or_else(|| de::Error::custom("expected a scalar value"))
}

fn one_or_many<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    let invalid = || <D::Error as de::Error>::custom("expected a scalar or a list of scalars");

    match YamlValue::deserialize(deserializer)? {
        YamlValue::Null => Ok(Vec::new()),
        YamlValue::Sequence(items) => items
            .iter()
            .map(|item| yaml_scalar_to_string(item).ok_or_else(invalid))
            .collect(),
        scalar => yaml_scalar_to_string(&scalar).map(|s| vec![s]).ok_or_else(invalid),
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps_build() {
        let build = parse_build(
            r#"
version: "1"
steps:
  - name: install
    image: golang:latest
    commands:
      - go get ./...
    environment:
      GOOS: linux
  - name: test
    image: golang:latest
    commands: go test ./...
"#,
        )
        .unwrap();

        assert_eq!(build.version, "1");
        assert_eq!(build.steps.len(), 2);
        assert_eq!(build.steps[0].environment.get("GOOS").unwrap(), "linux");
        assert_eq!(build.steps[1].commands, vec!["go test ./..."]);
        assert!(!build.uses_stages());
    }

    #[test]
    fn test_parse_stages_preserves_order() {
        let build = parse_build(
            r#"
version: "1"
stages:
  zeta:
    steps:
      - name: one
        image: alpine
  alpha:
    needs: zeta
    steps:
      - name: two
        image: alpine
"#,
        )
        .unwrap();

        let names: Vec<&str> = build.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(build.stages[1].needs, vec!["zeta"]);
    }

    #[test]
    fn test_environment_list_form() {
        let step: Step = serde_yaml::from_str(
            r#"
name: test
environment:
  - FOO=bar
  - EMPTY=
  - URL=http://x?a=b
"#,
        )
        .unwrap();

        assert_eq!(step.environment.get("FOO").unwrap(), "bar");
        assert_eq!(step.environment.get("EMPTY").unwrap(), "");
        assert_eq!(step.environment.get("URL").unwrap(), "http://x?a=b");
    }

    #[test]
    fn test_environment_scalars_stringified() {
        let step: Step = serde_yaml::from_str(
            r#"
name: test
environment:
  COUNT: 3
  ENABLED: true
"#,
        )
        .unwrap();

        assert_eq!(step.environment.get("COUNT").unwrap(), "3");
        assert_eq!(step.environment.get("ENABLED").unwrap(), "true");
    }

    #[test]
    fn test_environment_rejects_nested_values() {
        let result: std::result::Result<Step, _> = serde_yaml::from_str(
            r#"
name: test
environment:
  NESTED:
    a: b
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_conflicting_shape_rejected() {
        let result = parse_build(
            r#"
stages:
  test:
    steps:
      - name: a
steps:
  - name: b
"#,
        );
        assert!(matches!(result, Err(SchemaError::ConflictingShape)));
    }

    #[test]
    fn test_step_without_name_rejected() {
        let result = parse_build("steps:\n  - image: alpine\n");
        assert!(matches!(result, Err(SchemaError::MissingField { .. })));
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let result = parse_build("steps:\n  - name: a\n    commands:\n      nested: map\n");
        assert!(matches!(result, Err(SchemaError::YamlParse(_))));
    }

    #[test]
    fn test_numeric_scalars_read_as_strings() {
        let build = parse_build(
            "steps:\n  - name: 1.14\n    image: 42\n    commands: [go test, 7, true]\nservices:\n  - name: 5432\n    ports: 5432\n",
        )
        .unwrap();

        assert_eq!(build.steps[0].name, "1.14");
        assert_eq!(build.steps[0].image, "42");
        assert_eq!(build.steps[0].commands, vec!["go test", "7", "true"]);
        assert_eq!(build.services[0].name, "5432");
        assert_eq!(build.services[0].ports, vec!["5432"]);
    }

    #[test]
    fn test_empty_collections_not_serialized() {
        let build = parse_build("steps:\n  - name: a\n").unwrap();
        let text = serialize_build(&build).unwrap();
        assert!(!text.contains("environment"));
        assert!(!text.contains("stages"));
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(parse_build("   \n").is_err());
    }

    #[test]
    fn test_step_secrets_forms() {
        let step: Step = serde_yaml::from_str(
            r#"
name: publish
secrets:
  - docker_password
  - source: docker_username
    target: plugin_username
"#,
        )
        .unwrap();

        assert_eq!(step.secrets[0], StepSecret::Name("docker_password".into()));
        assert_eq!(
            step.secrets[1],
            StepSecret::Mapped {
                source: "docker_username".into(),
                target: "plugin_username".into()
            }
        );
    }

    #[test]
    fn test_round_trip() {
        let text = r#"
version: "1"
templates:
  - name: golang
    source: templates/go.yml
    type: file
stages:
  build:
    steps:
      - name: sample
        template:
          name: golang
          vars:
            image: golang:latest
"#;
        let build = parse_build(text).unwrap();
        let serialized = serialize_build(&build).unwrap();
        let reparsed = parse_build(&serialized).unwrap();

        assert_eq!(build, reparsed);
        assert_eq!(reparsed.template("golang").unwrap().kind, "file");
    }
}
