//! Variable context available to templates

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

/// Prefix carried by variables the hosting platform injects
pub const PLATFORM_PREFIX: &str = "vela_";

/// Flattened, precedence-resolved variables for one render call
///
/// Keys are case-sensitive and values are always strings. Insertion order is
/// kept for display; lookups never depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableContext {
    vars: IndexMap<String, String>,
}

impl VariableContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the three variable sources
    ///
    /// On key collision the step environment wins over build metadata, which
    /// wins over platform variables.
    pub fn build(
        platform: &IndexMap<String, String>,
        build_metadata: &IndexMap<String, String>,
        step_env: &IndexMap<String, String>,
    ) -> Self {
        let mut vars = IndexMap::with_capacity(platform.len() + build_metadata.len() + step_env.len());
        for source in [platform, build_metadata, step_env] {
            for (key, value) in source {
                vars.insert(key.clone(), value.clone());
            }
        }
        Self { vars }
    }

    /// Return a new context with `overrides` layered on top
    pub fn layer(&self, overrides: &IndexMap<String, String>) -> Self {
        let mut vars = self.vars.clone();
        for (key, value) in overrides {
            vars.insert(key.clone(), value.clone());
        }
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Look up a platform variable by its short name
    ///
    /// `repo_full_name`, `REPO_FULL_NAME` and `VELA_REPO_FULL_NAME` all
    /// resolve `VELA_REPO_FULL_NAME`. Only keys carrying the platform prefix
    /// are considered.
    pub fn platform_var(&self, name: &str) -> Option<&str> {
        let wanted = name.to_lowercase();
        let wanted = wanted.strip_prefix(PLATFORM_PREFIX).unwrap_or(&wanted);

        self.vars.iter().rev().find_map(|(key, value)| {
            let key = key.to_lowercase();
            match key.strip_prefix(PLATFORM_PREFIX) {
                Some(short) if short == wanted => Some(value.as_str()),
                _ => None,
            }
        })
    }

    /// Convert to a JSON object of string values
    pub fn to_json(&self) -> Map<String, JsonValue> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
