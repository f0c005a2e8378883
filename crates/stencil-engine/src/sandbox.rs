//! Static sandbox checks
//!
//! Every function identifier in a parsed template is checked before any of
//! it runs, so a forbidden call fails even inside a branch that would never
//! execute.

use std::collections::BTreeSet;

use crate::ast::Tree;
use crate::error::{EngineError, Result, TemplateError, TemplateErrorKind};
use crate::functions::FunctionCatalog;
use crate::suggestions::suggest_unknown_function;

/// Functions that read or expand the host process environment
pub const HOST_ENVIRONMENT_FUNCTIONS: &[&str] = &["env", "expandenv"];

/// Explicit deny-list of function names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    denied: BTreeSet<String>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self {
            denied: HOST_ENVIRONMENT_FUNCTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Sandbox {
    /// A sandbox that denies nothing beyond what the catalogue lacks
    pub fn empty() -> Self {
        Self {
            denied: BTreeSet::new(),
        }
    }

    /// Add a name to the deny-list
    pub fn deny(mut self, name: impl Into<String>) -> Self {
        self.denied.insert(name.into());
        self
    }

    pub fn is_denied(&self, name: &str) -> bool {
        self.denied.contains(name)
    }

    pub fn denied(&self) -> impl Iterator<Item = &str> {
        self.denied.iter().map(String::as_str)
    }

    /// Check every function a template references
    ///
    /// A denied name anywhere in the tree wins over an unknown one, so a
    /// template mixing both always reports the sandbox violation.
    pub fn validate(&self, tree: &Tree, source: &str, catalog: &FunctionCatalog) -> Result<()> {
        let functions = tree.functions();

        if let Some((name, _)) = functions.iter().find(|(name, _)| self.is_denied(name)) {
            return Err(EngineError::DisallowedFunction {
                name: name.to_string(),
                template: tree.name.clone(),
            });
        }

        if let Some((name, span)) = functions.iter().find(|(name, _)| !catalog.contains(name)) {
            let err = TemplateError::new(
                TemplateErrorKind::UnknownFunction,
                format!("function `{}` not defined", name),
                &tree.name,
                source,
                Some(*span),
            )
            .with_suggestion(suggest_unknown_function(name, catalog.names()));
            return Err(EngineError::Syntax(err));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check(sandbox: &Sandbox, source: &str) -> Result<()> {
        let tree = parse(source, "tmpl.yml", 64)?;
        sandbox.validate(&tree, source, &FunctionCatalog::standard())
    }

    #[test]
    fn test_default_denies_host_environment() {
        let sandbox = Sandbox::default();
        assert!(sandbox.is_denied("env"));
        assert!(sandbox.is_denied("expandenv"));
        assert!(!sandbox.is_denied("upper"));
    }

    #[test]
    fn test_denied_in_dead_branch() {
        let err = check(
            &Sandbox::default(),
            r#"{{ if false }}{{ env "HOME" }}{{ end }}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::DisallowedFunction { ref name, ref template }
                if name == "env" && template == "tmpl.yml"
        ));
    }

    #[test]
    fn test_denied_as_argument() {
        let err = check(&Sandbox::default(), r#"{{ printf "%s" (expandenv "$HOME") }}"#).unwrap_err();
        assert!(matches!(err, EngineError::DisallowedFunction { ref name, .. } if name == "expandenv"));
    }

    #[test]
    fn test_denied_wins_over_unknown() {
        let err = check(&Sandbox::default(), r#"{{ nope }}{{ env "HOME" }}"#).unwrap_err();
        assert!(matches!(err, EngineError::DisallowedFunction { .. }));
    }

    #[test]
    fn test_unknown_function_suggestion() {
        let err = check(&Sandbox::default(), "{{ .name | uper }}").unwrap_err();
        let EngineError::Syntax(e) = err else {
            panic!("expected syntax error");
        };
        assert_eq!(e.kind(), TemplateErrorKind::UnknownFunction);
        assert!(
            e.suggestion
                .as_deref()
                .is_some_and(|s| s.starts_with("Did you mean `upper`"))
        );
    }

    #[test]
    fn test_extra_denied_name() {
        let sandbox = Sandbox::empty().deny("sha256sum");
        assert!(check(&sandbox, r#"{{ env "HOME" }}"#).is_err());
        let err = check(&sandbox, r#"{{ sha256sum "x" }}"#).unwrap_err();
        assert!(matches!(err, EngineError::DisallowedFunction { .. }));
    }
}
