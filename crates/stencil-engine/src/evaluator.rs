//! Tree-walking evaluator
//!
//! Runs a validated [`Tree`] against a data root and produces text. Limits on
//! output size and total range iterations are enforced as the tree runs.

use serde_json::Value;
use stencil_core::VariableContext;

use crate::ast::{Command, Literal, Node, Operand, Pipeline, RangeVars, Span, Tree};
use crate::config::Limits;
use crate::error::{EngineError, LimitKind, Result, TemplateError, TemplateErrorKind};
use crate::functions::{CallContext, FunctionCatalog, FunctionError};
use crate::suggestions::suggest_key;
use crate::value::{display, kind_name, truthy};

/// State for one evaluation of one template
pub(crate) struct Evaluator<'a> {
    tree: &'a Tree,
    source: &'a str,
    catalog: &'a FunctionCatalog,
    variables: &'a VariableContext,
    limits: &'a Limits,
    strict: bool,
    root: Value,
    /// Declared `$` variables, innermost last
    scope: Vec<(String, Value)>,
    iterations: usize,
    out: String,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(
        tree: &'a Tree,
        source: &'a str,
        catalog: &'a FunctionCatalog,
        variables: &'a VariableContext,
        limits: &'a Limits,
        strict: bool,
    ) -> Self {
        Self {
            tree,
            source,
            catalog,
            variables,
            limits,
            strict,
            root: Value::Null,
            scope: Vec::new(),
            iterations: 0,
            out: String::new(),
        }
    }

    /// Evaluate the tree with `root` as both `.` and `$`
    pub(crate) fn run(mut self, root: Value) -> Result<String> {
        self.root = root;
        let dot = self.root.clone();
        let tree = self.tree;
        self.block(&tree.nodes, &dot)?;
        Ok(self.out)
    }

    fn error(&self, kind: TemplateErrorKind, message: impl Into<String>, span: Span) -> EngineError {
        EngineError::Evaluation(TemplateError::new(
            kind,
            message,
            &self.tree.name,
            self.source,
            Some(span),
        ))
    }

    fn emit(&mut self, text: &str) -> Result<()> {
        self.out.push_str(text);
        if self.out.len() > self.limits.max_output_bytes {
            return Err(EngineError::ResourceLimitExceeded {
                limit: LimitKind::OutputBytes,
                max: self.limits.max_output_bytes,
            });
        }
        Ok(())
    }

    /// Run nodes in a new variable scope
    fn block(&mut self, nodes: &[Node], dot: &Value) -> Result<()> {
        let mark = self.scope.len();
        let result = nodes.iter().try_for_each(|node| self.node(node, dot));
        self.scope.truncate(mark);
        result
    }

    fn node(&mut self, node: &Node, dot: &Value) -> Result<()> {
        match node {
            Node::Text(text) => self.emit(text),
            Node::Output { pipeline, .. } => {
                let value = self.pipeline(pipeline, dot)?;
                self.emit(&display(&value))
            }
            Node::Assign { var, pipeline, .. } => {
                let value = self.pipeline(pipeline, dot)?;
                self.scope.push((var.clone(), value));
                Ok(())
            }
            Node::If {
                branches,
                otherwise,
                ..
            } => {
                for branch in branches {
                    let condition = self.pipeline(&branch.condition, dot)?;
                    if truthy(&condition) {
                        return self.block(&branch.body, dot);
                    }
                }
                match otherwise {
                    Some(body) => self.block(body, dot),
                    None => Ok(()),
                }
            }
            Node::Range {
                vars,
                pipeline,
                body,
                otherwise,
                span,
            } => {
                let value = self.pipeline(pipeline, dot)?;
                let items = self.range_items(value, *span)?;

                if items.is_empty() {
                    return match otherwise {
                        Some(body) => self.block(body, dot),
                        None => Ok(()),
                    };
                }

                for (key, item) in items {
                    self.iterations += 1;
                    if self.iterations > self.limits.max_iterations {
                        return Err(EngineError::ResourceLimitExceeded {
                            limit: LimitKind::Iterations,
                            max: self.limits.max_iterations,
                        });
                    }

                    let mark = self.scope.len();
                    match vars {
                        RangeVars::None => {}
                        RangeVars::Value(v) => self.scope.push((v.clone(), item.clone())),
                        RangeVars::KeyValue(k, v) => {
                            self.scope.push((k.clone(), key));
                            self.scope.push((v.clone(), item.clone()));
                        }
                    }
                    let result = self.block(body, &item);
                    self.scope.truncate(mark);
                    result?;
                }
                Ok(())
            }
        }
    }

    /// Key and element pairs for a range, maps in ascending key order
    fn range_items(&self, value: Value, span: Span) -> Result<Vec<(Value, Value)>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect()),
            Value::Object(map) => {
                let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(entries
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), v))
                    .collect())
            }
            Value::Number(n) if n.as_u64().is_some() => {
                let count = n.as_u64().unwrap_or_default();
                if count > self.limits.max_iterations as u64 {
                    return Err(EngineError::ResourceLimitExceeded {
                        limit: LimitKind::Iterations,
                        max: self.limits.max_iterations,
                    });
                }
                Ok((0..count)
                    .map(|i| (Value::from(i), Value::from(i)))
                    .collect())
            }
            other => Err(self.error(
                TemplateErrorKind::TypeError,
                format!("range can't iterate over {}", kind_name(&other)),
                span,
            )),
        }
    }

    fn pipeline(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value> {
        let mut piped: Option<Value> = None;

        for command in &pipeline.commands {
            piped = Some(self.command(command, dot, piped.take())?);
        }

        Ok(piped.unwrap_or(Value::Null))
    }

    fn command(&mut self, command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value> {
        match command {
            Command::Call { name, args, span } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                for arg in args {
                    values.push(self.operand(arg, dot, *span)?);
                }
                values.extend(piped);
                self.call(name, values, *span)
            }
            Command::Value { operand, span } => {
                if piped.is_some() {
                    return Err(self.error(
                        TemplateErrorKind::InvalidOperation,
                        format!("can't give argument to non-function {}", operand),
                        *span,
                    ));
                }
                self.operand(operand, dot, *span)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>, span: Span) -> Result<Value> {
        let function = self.catalog.get(name).ok_or_else(|| {
            EngineError::Syntax(TemplateError::new(
                TemplateErrorKind::UnknownFunction,
                format!("function `{}` not defined", name),
                &self.tree.name,
                self.source,
                Some(span),
            ))
        })?;

        let ctx = CallContext {
            variables: self.variables,
            limits: self.limits,
        };
        let result = function(&ctx, args).map_err(|e| match e {
            FunctionError::OutputTooLarge { max } => EngineError::ResourceLimitExceeded {
                limit: LimitKind::OutputBytes,
                max,
            },
            FunctionError::Failed(_) => self.error(
                TemplateErrorKind::InvalidOperation,
                format!("error calling {}: {}", name, e),
                span,
            ),
        })?;

        // Results held in variables never reach `emit`
        if let Value::String(s) = &result
            && s.len() > self.limits.max_output_bytes
        {
            return Err(EngineError::ResourceLimitExceeded {
                limit: LimitKind::OutputBytes,
                max: self.limits.max_output_bytes,
            });
        }
        Ok(result)
    }

    fn operand(&mut self, operand: &Operand, dot: &Value, span: Span) -> Result<Value> {
        match operand {
            Operand::Field(path) => self.lookup(dot, path, span),
            Operand::Variable { name, path } => {
                let base = if name.is_empty() {
                    self.root.clone()
                } else {
                    self.scope
                        .iter()
                        .rev()
                        .find(|(var, _)| var == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| {
                            self.error(
                                TemplateErrorKind::UndefinedVariable,
                                format!("undefined variable: ${}", name),
                                span,
                            )
                        })?
                };
                self.lookup(&base, path, span)
            }
            Operand::Literal(literal) => Ok(match literal {
                Literal::String(s) => Value::String(s.clone()),
                Literal::Int(n) => Value::from(*n),
                Literal::Float(f) => Value::from(*f),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Nil => Value::Null,
            }),
            Operand::Pipeline(inner) => self.pipeline(inner, dot),
            Operand::Function { name, span } => self.call(name, Vec::new(), *span),
        }
    }

    /// Follow a field path from `base`
    fn lookup(&self, base: &Value, path: &[String], span: Span) -> Result<Value> {
        let mut current = base;

        for key in path {
            current = match current {
                Value::Object(map) => match map.get(key) {
                    Some(value) => value,
                    None if self.strict => {
                        let mut err = TemplateError::new(
                            TemplateErrorKind::UndefinedVariable,
                            format!("map has no entry for key \"{}\"", key),
                            &self.tree.name,
                            self.source,
                            Some(span),
                        );
                        if let Some(hint) = suggest_key(key, map.keys().map(String::as_str)) {
                            err = err.with_suggestion(hint);
                        }
                        return Err(EngineError::Evaluation(err));
                    }
                    None => return Ok(Value::Null),
                },
                Value::Null if self.strict => {
                    return Err(self.error(
                        TemplateErrorKind::UndefinedVariable,
                        format!("nil value has no field \"{}\"", key),
                        span,
                    ));
                }
                Value::Null => return Ok(Value::Null),
                other => {
                    return Err(self.error(
                        TemplateErrorKind::TypeError,
                        format!("can't evaluate field {} in type {}", key, kind_name(other)),
                        span,
                    ));
                }
            };
        }

        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn eval_with(source: &str, root: Value, strict: bool, limits: Limits) -> Result<String> {
        let tree = parse(source, "tmpl.yml", limits.max_depth)?;
        let catalog = FunctionCatalog::standard();
        let variables: VariableContext = [("VELA_REPO_FULL_NAME", "octocat/hello-world")]
            .into_iter()
            .collect();
        Evaluator::new(&tree, source, &catalog, &variables, &limits, strict).run(root)
    }

    fn eval(source: &str, root: Value) -> String {
        eval_with(source, root, false, Limits::default()).unwrap()
    }

    #[test]
    fn test_substitution() {
        assert_eq!(
            eval("image: {{ .image }}:{{ .tag }}", json!({"image": "golang", "tag": "1.22"})),
            "image: golang:1.22"
        );
    }

    #[test]
    fn test_nested_field_and_root_variable() {
        let root = json!({"images": {"go": "golang:latest"}});
        assert_eq!(eval("{{ .images.go }}", root.clone()), "golang:latest");
        assert_eq!(eval("{{ range .images }}{{ $.images.go }}{{ end }}", root), "golang:latest");
    }

    #[test]
    fn test_missing_key_lenient() {
        assert_eq!(eval("[{{ .missing }}][{{ .a.b.c }}]", json!({})), "[][]");
    }

    #[test]
    fn test_missing_key_strict() {
        let err = eval_with("{{ .imgae }}", json!({"image": "x"}), true, Limits::default()).unwrap_err();
        let e = err.template_error().unwrap();
        assert_eq!(e.kind(), TemplateErrorKind::UndefinedVariable);
        assert_eq!(e.suggestion.as_deref(), Some("Did you mean `image`?"));
    }

    #[test]
    fn test_field_on_scalar() {
        let err = eval_with("{{ .name.first }}", json!({"name": "x"}), false, Limits::default())
            .unwrap_err();
        assert_eq!(err.template_error().unwrap().kind(), TemplateErrorKind::TypeError);
    }

    #[test]
    fn test_if_else_if() {
        let source = r#"{{ if eq .branch "main" }}prod{{ else if eq .branch "dev" }}dev{{ else }}other{{ end }}"#;
        assert_eq!(eval(source, json!({"branch": "main"})), "prod");
        assert_eq!(eval(source, json!({"branch": "dev"})), "dev");
        assert_eq!(eval(source, json!({"branch": "x"})), "other");
    }

    #[test]
    fn test_range_map_sorted() {
        let root = json!({"images": {"b": "two", "a": "one"}});
        assert_eq!(
            eval("{{ range $k, $v := .images }}{{ $k }}={{ $v }};{{ end }}", root),
            "a=one;b=two;"
        );
    }

    #[test]
    fn test_range_sequence_dot_and_index() {
        let root = json!({"items": ["x", "y", "z"]});
        assert_eq!(eval("{{ range .items }}{{ . }}{{ end }}", root.clone()), "xyz");
        assert_eq!(eval("{{ range $i, $v := .items }}{{ $i }}{{ end }}", root), "012");
    }

    #[test]
    fn test_range_else() {
        assert_eq!(eval("{{ range .items }}x{{ else }}none{{ end }}", json!({"items": []})), "none");
        assert_eq!(eval("{{ range .missing }}x{{ else }}none{{ end }}", json!({})), "none");
    }

    #[test]
    fn test_range_over_int() {
        assert_eq!(eval("{{ range $i := 3 }}{{ $i }}{{ end }}", json!({})), "012");
    }

    #[test]
    fn test_range_over_scalar_fails() {
        let err = eval_with("{{ range .name }}{{ end }}", json!({"name": "x"}), false, Limits::default())
            .unwrap_err();
        assert_eq!(err.template_error().unwrap().kind(), TemplateErrorKind::TypeError);
    }

    #[test]
    fn test_variable_scope_ends_with_block() {
        let err = eval_with(
            "{{ if true }}{{ $x := 1 }}{{ end }}{{ $x }}",
            json!({}),
            false,
            Limits::default(),
        )
        .unwrap_err();
        assert_eq!(err.template_error().unwrap().kind(), TemplateErrorKind::UndefinedVariable);
    }

    #[test]
    fn test_assign_and_pipe() {
        assert_eq!(
            eval(r#"{{ $name := .name | upper }}{{ $name | printf "%s!" }}"#, json!({"name": "go"})),
            "GO!"
        );
    }

    #[test]
    fn test_parenthesized_argument() {
        assert_eq!(
            eval(r#"{{ ternary "yes" "no" (eq .a "1") }}"#, json!({"a": "1"})),
            "yes"
        );
    }

    #[test]
    fn test_function_without_arguments_as_operand() {
        assert_eq!(eval("{{ len list }}", json!({})), "0");
    }

    #[test]
    fn test_platform_function() {
        assert_eq!(eval(r#"{{ vela "repo_full_name" }}"#, json!({})), "octocat/hello-world");
    }

    #[test]
    fn test_function_error_is_evaluation_error() {
        let err = eval_with(r#"{{ required "need image" .image }}"#, json!({}), false, Limits::default())
            .unwrap_err();
        let EngineError::Evaluation(e) = err else {
            panic!("expected evaluation error");
        };
        assert!(e.message.contains("need image"));
    }

    #[test]
    fn test_multiline_text_verbatim() {
        let source = "commands:\n  - |\n    go build\n    go test {{ .pkg }}\n";
        assert_eq!(
            eval(source, json!({"pkg": "./..."})),
            "commands:\n  - |\n    go build\n    go test ./...\n"
        );
    }

    #[test]
    fn test_iteration_limit() {
        let limits = Limits {
            max_iterations: 2,
            ..Limits::default()
        };
        let err = eval_with("{{ range .items }}x{{ end }}", json!({"items": [1, 2, 3]}), false, limits)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ResourceLimitExceeded {
                limit: LimitKind::Iterations,
                max: 2
            }
        ));
    }

    #[test]
    fn test_iteration_limit_counts_nested_ranges() {
        let limits = Limits {
            max_iterations: 5,
            ..Limits::default()
        };
        let root = json!({"a": [1, 2], "b": [1, 2]});
        let err = eval_with(
            "{{ range $.a }}{{ range $.b }}x{{ end }}{{ end }}",
            root,
            false,
            limits,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ResourceLimitExceeded { .. }));
    }

    #[test]
    fn test_huge_repeat_is_a_limit_error() {
        let err = eval_with(
            "{{ repeat 9223372036854775807 \"ab\" }}",
            json!({}),
            false,
            Limits::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ResourceLimitExceeded {
                limit: LimitKind::OutputBytes,
                ..
            }
        ));
    }

    #[test]
    fn test_output_limit_applies_to_assigned_values() {
        let limits = Limits {
            max_output_bytes: 8,
            ..Limits::default()
        };
        let err = eval_with(
            "{{ $x := repeat 50 \"ab\" }}{{ $y := len $x }}",
            json!({}),
            false,
            limits,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ResourceLimitExceeded {
                limit: LimitKind::OutputBytes,
                max: 8
            }
        ));

        let err = eval_with(
            "{{ $x := printf \"%s%s%s%s%s\" .a .a .a .a .a }}",
            json!({"a": "xy"}),
            false,
            limits,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::ResourceLimitExceeded { .. }));
    }

    #[test]
    fn test_output_limit() {
        let limits = Limits {
            max_output_bytes: 8,
            ..Limits::default()
        };
        let err = eval_with("{{ repeat 10 \"ab\" }}", json!({}), false, limits).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ResourceLimitExceeded {
                limit: LimitKind::OutputBytes,
                max: 8
            }
        ));
    }
}
