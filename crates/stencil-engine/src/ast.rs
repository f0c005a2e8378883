//! Syntax tree for pipeline templates
//!
//! Directive kinds form a closed set: every block the evaluator can run is a
//! [`Node`] variant, so the evaluator is a single `match`.

use std::fmt;

/// A parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    /// Template reference, used in diagnostics
    pub name: String,
    pub nodes: Vec<Node>,
}

/// Byte range in the template source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, emitted verbatim
    Text(String),
    /// `{{ pipeline }}`
    Output { pipeline: Pipeline, span: Span },
    /// `{{ $name := pipeline }}`
    Assign {
        var: String,
        pipeline: Pipeline,
        span: Span,
    },
    /// `{{ if }} … {{ else if }} … {{ else }} … {{ end }}`
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
        span: Span,
    },
    /// `{{ range }} … {{ else }} … {{ end }}` over a sequence or a map
    Range {
        vars: RangeVars,
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
        span: Span,
    },
}

/// One `if` / `else if` arm
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Pipeline,
    pub body: Vec<Node>,
    pub span: Span,
}

/// Variables declared by a range clause
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RangeVars {
    /// `range .X`
    #[default]
    None,
    /// `range $v := .X`
    Value(String),
    /// `range $k, $v := .X`
    KeyValue(String, String),
}

/// Commands separated by `|`; each result is the last argument of the next
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `name arg1 arg2`
    Call {
        name: String,
        args: Vec<Operand>,
        span: Span,
    },
    /// A single value
    Value { operand: Operand, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.a.b`, or `.` when the path is empty
    Field(Vec<String>),
    /// `$name.a.b`; the empty name is the root (`$`)
    Variable { name: String, path: Vec<String> },
    Literal(Literal),
    /// `( pipeline )`
    Pipeline(Box<Pipeline>),
    /// A function used as an argument, called with no arguments
    Function { name: String, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field(path) => write!(f, ".{}", path.join(".")),
            Operand::Variable { name, path } => {
                write!(f, "${}", name)?;
                for segment in path {
                    write!(f, ".{}", segment)?;
                }
                Ok(())
            }
            Operand::Literal(lit) => write!(f, "{}", lit),
            Operand::Pipeline(_) => write!(f, "(…)"),
            Operand::Function { name, .. } => write!(f, "{}", name),
        }
    }
}

impl Tree {
    /// Visit every function identifier in the tree, in source order
    pub fn functions(&self) -> Vec<(&str, Span)> {
        let mut found = Vec::new();
        collect_nodes(&self.nodes, &mut found);
        found
    }
}

fn collect_nodes<'a>(nodes: &'a [Node], found: &mut Vec<(&'a str, Span)>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Output { pipeline, .. } | Node::Assign { pipeline, .. } => {
                collect_pipeline(pipeline, found)
            }
            Node::If {
                branches,
                otherwise,
                ..
            } => {
                for branch in branches {
                    collect_pipeline(&branch.condition, found);
                    collect_nodes(&branch.body, found);
                }
                if let Some(body) = otherwise {
                    collect_nodes(body, found);
                }
            }
            Node::Range {
                pipeline,
                body,
                otherwise,
                ..
            } => {
                collect_pipeline(pipeline, found);
                collect_nodes(body, found);
                if let Some(body) = otherwise {
                    collect_nodes(body, found);
                }
            }
        }
    }
}

fn collect_pipeline<'a>(pipeline: &'a Pipeline, found: &mut Vec<(&'a str, Span)>) {
    for command in &pipeline.commands {
        match command {
            Command::Call { name, args, span } => {
                found.push((name.as_str(), *span));
                for arg in args {
                    collect_operand(arg, found);
                }
            }
            Command::Value { operand, .. } => collect_operand(operand, found),
        }
    }
}

fn collect_operand<'a>(operand: &'a Operand, found: &mut Vec<(&'a str, Span)>) {
    match operand {
        Operand::Pipeline(inner) => collect_pipeline(inner, found),
        Operand::Function { name, span } => found.push((name.as_str(), *span)),
        Operand::Field(_) | Operand::Variable { .. } | Operand::Literal(_) => {}
    }
}
