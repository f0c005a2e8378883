//! Template parser
//!
//! Parses template text into a [`Tree`] using pest. Parsing happens in two
//! passes: the grammar yields a flat list of text and actions, then block
//! directives (`if`, `range`, `else`, `end`) are folded into nested nodes.

use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::*;
use crate::error::{EngineError, LimitKind, Result, TemplateError, TemplateErrorKind};

#[derive(Parser)]
#[grammar = "template.pest"]
struct TemplateParser;

/// Parse template text into a tree
pub fn parse(source: &str, name: &str, max_depth: usize) -> Result<Tree> {
    let ctx = ParseContext { source, name };

    let pairs = TemplateParser::parse(Rule::template, source).map_err(|e| ctx.pest_error(e))?;

    let mut tokens = Vec::new();
    for pair in pairs.flatten() {
        match pair.as_rule() {
            Rule::raw_text => tokens.push(Token::Text(pair.as_str().to_string())),
            Rule::action => tokens.push(ctx.action(pair)?),
            _ => {}
        }
    }

    apply_trim(&mut tokens);

    let mut builder = TreeBuilder {
        tokens: tokens.into_iter(),
        ctx,
        max_depth,
    };
    let nodes = builder.root()?;

    Ok(Tree {
        name: name.to_string(),
        nodes,
    })
}

/// Directive found inside one `{{ }}` action
#[derive(Debug)]
enum Directive {
    Comment,
    Output(Pipeline),
    Assign(String, Pipeline),
    If(Pipeline),
    ElseIf(Pipeline),
    Else,
    End,
    Range(RangeVars, Pipeline),
}

#[derive(Debug)]
enum Token {
    Text(String),
    Action {
        directive: Directive,
        trim_left: bool,
        trim_right: bool,
        span: Span,
    },
}

#[derive(Clone, Copy)]
struct ParseContext<'a> {
    source: &'a str,
    name: &'a str,
}

impl ParseContext<'_> {
    fn syntax(&self, span: Span, message: impl Into<String>) -> EngineError {
        EngineError::Syntax(TemplateError::new(
            TemplateErrorKind::SyntaxError,
            message,
            self.name,
            self.source,
            Some(span),
        ))
    }

    fn pest_error(&self, err: pest::error::Error<Rule>) -> EngineError {
        let span = match err.location {
            InputLocation::Pos(pos) => Span::new(pos, 0),
            InputLocation::Span((start, end)) => Span::new(start, end - start),
        };
        let (line, col) = match err.line_col {
            pest::error::LineColLocation::Pos(lc) => lc,
            pest::error::LineColLocation::Span(lc, _) => lc,
        };
        let err = err.renamed_rules(rule_label);
        let message = format!("{} at line {}, column {}", err.variant.message(), line, col);

        EngineError::Syntax(
            TemplateError::new(
                TemplateErrorKind::SyntaxError,
                message,
                self.name,
                self.source,
                Some(span),
            )
            .with_suggestion(
                "Check that every `{{` has a matching `}}` and that directives are spelled correctly",
            ),
        )
    }

    fn action(&self, pair: Pair<Rule>) -> Result<Token> {
        let span = span_of(&pair);
        let mut trim_left = false;
        let mut trim_right = false;
        let mut directive = None;

        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::open => trim_left = inner.as_str().ends_with('-'),
                Rule::close => trim_right = inner.as_str().starts_with('-'),
                _ => directive = Some(self.directive(inner)?),
            }
        }

        let directive = directive.ok_or_else(|| self.syntax(span, "empty action"))?;
        Ok(Token::Action {
            directive,
            trim_left,
            trim_right,
            span,
        })
    }

    fn directive(&self, pair: Pair<Rule>) -> Result<Directive> {
        let span = span_of(&pair);
        match pair.as_rule() {
            Rule::comment => Ok(Directive::Comment),
            Rule::if_open => Ok(Directive::If(self.inner_pipeline(pair)?)),
            Rule::else_if => Ok(Directive::ElseIf(self.inner_pipeline(pair)?)),
            Rule::else_open => Ok(Directive::Else),
            Rule::end => Ok(Directive::End),
            Rule::range_open => {
                let mut vars = RangeVars::None;
                let mut pipeline = None;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::range_vars => {
                            let mut names: Vec<String> =
                                inner.into_inner().map(|v| variable_name(v.as_str())).collect();
                            vars = match names.len() {
                                1 => RangeVars::Value(names.remove(0)),
                                _ => {
                                    let value = names.remove(1);
                                    RangeVars::KeyValue(names.remove(0), value)
                                }
                            };
                        }
                        Rule::pipeline => pipeline = Some(self.pipeline(inner)?),
                        _ => {}
                    }
                }
                let pipeline =
                    pipeline.ok_or_else(|| self.syntax(span, "missing value for range"))?;
                Ok(Directive::Range(vars, pipeline))
            }
            Rule::assign => {
                let mut var = String::new();
                let mut pipeline = None;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::variable => var = variable_name(inner.as_str()),
                        Rule::pipeline => pipeline = Some(self.pipeline(inner)?),
                        _ => {}
                    }
                }
                if var.is_empty() {
                    return Err(self.syntax(span, "cannot assign to `$`"));
                }
                let pipeline =
                    pipeline.ok_or_else(|| self.syntax(span, "missing value for assignment"))?;
                Ok(Directive::Assign(var, pipeline))
            }
            Rule::pipeline => Ok(Directive::Output(self.pipeline(pair)?)),
            other => Err(self.syntax(span, format!("unexpected {}", rule_label(&other)))),
        }
    }

    fn inner_pipeline(&self, pair: Pair<Rule>) -> Result<Pipeline> {
        let span = span_of(&pair);
        pair.into_inner()
            .find(|p| p.as_rule() == Rule::pipeline)
            .map(|p| self.pipeline(p))
            .unwrap_or_else(|| Err(self.syntax(span, "missing condition")))
    }

    fn pipeline(&self, pair: Pair<Rule>) -> Result<Pipeline> {
        let commands = pair
            .into_inner()
            .filter(|p| p.as_rule() == Rule::command)
            .map(|p| self.command(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Pipeline { commands })
    }

    fn command(&self, pair: Pair<Rule>) -> Result<Command> {
        let span = span_of(&pair);
        let mut operands = pair.into_inner();

        let first = operands
            .next()
            .ok_or_else(|| self.syntax(span, "missing value for command"))?;

        if first.as_rule() == Rule::identifier {
            let name = first.as_str().to_string();
            let args = operands
                .map(|p| self.operand(p))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Command::Call { name, args, span });
        }

        let operand = self.operand(first)?;
        if let Some(extra) = operands.next() {
            return Err(self.syntax(
                span_of(&extra),
                format!("can't give argument to non-function {}", operand),
            ));
        }
        Ok(Command::Value { operand, span })
    }

    fn operand(&self, pair: Pair<Rule>) -> Result<Operand> {
        let span = span_of(&pair);
        let text = pair.as_str();

        let operand = match pair.as_rule() {
            Rule::string => Operand::Literal(Literal::String(unescape(text))),
            Rule::raw_string => Operand::Literal(Literal::String(text.trim_matches('`').to_string())),
            Rule::number => {
                let literal = if text.contains('.') {
                    text.parse().map(Literal::Float).ok()
                } else {
                    text.parse().map(Literal::Int).ok()
                };
                Operand::Literal(
                    literal.ok_or_else(|| self.syntax(span, format!("invalid number {}", text)))?,
                )
            }
            Rule::boolean => Operand::Literal(Literal::Bool(text == "true")),
            Rule::nil => Operand::Literal(Literal::Nil),
            Rule::field => Operand::Field(split_path(text)),
            Rule::variable => Operand::Variable {
                name: variable_name(text),
                path: vec![],
            },
            Rule::var_field => {
                let (head, rest) = text.split_once('.').unwrap_or((text, ""));
                Operand::Variable {
                    name: variable_name(head),
                    path: split_path(rest),
                }
            }
            Rule::paren => {
                let inner = pair
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::pipeline)
                    .ok_or_else(|| self.syntax(span, "empty parentheses"))?;
                Operand::Pipeline(Box::new(self.pipeline(inner)?))
            }
            Rule::identifier => Operand::Function {
                name: text.to_string(),
                span,
            },
            other => return Err(self.syntax(span, format!("unexpected {}", rule_label(&other)))),
        };

        Ok(operand)
    }
}

/// Folds the flat token stream into nested blocks
struct TreeBuilder<'a> {
    tokens: std::vec::IntoIter<Token>,
    ctx: ParseContext<'a>,
    max_depth: usize,
}

/// What ended a block
enum Stop {
    End,
    Else(Span),
    ElseIf(Pipeline, Span),
    Eof,
}

impl TreeBuilder<'_> {
    fn root(&mut self) -> Result<Vec<Node>> {
        let (nodes, stop) = self.block(0)?;
        match stop {
            Stop::Eof => Ok(nodes),
            Stop::End => Err(self.ctx.syntax(Span::default(), "unexpected {{ end }}")),
            Stop::Else(span) | Stop::ElseIf(_, span) => {
                Err(self.ctx.syntax(span, "unexpected {{ else }} outside of a block"))
            }
        }
    }

    fn block(&mut self, depth: usize) -> Result<(Vec<Node>, Stop)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.next() {
            let (directive, span) = match token {
                Token::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Token::Action {
                    directive, span, ..
                } => (directive, span),
            };

            match directive {
                Directive::Comment => {}
                Directive::Output(pipeline) => nodes.push(Node::Output { pipeline, span }),
                Directive::Assign(var, pipeline) => {
                    nodes.push(Node::Assign {
                        var,
                        pipeline,
                        span,
                    })
                }
                Directive::If(condition) => nodes.push(self.if_block(condition, span, depth + 1)?),
                Directive::Range(vars, pipeline) => {
                    nodes.push(self.range_block(vars, pipeline, span, depth + 1)?)
                }
                Directive::ElseIf(pipeline) => return Ok((nodes, Stop::ElseIf(pipeline, span))),
                Directive::Else => return Ok((nodes, Stop::Else(span))),
                Directive::End => {
                    if depth == 0 {
                        return Err(self.ctx.syntax(span, "unexpected {{ end }}"));
                    }
                    return Ok((nodes, Stop::End));
                }
            }
        }

        Ok((nodes, Stop::Eof))
    }

    fn enter(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(EngineError::ResourceLimitExceeded {
                limit: LimitKind::Depth,
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn if_block(&mut self, first: Pipeline, span: Span, depth: usize) -> Result<Node> {
        self.enter(depth)?;

        let mut branches = Vec::new();
        let mut condition = first;
        let mut condition_span = span;

        loop {
            let (body, stop) = self.block(depth)?;
            branches.push(Branch {
                condition,
                body,
                span: condition_span,
            });

            match stop {
                Stop::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                        span,
                    });
                }
                Stop::ElseIf(next, next_span) => {
                    condition = next;
                    condition_span = next_span;
                }
                Stop::Else(_) => {
                    let otherwise = self.final_else(depth, "if", span)?;
                    return Ok(Node::If {
                        branches,
                        otherwise: Some(otherwise),
                        span,
                    });
                }
                Stop::Eof => return Err(self.unclosed("if", span)),
            }
        }
    }

    fn range_block(
        &mut self,
        vars: RangeVars,
        pipeline: Pipeline,
        span: Span,
        depth: usize,
    ) -> Result<Node> {
        self.enter(depth)?;

        let (body, stop) = self.block(depth)?;
        let otherwise = match stop {
            Stop::End => None,
            Stop::Else(_) => Some(self.final_else(depth, "range", span)?),
            Stop::ElseIf(_, else_span) => {
                return Err(self.ctx.syntax(else_span, "{{ else if }} is not allowed in range"));
            }
            Stop::Eof => return Err(self.unclosed("range", span)),
        };

        Ok(Node::Range {
            vars,
            pipeline,
            body,
            otherwise,
            span,
        })
    }

    /// Body of a trailing `{{ else }}`, which must be closed by `{{ end }}`
    fn final_else(&mut self, depth: usize, block: &str, open: Span) -> Result<Vec<Node>> {
        let (body, stop) = self.block(depth)?;
        match stop {
            Stop::End => Ok(body),
            Stop::Eof => Err(self.unclosed(block, open)),
            Stop::Else(span) | Stop::ElseIf(_, span) => Err(self
                .ctx
                .syntax(span, format!("unexpected {{{{ else }}}} after {{{{ else }}}} in {}", block))),
        }
    }

    fn unclosed(&self, block: &str, span: Span) -> EngineError {
        self.ctx
            .syntax(span, format!("unclosed {{{{ {} }}}}: missing {{{{ end }}}}", block))
    }
}

/// Apply `{{-` and `-}}` whitespace trimming to neighbouring text
fn apply_trim(tokens: &mut Vec<Token>) {
    for i in 0..tokens.len() {
        let (trim_left, trim_right) = match &tokens[i] {
            Token::Action {
                trim_left,
                trim_right,
                ..
            } => (*trim_left, *trim_right),
            Token::Text(_) => continue,
        };

        if trim_left
            && i > 0
            && let Token::Text(text) = &mut tokens[i - 1]
        {
            let len = text.trim_end().len();
            text.truncate(len);
        }

        if trim_right
            && let Some(Token::Text(text)) = tokens.get_mut(i + 1)
        {
            *text = text.trim_start().to_string();
        }
    }

    tokens.retain(|t| !matches!(t, Token::Text(text) if text.is_empty()));
}

fn span_of(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    Span::new(span.start(), span.end() - span.start())
}

fn variable_name(text: &str) -> String {
    text.trim_start_matches('$').to_string()
}

fn split_path(text: &str) -> Vec<String> {
    text.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn unescape(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text);

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    result
}

fn rule_label(rule: &Rule) -> String {
    match rule {
        Rule::open => "`{{`",
        Rule::close => "`}}`",
        Rule::raw_text => "text",
        Rule::action => "action",
        Rule::pipeline | Rule::command => "a value or function call",
        Rule::identifier => "function name",
        Rule::field | Rule::var_field => "field",
        Rule::variable => "variable",
        Rule::string | Rule::raw_string => "string",
        Rule::number => "number",
        Rule::boolean => "boolean",
        Rule::nil => "nil",
        Rule::paren => "`(`",
        Rule::comment => "comment",
        Rule::if_open | Rule::kw_if => "`if`",
        Rule::else_if | Rule::else_open | Rule::kw_else => "`else`",
        Rule::end | Rule::kw_end => "`end`",
        Rule::range_open | Rule::kw_range => "`range`",
        Rule::range_vars => "range variables",
        Rule::assign => "`:=`",
        Rule::EOI => "end of template",
        _ => "token",
    }
    .to_string()
}
