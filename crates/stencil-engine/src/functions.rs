//! Template function catalogue
//!
//! The catalogue is an explicit allow-list: a template can only call names
//! registered here. Nothing in the standard set reads the host process
//! environment, the clock or any other external state.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use serde_json::{Map, Value};
use stencil_core::VariableContext;
use thiserror::Error;

use crate::config::Limits;
use crate::value::{compare, display, equal, kind_name, truthy};

/// Error raised by a template function
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FunctionError {
    #[error("{0}")]
    Failed(String),

    /// The result would be larger than a rendered template may be
    #[error("result would exceed {max} bytes")]
    OutputTooLarge { max: usize },
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// What a function may see of the render call
pub struct CallContext<'a> {
    pub variables: &'a VariableContext,
    pub limits: &'a Limits,
}

impl CallContext<'_> {
    /// Fail before building a string of `len` bytes that could never be emitted
    pub fn ensure_output_fits(&self, len: usize) -> Result<(), FunctionError> {
        if len > self.limits.max_output_bytes {
            return Err(FunctionError::OutputTooLarge {
                max: self.limits.max_output_bytes,
            });
        }
        Ok(())
    }
}

pub type FunctionResult = std::result::Result<Value, FunctionError>;

/// Signature of a catalogue entry
///
/// A piped value arrives as the last argument.
pub type Function = fn(&CallContext<'_>, Vec<Value>) -> FunctionResult;

/// Named set of functions callable from templates
#[derive(Clone, Default)]
pub struct FunctionCatalog {
    functions: BTreeMap<String, Function>,
}

impl fmt::Debug for FunctionCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

impl FunctionCatalog {
    /// A catalogue with no functions
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard deterministic catalogue
    pub fn standard() -> Self {
        let mut catalog = Self::empty();

        // Comparison and logic
        catalog.register("eq", eq);
        catalog.register("ne", ne);
        catalog.register("lt", lt);
        catalog.register("le", le);
        catalog.register("gt", gt);
        catalog.register("ge", ge);
        catalog.register("and", and);
        catalog.register("or", or);
        catalog.register("not", not);

        // Collections
        catalog.register("len", len);
        catalog.register("index", index);
        catalog.register("list", list);
        catalog.register("dict", dict);
        catalog.register("keys", keys);
        catalog.register("hasKey", has_key);
        catalog.register("first", first);
        catalog.register("last", last);
        catalog.register("join", join);
        catalog.register("splitList", split_list);

        // Strings
        catalog.register("print", print);
        catalog.register("printf", printf);
        catalog.register("upper", upper);
        catalog.register("lower", lower);
        catalog.register("title", title);
        catalog.register("trim", trim);
        catalog.register("trimPrefix", trim_prefix);
        catalog.register("trimSuffix", trim_suffix);
        catalog.register("replace", replace);
        catalog.register("contains", contains);
        catalog.register("hasPrefix", has_prefix);
        catalog.register("hasSuffix", has_suffix);
        catalog.register("repeat", repeat);
        catalog.register("quote", quote);
        catalog.register("squote", squote);
        catalog.register("indent", indent);
        catalog.register("nindent", nindent);
        catalog.register("toString", to_string);

        // Defaults
        catalog.register("default", default);
        catalog.register("empty", empty);
        catalog.register("coalesce", coalesce);
        catalog.register("ternary", ternary);
        catalog.register("required", required);

        // Encoding
        catalog.register("toYaml", to_yaml);
        catalog.register("toJson", to_json);
        catalog.register("b64enc", b64enc);
        catalog.register("b64dec", b64dec);
        catalog.register("sha256sum", sha256sum);

        // Regular expressions
        catalog.register("regexMatch", regex_match);
        catalog.register("regexReplaceAll", regex_replace_all);

        // Platform
        catalog.register("vela", vela);

        catalog
    }

    /// Add or replace a function
    pub fn register(&mut self, name: impl Into<String>, function: Function) -> &mut Self {
        self.functions.insert(name.into(), function);
        self
    }

    /// Remove a function, returning whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }

    /// Registered names in ascending order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

// Argument helpers

fn expect_args(name: &str, args: &[Value], count: usize) -> Result<(), FunctionError> {
    if args.len() != count {
        return Err(FunctionError::Failed(format!(
            "{} expects {} argument{}, got {}",
            name,
            count,
            if count == 1 { "" } else { "s" },
            args.len()
        )));
    }
    Ok(())
}

fn expect_min_args(name: &str, args: &[Value], min: usize) -> Result<(), FunctionError> {
    if args.len() < min {
        return Err(FunctionError::Failed(format!(
            "{} expects at least {} arguments, got {}",
            name,
            min,
            args.len()
        )));
    }
    Ok(())
}

fn as_int(name: &str, value: &Value) -> Result<i64, FunctionError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| FunctionError::Failed(format!("{}: {} is out of range", name, n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| FunctionError::Failed(format!("{}: cannot use {:?} as an integer", name, s))),
        other => Err(FunctionError::Failed(format!(
            "{}: cannot use {} as an integer",
            name,
            kind_name(other)
        ))),
    }
}

fn as_count(name: &str, value: &Value) -> Result<usize, FunctionError> {
    let n = as_int(name, value)?;
    usize::try_from(n).map_err(|_| FunctionError::Failed(format!("{}: count must not be negative", name)))
}

/// Split off the leading arguments, keeping the last one as the subject
fn split_two(name: &str, args: Vec<Value>) -> Result<(Value, Value), FunctionError> {
    expect_args(name, &args, 2)?;
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(FunctionError::Failed(format!("{} expects 2 arguments", name))),
    }
}

fn split_three(name: &str, args: Vec<Value>) -> Result<(Value, Value, Value), FunctionError> {
    expect_args(name, &args, 3)?;
    let mut args = args.into_iter();
    match (args.next(), args.next(), args.next()) {
        (Some(a), Some(b), Some(c)) => Ok((a, b, c)),
        _ => Err(FunctionError::Failed(format!("{} expects 3 arguments", name))),
    }
}

fn single(name: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
    expect_args(name, &args, 1)?;
    Ok(args.into_iter().next().unwrap_or(Value::Null))
}

fn string_fn(name: &str, args: Vec<Value>, f: impl FnOnce(&str) -> String) -> FunctionResult {
    let value = single(name, args)?;
    Ok(Value::String(f(&display(&value))))
}

// Comparison and logic

/// True when the first argument equals any of the others
///
/// Usage: {{ if eq .VELA_BUILD_BRANCH "main" "master" }}
fn eq(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    expect_min_args("eq", &args, 2)?;
    let (first, rest) = args.split_at(1);
    Ok(Value::Bool(rest.iter().any(|v| equal(&first[0], v))))
}

fn ne(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (a, b) = split_two("ne", args)?;
    Ok(Value::Bool(!equal(&a, &b)))
}

fn ordered(
    name: &str,
    args: Vec<Value>,
    test: fn(std::cmp::Ordering) -> bool,
) -> FunctionResult {
    let (a, b) = split_two(name, args)?;
    let ordering = compare(&a, &b).ok_or_else(|| {
        FunctionError::Failed(format!(
            "{}: incompatible types for comparison: {} and {}",
            name,
            kind_name(&a),
            kind_name(&b)
        ))
    })?;
    Ok(Value::Bool(test(ordering)))
}

fn lt(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    ordered("lt", args, |o| o.is_lt())
}

fn le(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    ordered("le", args, |o| o.is_le())
}

fn gt(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    ordered("gt", args, |o| o.is_gt())
}

fn ge(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    ordered("ge", args, |o| o.is_ge())
}

/// First falsy argument, or the last one
fn and(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    expect_min_args("and", &args, 1)?;
    let last = args.len() - 1;
    Ok(args
        .into_iter()
        .enumerate()
        .find(|(i, v)| !truthy(v) || *i == last)
        .map(|(_, v)| v)
        .unwrap_or(Value::Null))
}

/// First truthy argument, or the last one
fn or(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    expect_min_args("or", &args, 1)?;
    let last = args.len() - 1;
    Ok(args
        .into_iter()
        .enumerate()
        .find(|(i, v)| truthy(v) || *i == last)
        .map(|(_, v)| v)
        .unwrap_or(Value::Null))
}

fn not(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let value = single("not", args)?;
    Ok(Value::Bool(!truthy(&value)))
}

// Collections

fn len(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let value = single("len", args)?;
    let n = match &value {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::Null => 0,
        other => {
            return Err(FunctionError::Failed(format!(
                "len of {} is not defined",
                kind_name(other)
            )));
        }
    };
    Ok(Value::from(n))
}

/// Walk into a collection by successive keys or indexes
///
/// Usage: {{ index .images "golang" }}
fn index(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    expect_min_args("index", &args, 1)?;
    let mut args = args.into_iter();
    let mut current = args.next().unwrap_or(Value::Null);

    for key in args {
        current = match (current, &key) {
            (Value::Object(mut map), _) => map.remove(&display(&key)).unwrap_or(Value::Null),
            (Value::Array(items), _) => {
                let i = as_int("index", &key)?;
                let len = items.len();
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.into_iter().nth(i))
                    .ok_or_else(|| {
                        FunctionError::Failed(format!("index out of range: {} (length {})", i, len))
                    })?
            }
            (Value::Null, _) => Value::Null,
            (other, _) => {
                return Err(FunctionError::Failed(format!(
                    "can't index item of type {}",
                    kind_name(&other)
                )));
            }
        };
    }

    Ok(current)
}

fn list(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    Ok(Value::Array(args))
}

/// Build a map from alternating keys and values
///
/// Usage: {{ $image := dict "name" "golang" "tag" "1.22" }}
fn dict(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    if args.len() % 2 != 0 {
        return Err(FunctionError::Failed(
            "dict expects an even number of arguments".to_string(),
        ));
    }

    let mut map = Map::new();
    let mut args = args.into_iter();
    while let (Some(key), Some(value)) = (args.next(), args.next()) {
        map.insert(display(&key), value);
    }
    Ok(Value::Object(map))
}

/// Keys of one or more maps, sorted
fn keys(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    expect_min_args("keys", &args, 1)?;
    let mut names = Vec::new();
    for arg in &args {
        match arg {
            Value::Object(map) => names.extend(map.keys().cloned()),
            other => {
                return Err(FunctionError::Failed(format!(
                    "keys expects a map, got {}",
                    kind_name(other)
                )));
            }
        }
    }
    names.sort();
    names.dedup();
    Ok(Value::Array(names.into_iter().map(Value::String).collect()))
}

/// Usage: {{ if hasKey .images "golang" }}
fn has_key(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (map, key) = split_two("hasKey", args)?;
    match map {
        Value::Object(map) => Ok(Value::Bool(map.contains_key(&display(&key)))),
        other => Err(FunctionError::Failed(format!(
            "hasKey expects a map, got {}",
            kind_name(&other)
        ))),
    }
}

fn sequence(name: &str, value: Value) -> Result<Vec<Value>, FunctionError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(FunctionError::Failed(format!(
            "{} expects a list, got {}",
            name,
            kind_name(&other)
        ))),
    }
}

fn first(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let items = sequence("first", single("first", args)?)?;
    Ok(items.into_iter().next().unwrap_or(Value::Null))
}

fn last(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let items = sequence("last", single("last", args)?)?;
    Ok(items.into_iter().last().unwrap_or(Value::Null))
}

/// Usage: {{ .tags | join "," }}
fn join(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (sep, items) = split_two("join", args)?;
    let items = sequence("join", items)?;
    let parts: Vec<String> = items.iter().map(display).collect();
    Ok(Value::String(parts.join(&display(&sep))))
}

/// Usage: {{ range splitList "," .VELA_BUILD_TAGS }}
fn split_list(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (sep, text) = split_two("splitList", args)?;
    let text = display(&text);
    let sep = display(&sep);
    if text.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    Ok(Value::Array(
        text.split(sep.as_str())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    ))
}

// Strings

/// Concatenate, with spaces between operands when neither side is a string
fn print(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        out.push_str(&display(arg));
    }
    Ok(Value::String(out))
}

/// Printf-style formatting
///
/// Usage: {{ printf "%s:%s" .image .tag }}
///
/// Supports format specifiers: %s, %d, %f, %v, %q, %t, %%
fn printf(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    expect_min_args("printf", &args, 1)?;
    let format = display(&args[0]);
    let args = &args[1..];

    let mut result = String::with_capacity(format.len() + args.len() * 10);
    let mut chars = format.chars();
    let mut arg_idx = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let verb = match chars.next() {
            Some(v) => v,
            None => {
                result.push('%');
                break;
            }
        };

        if verb == '%' {
            result.push('%');
            continue;
        }

        let arg = args.get(arg_idx).ok_or_else(|| {
            FunctionError::Failed("printf: not enough arguments for format string".to_string())
        })?;
        arg_idx += 1;

        match verb {
            'd' => match arg {
                Value::Number(n) if n.is_i64() || n.is_u64() => result.push_str(&n.to_string()),
                Value::Number(n) => {
                    result.push_str(&(n.as_f64().unwrap_or_default() as i64).to_string())
                }
                other => result.push_str(&format!("%!d({})", display(other))),
            },
            'f' => match arg.as_f64() {
                Some(f) => result.push_str(&format!("{:.6}", f)),
                None => result.push_str(&format!("%!f({})", display(arg))),
            },
            'q' => result.push_str(&format!("{:?}", display(arg))),
            _ => result.push_str(&display(arg)),
        }
    }

    Ok(Value::String(result))
}

fn upper(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    string_fn("upper", args, str::to_uppercase)
}

fn lower(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    string_fn("lower", args, str::to_lowercase)
}

/// Uppercase the first letter of each word
fn title(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    string_fn("title", args, |s| {
        let mut out = String::with_capacity(s.len());
        let mut at_word_start = true;
        for c in s.chars() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            at_word_start = c.is_whitespace() || c == '-' || c == '_';
        }
        out
    })
}

fn trim(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    string_fn("trim", args, |s| s.trim().to_string())
}

/// Usage: {{ .VELA_BUILD_REF | trimPrefix "refs/tags/" }}
fn trim_prefix(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (prefix, text) = split_two("trimPrefix", args)?;
    let (prefix, text) = (display(&prefix), display(&text));
    Ok(Value::String(
        text.strip_prefix(prefix.as_str()).unwrap_or(&text).to_string(),
    ))
}

fn trim_suffix(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (suffix, text) = split_two("trimSuffix", args)?;
    let (suffix, text) = (display(&suffix), display(&text));
    Ok(Value::String(
        text.strip_suffix(suffix.as_str()).unwrap_or(&text).to_string(),
    ))
}

/// Usage: {{ .name | replace "/" "-" }}
fn replace(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (from, to, text) = split_three("replace", args)?;
    Ok(Value::String(
        display(&text).replace(&display(&from), &display(&to)),
    ))
}

fn contains(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (needle, text) = split_two("contains", args)?;
    Ok(Value::Bool(display(&text).contains(&display(&needle))))
}

fn has_prefix(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (prefix, text) = split_two("hasPrefix", args)?;
    Ok(Value::Bool(display(&text).starts_with(&display(&prefix))))
}

fn has_suffix(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (suffix, text) = split_two("hasSuffix", args)?;
    Ok(Value::Bool(display(&text).ends_with(&display(&suffix))))
}

fn repeat(ctx: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (count, text) = split_two("repeat", args)?;
    let count = as_count("repeat", &count)?;
    let text = display(&text);
    ctx.ensure_output_fits(text.len().saturating_mul(count))?;
    Ok(Value::String(text.repeat(count)))
}

/// Double-quote each argument, separated by spaces
fn quote(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let quoted: Vec<String> = args
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| format!("\"{}\"", display(v).replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    Ok(Value::String(quoted.join(" ")))
}

fn squote(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let quoted: Vec<String> = args
        .iter()
        .filter(|v| !v.is_null())
        .map(|v| format!("'{}'", display(v)))
        .collect();
    Ok(Value::String(quoted.join(" ")))
}

fn indent_lines(ctx: &CallContext<'_>, text: &str, spaces: usize) -> Result<String, FunctionError> {
    let lines = text.split('\n').count();
    ctx.ensure_output_fits(spaces.saturating_mul(lines).saturating_add(text.len()))?;

    let pad = " ".repeat(spaces);
    Ok(text
        .split('\n')
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Indent every line of the text
///
/// Usage: {{ .script | indent 4 }}
fn indent(ctx: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (spaces, text) = split_two("indent", args)?;
    let spaces = as_count("indent", &spaces)?;
    Ok(Value::String(indent_lines(ctx, &display(&text), spaces)?))
}

/// Like `indent`, with a leading newline
fn nindent(ctx: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (spaces, text) = split_two("nindent", args)?;
    let spaces = as_count("nindent", &spaces)?;
    Ok(Value::String(format!(
        "\n{}",
        indent_lines(ctx, &display(&text), spaces)?
    )))
}

fn to_string(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    string_fn("toString", args, str::to_string)
}

// Defaults

/// Usage: {{ .tag | default "latest" }}
fn default(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (fallback, given) = split_two("default", args)?;
    Ok(if truthy(&given) { given } else { fallback })
}

fn empty(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let value = single("empty", args)?;
    Ok(Value::Bool(!truthy(&value)))
}

fn coalesce(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    Ok(args.into_iter().find(truthy).unwrap_or(Value::Null))
}

/// Usage: {{ ternary "release" "snapshot" (eq .VELA_BUILD_EVENT "tag") }}
fn ternary(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (yes, no, condition) = split_three("ternary", args)?;
    Ok(if truthy(&condition) { yes } else { no })
}

/// Usage: {{ .image | required "image is required" }}
fn required(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (message, value) = split_two("required", args)?;
    match &value {
        Value::Null => Err(FunctionError::Failed(display(&message))),
        Value::String(s) if s.is_empty() => Err(FunctionError::Failed(display(&message))),
        _ => Ok(value),
    }
}

// Encoding

/// Convert a value to YAML, without the trailing newline
fn to_yaml(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let value = single("toYaml", args)?;
    let yaml = serde_yaml::to_string(&value).map_err(|e| FunctionError::Failed(e.to_string()))?;
    Ok(Value::String(
        yaml.trim_start_matches("---\n").trim_end().to_string(),
    ))
}

fn to_json(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let value = single("toJson", args)?;
    serde_json::to_string(&value)
        .map(Value::String)
        .map_err(|e| FunctionError::Failed(e.to_string()))
}

fn b64enc(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    string_fn("b64enc", args, |s| {
        base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
    })
}

fn b64dec(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let value = single("b64dec", args)?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(display(&value).as_bytes())
        .map_err(|e| FunctionError::Failed(format!("base64 decode error: {}", e)))?;
    String::from_utf8(decoded)
        .map(Value::String)
        .map_err(|e| FunctionError::Failed(format!("UTF-8 decode error: {}", e)))
}

fn sha256sum(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    use sha2::{Digest, Sha256};

    string_fn("sha256sum", args, |s| {
        let mut hasher = Sha256::new();
        hasher.update(s.as_bytes());
        format!("{:x}", hasher.finalize())
    })
}

// Regular expressions

fn compile(name: &str, pattern: &Value) -> Result<regex::Regex, FunctionError> {
    regex::Regex::new(&display(pattern))
        .map_err(|e| FunctionError::Failed(format!("{}: invalid pattern: {}", name, e)))
}

/// Usage: {{ if regexMatch "^v[0-9]+" .VELA_BUILD_TAG }}
fn regex_match(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (pattern, text) = split_two("regexMatch", args)?;
    let re = compile("regexMatch", &pattern)?;
    Ok(Value::Bool(re.is_match(&display(&text))))
}

/// Usage: {{ regexReplaceAll "[^a-z0-9]" .name "-" }}
fn regex_replace_all(_: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let (pattern, text, replacement) = split_three("regexReplaceAll", args)?;
    let re = compile("regexReplaceAll", &pattern)?;
    Ok(Value::String(
        re.replace_all(&display(&text), display(&replacement).as_str())
            .into_owned(),
    ))
}

// Platform

/// Look up a platform variable by short name
///
/// Usage: {{ vela "repo_full_name" }}
///
/// Returns an empty string when the variable is not set.
fn vela(ctx: &CallContext<'_>, args: Vec<Value>) -> FunctionResult {
    let name = single("vela", args)?;
    Ok(Value::String(
        ctx.variables
            .platform_var(&display(&name))
            .unwrap_or_default()
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<Value>) -> FunctionResult {
        let variables: VariableContext = [("VELA_REPO_FULL_NAME", "octocat/hello-world")]
            .into_iter()
            .collect();
        let limits = Limits::default();
        let ctx = CallContext {
            variables: &variables,
            limits: &limits,
        };
        let function = FunctionCatalog::standard()
            .get(name)
            .unwrap_or_else(|| panic!("missing function {}", name));
        function(&ctx, args)
    }

    #[test]
    fn test_standard_has_no_host_functions() {
        let catalog = FunctionCatalog::standard();
        assert!(!catalog.contains("env"));
        assert!(!catalog.contains("expandenv"));
        assert!(catalog.contains("printf"));
    }

    #[test]
    fn test_register_and_remove() {
        fn shout(_: &CallContext<'_>, _: Vec<Value>) -> FunctionResult {
            Ok(json!("HEY"))
        }

        let mut catalog = FunctionCatalog::empty();
        assert!(catalog.is_empty());
        catalog.register("shout", shout);
        assert!(catalog.contains("shout"));
        assert!(catalog.remove("shout"));
        assert!(!catalog.remove("shout"));
    }

    #[test]
    fn test_names_sorted() {
        let mut catalog = FunctionCatalog::empty();
        catalog.register("upper", upper).register("eq", eq);
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["eq", "upper"]);
    }

    #[test]
    fn test_eq_any() {
        assert_eq!(call("eq", vec![json!("dev"), json!("main"), json!("dev")]).unwrap(), json!(true));
        assert_eq!(call("eq", vec![json!("x"), json!("y")]).unwrap(), json!(false));
        assert!(call("eq", vec![json!("x")]).is_err());
    }

    #[test]
    fn test_ordering() {
        assert_eq!(call("lt", vec![json!(1), json!(2)]).unwrap(), json!(true));
        assert_eq!(call("ge", vec![json!("a"), json!("b")]).unwrap(), json!(false));
        assert!(call("lt", vec![json!(1), json!("2")]).is_err());
    }

    #[test]
    fn test_and_or() {
        assert_eq!(call("and", vec![json!(1), json!(""), json!(2)]).unwrap(), json!(""));
        assert_eq!(call("and", vec![json!(1), json!(2)]).unwrap(), json!(2));
        assert_eq!(call("or", vec![json!(""), json!("x")]).unwrap(), json!("x"));
        assert_eq!(call("or", vec![json!(""), json!(0)]).unwrap(), json!(0));
    }

    #[test]
    fn test_index() {
        let images = json!({"golang": {"tag": "1.22"}, "list": ["a", "b"]});
        assert_eq!(
            call("index", vec![images.clone(), json!("golang"), json!("tag")]).unwrap(),
            json!("1.22")
        );
        assert_eq!(call("index", vec![images.clone(), json!("list"), json!(1)]).unwrap(), json!("b"));
        assert_eq!(call("index", vec![images.clone(), json!("missing")]).unwrap(), json!(null));
        assert!(call("index", vec![images, json!("list"), json!(5)]).is_err());
    }

    #[test]
    fn test_dict_and_keys() {
        let map = call("dict", vec![json!("b"), json!(2), json!("a"), json!(1)]).unwrap();
        assert_eq!(call("keys", vec![map.clone()]).unwrap(), json!(["a", "b"]));
        assert_eq!(call("hasKey", vec![map, json!("a")]).unwrap(), json!(true));
        assert!(call("dict", vec![json!("odd")]).is_err());
    }

    #[test]
    fn test_join_split() {
        assert_eq!(call("join", vec![json!(","), json!(["a", 1])]).unwrap(), json!("a,1"));
        assert_eq!(
            call("splitList", vec![json!(","), json!("a,b,c")]).unwrap(),
            json!(["a", "b", "c"])
        );
        assert_eq!(call("splitList", vec![json!(","), json!("")]).unwrap(), json!([]));
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            call("printf", vec![json!("%s:%d %v%%"), json!("golang"), json!(1), json!(true)]).unwrap(),
            json!("golang:1 true%")
        );
        assert_eq!(call("printf", vec![json!("%q"), json!("a")]).unwrap(), json!("\"a\""));
        assert!(call("printf", vec![json!("%s")]).is_err());
    }

    #[test]
    fn test_print() {
        assert_eq!(call("print", vec![json!("a"), json!("b")]).unwrap(), json!("ab"));
        assert_eq!(call("print", vec![json!(1), json!(2)]).unwrap(), json!("1 2"));
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(call("upper", vec![json!("go")]).unwrap(), json!("GO"));
        assert_eq!(call("title", vec![json!("hello world")]).unwrap(), json!("Hello World"));
        assert_eq!(
            call("trimPrefix", vec![json!("refs/tags/"), json!("refs/tags/v1")]).unwrap(),
            json!("v1")
        );
        assert_eq!(
            call("replace", vec![json!("/"), json!("-"), json!("octocat/hello")]).unwrap(),
            json!("octocat-hello")
        );
        assert_eq!(call("repeat", vec![json!(3), json!("ab")]).unwrap(), json!("ababab"));
        assert_eq!(call("quote", vec![json!("a\"b")]).unwrap(), json!("\"a\\\"b\""));
        assert_eq!(call("squote", vec![json!("a")]).unwrap(), json!("'a'"));
    }

    #[test]
    fn test_indent() {
        assert_eq!(call("indent", vec![json!(2), json!("a\nb")]).unwrap(), json!("  a\n  b"));
        assert_eq!(call("nindent", vec![json!(2), json!("a")]).unwrap(), json!("\n  a"));
        assert!(call("indent", vec![json!(-1), json!("a")]).is_err());
    }

    #[test]
    fn test_oversized_results_fail_before_allocating() {
        let max = Limits::default().max_output_bytes;

        let err = call("repeat", vec![json!(i64::MAX), json!("ab")]).unwrap_err();
        assert_eq!(err, FunctionError::OutputTooLarge { max });

        let err = call("indent", vec![json!(i64::MAX), json!("a\nb")]).unwrap_err();
        assert_eq!(err, FunctionError::OutputTooLarge { max });

        let err = call("nindent", vec![json!(max), json!("a")]).unwrap_err();
        assert_eq!(err, FunctionError::OutputTooLarge { max });
    }

    #[test]
    fn test_defaults() {
        assert_eq!(call("default", vec![json!("latest"), json!(null)]).unwrap(), json!("latest"));
        assert_eq!(call("default", vec![json!("latest"), json!("1.22")]).unwrap(), json!("1.22"));
        assert_eq!(call("coalesce", vec![json!(null), json!(""), json!("x")]).unwrap(), json!("x"));
        assert_eq!(
            call("ternary", vec![json!("yes"), json!("no"), json!(false)]).unwrap(),
            json!("no")
        );
        assert_eq!(call("empty", vec![json!([])]).unwrap(), json!(true));
    }

    #[test]
    fn test_required() {
        let err = call("required", vec![json!("image is required"), json!("")]).unwrap_err();
        assert_eq!(err.to_string(), "image is required");
        assert_eq!(call("required", vec![json!("m"), json!("x")]).unwrap(), json!("x"));
    }

    #[test]
    fn test_encoding() {
        assert_eq!(call("toJson", vec![json!({"a": [1]})]).unwrap(), json!(r#"{"a":[1]}"#));
        assert_eq!(call("toYaml", vec![json!({"a": 1})]).unwrap(), json!("a: 1"));
        assert_eq!(call("b64enc", vec![json!("hello")]).unwrap(), json!("aGVsbG8="));
        assert_eq!(call("b64dec", vec![json!("aGVsbG8=")]).unwrap(), json!("hello"));
        assert_eq!(
            call("sha256sum", vec![json!("hello")]).unwrap(),
            json!("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }

    #[test]
    fn test_regex() {
        assert_eq!(call("regexMatch", vec![json!("^v[0-9]+"), json!("v12")]).unwrap(), json!(true));
        assert_eq!(
            call("regexReplaceAll", vec![json!("[^a-z]"), json!("a/b.c"), json!("-")]).unwrap(),
            json!("a-b-c")
        );
        assert!(call("regexMatch", vec![json!("("), json!("x")]).is_err());
    }

    #[test]
    fn test_vela() {
        assert_eq!(call("vela", vec![json!("repo_full_name")]).unwrap(), json!("octocat/hello-world"));
        assert_eq!(call("vela", vec![json!("missing")]).unwrap(), json!(""));
    }
}
