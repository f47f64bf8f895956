// src/core/template.rs

//! # Template Evaluator
//!
//! Expands the `${...}` references found in target arguments and property values.
//!
//! Evaluation runs in two stages for every line of a template:
//!
//! 1. **Variable substitution:** `${NAME}` and `$NAME` are replaced with the value of
//!    `NAME` from the environment. Unknown names are left untouched.
//! 2. **Expression evaluation:** each remaining `${expr}` is evaluated by a small,
//!    sandboxed grammar that only knows two bindings, `env` (the environment) and
//!    `sys` (system properties), and only supports key lookups on them:
//!    `env['KEY']`, `env["KEY"]` or `env.KEY`. A key that does not exist renders as
//!    the literal word `null`.
//!
//! Nothing is ever executed. Any line the grammar cannot evaluate is returned trimmed,
//! exactly as typed.

use crate::models::EnvVars;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use thiserror::Error;

lazy_static! {
    // `$NAME` or `${NAME}`, with an optional escape character `\`.
    static ref MACRO_RE: Regex =
        Regex::new(r"(\\?)\$(?:\{([A-Za-z0-9_.]+)\}|([A-Za-z0-9_]+))")
            .expect("macro regex must compile");
}

/// Rendering of a lookup whose key does not exist.
const MISSING_VALUE: &str = "null";

/// Why a template could not be evaluated.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    /// A `${` without its closing brace.
    #[error("unterminated '${{' in template")]
    Unterminated,
    /// `${}` with nothing inside.
    #[error("empty expression '${{}}'")]
    EmptyExpression,
    /// A name other than the `env` and `sys` bindings.
    #[error("unknown name '{0}'; only 'env' and 'sys' can be referenced")]
    UnknownName(String),
    /// A binding used without a key.
    #[error("'{0}' must be indexed, e.g. {0}['KEY']")]
    UnindexedBinding(String),
    /// An expression outside the supported subset.
    #[error("unsupported expression syntax: '{0}'")]
    Syntax(String),
}

// --- SYSTEM PROPERTIES ---

/// The `sys` binding: process-wide properties, built fresh for every evaluation.
#[derive(Debug, Clone, Default)]
pub struct SystemProperties {
    values: HashMap<String, String>,
}

impl SystemProperties {
    /// Snapshots the properties of the current process.
    pub fn current() -> Self {
        let os_name = match std::env::consts::OS {
            "linux" => "Linux",
            "macos" => "Mac OS X",
            "windows" => "Windows",
            other => other,
        };
        let mut values = HashMap::new();
        values.insert("os.name".to_string(), os_name.to_string());
        values.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
        values.insert(
            "file.separator".to_string(),
            std::path::MAIN_SEPARATOR.to_string(),
        );
        values.insert(
            "path.separator".to_string(),
            if cfg!(windows) { ";" } else { ":" }.to_string(),
        );
        values.insert(
            "line.separator".to_string(),
            if cfg!(windows) { "\r\n" } else { "\n" }.to_string(),
        );
        values.insert(
            "java.io.tmpdir".to_string(),
            std::env::temp_dir().to_string_lossy().into_owned(),
        );
        if let Ok(dir) = std::env::current_dir() {
            values.insert("user.dir".to_string(), dir.to_string_lossy().into_owned());
        }
        if let Some(home) = dirs::home_dir() {
            values.insert("user.home".to_string(), home.to_string_lossy().into_owned());
        }
        if let Ok(user) = std::env::var("USER").or_else(|_| std::env::var("USERNAME")) {
            values.insert("user.name".to_string(), user);
        }
        Self { values }
    }

    /// The value of a property, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SystemProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// --- PUBLIC API ---

/// Evaluates a template against `env` and the current system properties.
pub fn evaluate(env: &EnvVars, template: &str) -> String {
    evaluate_with(env, &SystemProperties::current(), template)
}

/// Evaluates a template against explicit `env` and `sys` bindings.
///
/// Every line is evaluated on its own; the joined result is trimmed.
pub fn evaluate_with(env: &EnvVars, sys: &SystemProperties, template: &str) -> String {
    template
        .lines()
        .map(|line| evaluate_line(env, sys, line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Replaces `$NAME` and `${NAME}` with the value returned by `lookup`.
/// References `lookup` does not know, and escaped ones (`\$NAME`), are kept as-is.
pub fn substitute_variables(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    MACRO_RE
        .replace_all(input, |caps: &Captures<'_>| {
            let full_match = caps.get(0).map_or("", |m| m.as_str());
            let escaped = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            if escaped {
                return full_match.to_string();
            }
            caps.get(2)
                .or_else(|| caps.get(3))
                .and_then(|name| lookup(name.as_str()))
                .unwrap_or_else(|| full_match.to_string())
        })
        .into_owned()
}

// --- LINE EVALUATION ---

fn evaluate_line(env: &EnvVars, sys: &SystemProperties, line: &str) -> String {
    let substituted = substitute_variables(line, |name| env.get(name).cloned());
    match interpolate(&substituted, env, sys) {
        Ok(value) => value.trim().to_string(),
        Err(e) => {
            log::debug!("Template '{}' left as typed: {}", line, e);
            line.trim().to_string()
        }
    }
}

/// Evaluates every `${expr}` of a line. `\$` yields a literal dollar sign.
fn interpolate(line: &str, env: &EnvVars, sys: &SystemProperties) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(pos) = rest.find(|c: char| c == '$' || c == '\\') {
        let (head, tail) = rest.split_at(pos);
        output.push_str(head);

        if let Some(after) = tail.strip_prefix("\\$") {
            output.push('$');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            let end = find_closing_brace(after).ok_or(TemplateError::Unterminated)?;
            let (expression, remainder) = after.split_at(end);
            output.push_str(&evaluate_expression(expression, env, sys)?);
            rest = remainder.strip_prefix('}').unwrap_or(remainder);
        } else {
            let mut chars = tail.chars();
            if let Some(c) = chars.next() {
                output.push(c);
            }
            rest = chars.as_str();
        }
    }
    output.push_str(rest);
    Ok(output)
}

/// Byte offset of the `}` closing an expression, ignoring braces inside quotes.
fn find_closing_brace(expression: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in expression.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '}') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

// --- EXPRESSION GRAMMAR ---
//
// expr := binding ( '[' quoted ']' | '.' key )
// binding := 'env' | 'sys'

fn evaluate_expression(
    expression: &str,
    env: &EnvVars,
    sys: &SystemProperties,
) -> Result<String, TemplateError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(TemplateError::EmptyExpression);
    }

    let (binding, rest) = split_identifier(trimmed);
    if binding.is_empty() {
        return Err(TemplateError::Syntax(trimmed.to_string()));
    }
    if binding != "env" && binding != "sys" {
        return Err(TemplateError::UnknownName(binding.to_string()));
    }

    let rest = rest.trim_start();
    let key = if let Some(index) = rest.strip_prefix('[') {
        parse_index(index).ok_or_else(|| TemplateError::Syntax(trimmed.to_string()))?
    } else if let Some(property) = rest.strip_prefix('.') {
        let (key, tail) = split_identifier(property.trim_start());
        if key.is_empty() || !tail.trim().is_empty() {
            return Err(TemplateError::Syntax(trimmed.to_string()));
        }
        key
    } else if rest.is_empty() {
        return Err(TemplateError::UnindexedBinding(binding.to_string()));
    } else {
        return Err(TemplateError::Syntax(trimmed.to_string()));
    };

    let value = if binding == "env" {
        env.get(key).map(String::as_str)
    } else {
        sys.get(key)
    };
    Ok(value.unwrap_or(MISSING_VALUE).to_string())
}

/// Splits a leading identifier (`[A-Za-z0-9_]+`) from the rest of the input.
fn split_identifier(input: &str) -> (&str, &str) {
    let end = input
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(input.len());
    input.split_at(end)
}

/// Parses `'KEY' ]` (the part after `[`), requiring nothing after the bracket.
fn parse_index(input: &str) -> Option<&str> {
    let input = input.trim_start();
    let mut chars = input.chars();
    let quote = chars.next().filter(|c| *c == '\'' || *c == '"')?;
    let body = chars.as_str();
    let close = body.find(quote)?;
    let (key, after) = body.split_at(close);
    let after = after.strip_prefix(quote)?.trim_start();
    let after = after.strip_prefix(']')?;
    after.trim().is_empty().then_some(key)
}
