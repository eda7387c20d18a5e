// File: script.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Narrow boundary to user scripts. The parser only sees [`ScriptHook`]:
//! named inputs go in, named outputs come back, nothing is retained
//! between calls.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::escape;

pub const INPUT: &str = "input";
pub const HEADER_LINES: &str = "headerLines";
pub const HEADERS: &str = "headers";
pub const BODY: &str = "body";
pub const BUFFER: &str = "buffer";
pub const OUTPUT: &str = "output";
pub const RESULT: &str = "result";
pub const OUT_HEADER_LINES: &str = "outHeaderLines";
pub const OUT_BODY: &str = "outBody";
pub const OUT_BUFFER: &str = "outBuffer";

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Text(String),
    Bytes(Vec<u8>),
    Lines(Vec<String>),
    Bool(bool),
    Number(f64),
}

impl ScriptValue {
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Lines(lines) => lines.concat(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => format_number(*value),
        }
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes.clone(),
            other => other.as_text().into_bytes(),
        }
    }

    pub fn as_lines(&self) -> Option<Vec<String>> {
        match self {
            Self::Lines(lines) => Some(lines.clone()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

/// Integral numbers render without a fractional part ("15", never "15.0").
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptVars(BTreeMap<String, ScriptValue>);

impl ScriptVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ScriptValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: &str, value: ScriptValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    Runtime(String),
    Unsupported(String),
    MissingOutput(String),
    InvalidOutput { name: String, expected: &'static str },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime(msg) => write!(f, "{}", msg),
            Self::Unsupported(script) => write!(f, "Unsupported script: {}", script),
            Self::MissingOutput(name) => write!(f, "Script did not set {}", name),
            Self::InvalidOutput { name, expected } => {
                write!(f, "Script output {} is not a {}", name, expected)
            }
        }
    }
}

impl std::error::Error for ScriptError {}

pub trait ScriptHook {
    fn invoke(&self, script: &str, inputs: &ScriptVars) -> Result<ScriptVars, ScriptError>;
}

/// Runs `script` as a boolean predicate, reading `result` or else `output`.
pub fn run_predicate(
    hook: &dyn ScriptHook,
    script: &str,
    inputs: &ScriptVars,
) -> Result<bool, ScriptError> {
    let outputs = hook.invoke(script, inputs)?;
    let value = outputs
        .get(RESULT)
        .or_else(|| outputs.get(OUTPUT))
        .ok_or_else(|| ScriptError::MissingOutput(RESULT.to_string()))?;
    value.as_bool().ok_or(ScriptError::InvalidOutput {
        name: RESULT.to_string(),
        expected: "boolean",
    })
}

/// Hook for hosts without any script runtime: every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScripts;

impl ScriptHook for NoScripts {
    fn invoke(&self, script: &str, _inputs: &ScriptVars) -> Result<ScriptVars, ScriptError> {
        Err(ScriptError::Unsupported(script.to_string()))
    }
}

static COMPARISON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([A-Za-z_]\w*)\s*(===|!==|==|!=)\s*"((?:[^"\\]|\\.)*)"$"#).unwrap()
});

static STRING_METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^([A-Za-z_]\w*)\.(includes|startsWith|endsWith)\(\s*"((?:[^"\\]|\\.)*)"\s*\)$"#)
        .unwrap()
});

static REGEX_TEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^/((?:[^/\\]|\\.)+)/([a-z]*)\.test\(\s*([A-Za-z_]\w*)\s*\)$"#).unwrap()
});

/// Predicate-only hook understanding single-expression scripts such as
/// `return input === "TRACE";`, `body.includes("admin")` or
/// `/^\/api/.test(input)`. Transform scripts are reported as unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionHook;

impl ExpressionHook {
    pub fn new() -> Self {
        Self
    }

    fn evaluate(&self, script: &str, inputs: &ScriptVars) -> Result<bool, ScriptError> {
        let mut expr = script.trim();
        if let Some(rest) = expr.strip_prefix("return") {
            if rest.starts_with(char::is_whitespace) {
                expr = rest.trim_start();
            }
        }
        expr = expr.trim_end_matches(';').trim();

        if let Some(rest) = expr.strip_prefix('!') {
            let inner = rest.trim();
            let inner = inner
                .strip_prefix('(')
                .and_then(|i| i.strip_suffix(')'))
                .unwrap_or(inner);
            return self.evaluate(inner, inputs).map(|value| !value);
        }

        match expr {
            "true" => return Ok(true),
            "false" => return Ok(false),
            _ => {}
        }

        if let Some(caps) = COMPARISON.captures(expr) {
            let value = lookup(inputs, &caps[1])?;
            let literal = unescape_literal(&caps[3]);
            let equal = value == literal;
            return Ok(match &caps[2] {
                "===" | "==" => equal,
                _ => !equal,
            });
        }

        if let Some(caps) = STRING_METHOD.captures(expr) {
            let value = lookup(inputs, &caps[1])?;
            let literal = unescape_literal(&caps[3]);
            return Ok(match &caps[2] {
                "includes" => value.contains(&literal),
                "startsWith" => value.starts_with(&literal),
                _ => value.ends_with(&literal),
            });
        }

        if let Some(caps) = REGEX_TEST.captures(expr) {
            let value = lookup(inputs, &caps[3])?;
            let pattern = if caps[2].contains('i') {
                format!("(?i){}", &caps[1])
            } else {
                caps[1].to_string()
            };
            let regex = Regex::new(&pattern).map_err(|e| ScriptError::Runtime(e.to_string()))?;
            return Ok(regex.is_match(&value));
        }

        Err(ScriptError::Unsupported(script.to_string()))
    }
}

impl ScriptHook for ExpressionHook {
    fn invoke(&self, script: &str, inputs: &ScriptVars) -> Result<ScriptVars, ScriptError> {
        let verdict = self.evaluate(script, inputs)?;
        Ok(ScriptVars::new()
            .with(RESULT, ScriptValue::Bool(verdict))
            .with(OUTPUT, ScriptValue::Bool(verdict)))
    }
}

fn lookup(inputs: &ScriptVars, name: &str) -> Result<String, ScriptError> {
    inputs
        .get(name)
        .map(ScriptValue::as_text)
        .ok_or_else(|| ScriptError::Runtime(format!("{} is not defined", name)))
}

fn unescape_literal(literal: &str) -> String {
    String::from_utf8_lossy(&escape::decode(literal)).into_owned()
}
