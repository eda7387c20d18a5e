// File: config.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HopchainError, HopchainResult};
use crate::escape;
use crate::topology::HopId;

/// Settings bundle for one hop. A parse call only ever reads it; editors
/// replace the whole value between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub header_line_endings: Vec<String>,
    pub allow_header_folding: bool,
    pub delete_header_rules: Vec<String>,
    pub add_header_rules: Vec<String>,
    pub request_line_delimiters: Vec<String>,
    pub rewrite_method: MethodRewrite,
    pub url_decode: UrlDecode,
    pub forced_http_version: ForcedHttpVersion,
    /// Kept with the profile; the parser does not read it.
    pub custom_http_version: String,
    pub body_length_rules: Vec<BodyLengthRule>,
    pub chunked_line_endings: Vec<String>,
    pub output_body_encoding: OutputBodyEncoding,
    pub firewall_rules: Vec<FirewallRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub load_balancing_rules: Vec<LoadBalancingRule>,
    pub header_lines_script: ScriptStage,
    pub request_line_script: ScriptStage,
    pub message_length_script: ScriptStage,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            header_line_endings: vec!["\\r\\n".to_string(), "\\n".to_string()],
            allow_header_folding: false,
            delete_header_rules: Vec::new(),
            add_header_rules: Vec::new(),
            request_line_delimiters: vec![" ".to_string()],
            rewrite_method: MethodRewrite::default(),
            url_decode: UrlDecode::default(),
            forced_http_version: ForcedHttpVersion::Auto,
            custom_http_version: String::new(),
            body_length_rules: vec![
                BodyLengthRule::chunked("Transfer-Encoding"),
                BodyLengthRule::fixed("Content-Length", DuplicatePolicy::First),
            ],
            chunked_line_endings: vec!["\\r\\n".to_string(), "\\n".to_string()],
            output_body_encoding: OutputBodyEncoding::DontModify,
            firewall_rules: Vec::new(),
            load_balancing_rules: Vec::new(),
            header_lines_script: ScriptStage::default(),
            request_line_script: ScriptStage::default(),
            message_length_script: ScriptStage::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodRewrite {
    pub enabled: bool,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlDecode {
    pub enabled: bool,
    pub from_hex: String,
    pub to_hex: String,
}

impl Default for UrlDecode {
    fn default() -> Self {
        Self {
            enabled: false,
            from_hex: "00".to_string(),
            to_hex: "7F".to_string(),
        }
    }
}

impl UrlDecode {
    /// Inclusive byte range to decode, `None` if either bound is not hex.
    pub fn range(&self) -> Option<(u32, u32)> {
        let from = u32::from_str_radix(self.from_hex.trim(), 16).ok()?;
        let to = u32::from_str_radix(self.to_hex.trim(), 16).ok()?;
        Some((from, to))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForcedHttpVersion {
    #[default]
    #[serde(rename = "AUTO")]
    Auto,
    #[serde(rename = "HTTP_1_0")]
    Http10,
    #[serde(rename = "HTTP_1_1")]
    Http11,
}

impl ForcedHttpVersion {
    pub fn version_token(&self) -> Option<&'static str> {
        match self {
            Self::Auto => None,
            Self::Http10 => Some("HTTP/1.0"),
            Self::Http11 => Some("HTTP/1.1"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DuplicatePolicy {
    #[default]
    First,
    Last,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyLengthRule {
    pub header_name: String,
    pub chunked: bool,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for BodyLengthRule {
    fn default() -> Self {
        Self::fixed("Content-Length", DuplicatePolicy::First)
    }
}

impl BodyLengthRule {
    pub fn fixed(header_name: &str, duplicate_policy: DuplicatePolicy) -> Self {
        Self {
            header_name: header_name.to_string(),
            chunked: false,
            duplicate_policy,
        }
    }

    pub fn chunked(header_name: &str) -> Self {
        Self {
            header_name: header_name.to_string(),
            chunked: true,
            duplicate_policy: DuplicatePolicy::First,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputBodyEncoding {
    #[default]
    DontModify,
    ForceChunked,
    #[serde(rename = "FORCE_CL_HEADER")]
    ForceClHeader,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirewallSource {
    #[default]
    Method,
    Url,
    Version,
    Headers,
    Body,
    FullRequest,
}

impl FirewallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Method => "METHOD",
            Self::Url => "URL",
            Self::Version => "VERSION",
            Self::Headers => "HEADERS",
            Self::Body => "BODY",
            Self::FullRequest => "FULL_REQUEST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallRule {
    pub source: FirewallSource,
    pub script: String,
    pub close_connection: bool,
    pub enabled: bool,
}

impl Default for FirewallRule {
    fn default() -> Self {
        Self {
            source: FirewallSource::Method,
            script: String::new(),
            close_connection: false,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    #[default]
    Url,
    Headers,
    Host,
    Cookies,
    Method,
    Body,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchMode {
    Prefix,
    Suffix,
    #[default]
    Exact,
    Contains,
}

impl MatchMode {
    pub fn matches(&self, candidate: &str, expected: &str) -> bool {
        match self {
            Self::Prefix => candidate.starts_with(expected),
            Self::Suffix => candidate.ends_with(expected),
            Self::Exact => candidate == expected,
            Self::Contains => candidate.contains(expected),
        }
    }
}

/// Routing rule of a hop. Which of `name`, `value` and `script` are read
/// depends on `rule_type`:
///
/// * `URL`, `HOST`: `value` against the request URI / Host header value.
/// * `HEADERS`: `name` and/or `value`; `match_pair` requires both on one header.
/// * `COOKIES`: cookie `name` (exact) and optional `value`.
/// * `METHOD`: `value`, exact and case-insensitive.
/// * `BODY`: `value` is a regular expression over the body.
/// * `CUSTOM`: `script` is a boolean predicate over `headers` and `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancingRule {
    pub rule_type: RuleType,
    pub match_mode: MatchMode,
    pub name: String,
    pub value: String,
    pub match_pair: bool,
    pub script: String,
    pub forward_to: HopId,
    pub enabled: bool,
}

impl Default for LoadBalancingRule {
    fn default() -> Self {
        Self {
            rule_type: RuleType::Url,
            match_mode: MatchMode::Exact,
            name: String::new(),
            value: String::new(),
            match_pair: false,
            script: String::new(),
            forward_to: HopId::default(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptStage {
    pub enabled: bool,
    pub script: String,
}

impl ScriptStage {
    pub fn active(&self) -> Option<&str> {
        if self.enabled {
            Some(self.script.as_str())
        } else {
            None
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> HopchainResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Checks the settings the parser cannot work without. The parser itself
    /// never fails on these; it reports them as diagnostics instead.
    pub fn validate(&self) -> HopchainResult<()> {
        if escape::decode_all(&self.header_line_endings).is_empty() {
            return Err(HopchainError::Configuration(
                "No header line endings configured".to_string(),
            ));
        }

        if escape::decode_all(&self.request_line_delimiters).is_empty() {
            return Err(HopchainError::Configuration(
                "No request line delimiters configured".to_string(),
            ));
        }

        if self.body_length_rules.iter().any(|rule| rule.chunked)
            && escape::decode_all(&self.chunked_line_endings).is_empty()
        {
            return Err(HopchainError::Configuration(
                "Chunked body rule configured without chunked line endings".to_string(),
            ));
        }

        if let Some(rule) = self
            .body_length_rules
            .iter()
            .find(|rule| rule.header_name.trim().is_empty())
        {
            return Err(HopchainError::Configuration(format!(
                "Body length rule without header name: {:?}",
                rule
            )));
        }

        if self.url_decode.enabled && self.url_decode.range().is_none() {
            return Err(HopchainError::Configuration(format!(
                "Invalid URL decode range {}-{}",
                self.url_decode.from_hex, self.url_decode.to_hex
            )));
        }

        for rule in &self.load_balancing_rules {
            if rule.rule_type == RuleType::Body {
                regex::Regex::new(&rule.value)?;
            }
        }

        Ok(())
    }

    /// Serializes the parsing behaviour of this hop without its forwarding
    /// rules, which only make sense inside one topology.
    pub fn export_profile(&self) -> HopchainResult<String> {
        let mut profile = self.clone();
        profile.load_balancing_rules.clear();
        Ok(serde_json::to_string_pretty(&profile)?)
    }

    /// Builds a new configuration from an exported profile, keeping the
    /// forwarding rules of `self`.
    pub fn import_profile(&self, json: &str) -> HopchainResult<Self> {
        let mut imported: ParserConfig = serde_json::from_str(json)?;
        imported.load_balancing_rules = self.load_balancing_rules.clone();
        Ok(imported)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
