// File: routing.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, trace, warn};
use regex::bytes::Regex;

use crate::config::{LoadBalancingRule, ParserConfig, RuleType};
use crate::parser::headers::HeaderMap;
use crate::parser::ParsedMessage;
use crate::script::{self, run_predicate, ScriptHook, ScriptValue, ScriptVars};
use crate::topology::HopId;

/// Routing rules of one hop, with BODY patterns compiled once.
pub struct Router<'a> {
    rules: Vec<CompiledRule<'a>>,
    scripts: &'a dyn ScriptHook,
}

struct CompiledRule<'a> {
    rule: &'a LoadBalancingRule,
    body: Option<Regex>,
}

impl<'a> Router<'a> {
    pub fn new(config: &'a ParserConfig, scripts: &'a dyn ScriptHook) -> Self {
        let rules = config
            .load_balancing_rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| CompiledRule {
                rule,
                body: compile_body_pattern(rule),
            })
            .collect();
        Self { rules, scripts }
    }

    /// Picks the neighbour a message leaves the hop through.
    ///
    /// With a single candidate and no enabled rules everything goes to that
    /// candidate. Otherwise the first enabled rule that targets a candidate
    /// and accepts the message decides; no match means the message is dropped.
    pub fn route(&self, message: &ParsedMessage, candidates: &[HopId]) -> Option<HopId> {
        if candidates.is_empty() {
            trace!("No forward candidates, dropping message");
            return None;
        }

        if candidates.len() == 1 && self.rules.is_empty() {
            return Some(candidates[0].clone());
        }

        let headers = message.headers();
        let destination = self
            .rules
            .iter()
            .filter(|compiled| candidates.contains(&compiled.rule.forward_to))
            .find(|compiled| {
                matches_rule(
                    compiled.rule,
                    compiled.body.as_ref(),
                    message,
                    &headers,
                    self.scripts,
                )
            })
            .map(|compiled| compiled.rule.forward_to.clone());

        match &destination {
            Some(hop) => debug!(
                "Routed {} {} to {}",
                message.request_line.method, message.request_line.uri, hop
            ),
            None => debug!(
                "No routing rule matched {} {}, dropping",
                message.request_line.method, message.request_line.uri
            ),
        }
        destination
    }
}

/// One-off routing decision; see [`Router::route`].
pub fn route(
    config: &ParserConfig,
    message: &ParsedMessage,
    candidates: &[HopId],
    scripts: &dyn ScriptHook,
) -> Option<HopId> {
    Router::new(config, scripts).route(message, candidates)
}

pub fn rule_matches(
    rule: &LoadBalancingRule,
    message: &ParsedMessage,
    headers: &HeaderMap,
    scripts: &dyn ScriptHook,
) -> bool {
    let body = compile_body_pattern(rule);
    matches_rule(rule, body.as_ref(), message, headers, scripts)
}

fn compile_body_pattern(rule: &LoadBalancingRule) -> Option<Regex> {
    if rule.rule_type != RuleType::Body {
        return None;
    }
    match Regex::new(&rule.value) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!("Invalid body pattern {:?}: {}", rule.value, e);
            None
        }
    }
}

fn matches_rule(
    rule: &LoadBalancingRule,
    body: Option<&Regex>,
    message: &ParsedMessage,
    headers: &HeaderMap,
    scripts: &dyn ScriptHook,
) -> bool {
    let mode = rule.match_mode;
    match rule.rule_type {
        RuleType::Url => mode.matches(&message.request_line.uri, &rule.value),
        RuleType::Method => message
            .request_line
            .method
            .eq_ignore_ascii_case(rule.value.trim()),
        RuleType::Host => headers
            .first("host")
            .map(|host| mode.matches(host, &rule.value))
            .unwrap_or(false),
        RuleType::Headers => header_rule_matches(rule, headers),
        RuleType::Cookies => cookies(headers)
            .iter()
            .any(|(name, value)| {
                *name == rule.name && (rule.value.is_empty() || mode.matches(value, &rule.value))
            }),
        // invalid patterns never match
        RuleType::Body => body.is_some_and(|pattern| pattern.is_match(&message.body)),
        RuleType::Custom => {
            let inputs = ScriptVars::new()
                .with(
                    script::HEADER_LINES,
                    ScriptValue::Lines(message.header_lines_text()),
                )
                .with(script::HEADERS, ScriptValue::Bytes(message.header_block()))
                .with(script::BODY, ScriptValue::Bytes(message.body.clone()));
            match run_predicate(scripts, &rule.script, &inputs) {
                Ok(hit) => hit,
                Err(e) => {
                    warn!("Routing script for {} failed: {}", rule.forward_to, e);
                    false
                }
            }
        }
    }
}

// Names compare case-insensitively, values as written. Without `match_pair`
// a set name and a set value may be satisfied by different headers.
fn header_rule_matches(rule: &LoadBalancingRule, headers: &HeaderMap) -> bool {
    let mode = rule.match_mode;
    let wanted_name = rule.name.trim().to_lowercase();
    let name_ok = |name: &str| wanted_name.is_empty() || mode.matches(name, &wanted_name);
    let value_ok = |value: &str| rule.value.is_empty() || mode.matches(value, &rule.value);

    if wanted_name.is_empty() && rule.value.is_empty() {
        return false;
    }

    if rule.match_pair {
        headers.iter().any(|(name, value)| name_ok(name) && value_ok(value))
    } else {
        headers.iter().any(|(name, _)| name_ok(name))
            && headers.iter().any(|(_, value)| value_ok(value))
    }
}

/// `name=value` pairs of every Cookie header, in order.
pub fn cookies(headers: &HeaderMap) -> Vec<(&str, &str)> {
    headers
        .get_all("cookie")
        .into_iter()
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            match pair.split_once('=') {
                Some((name, value)) => Some((name.trim(), value.trim())),
                None => Some((pair, "")),
            }
        })
        .collect()
}
