// File: firewall.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::trace;

use crate::config::{FirewallRule, FirewallSource};
use crate::script::{self, run_predicate, ScriptHook, ScriptValue, ScriptVars};

use super::{ParseFailure, ParseStep, ParsedMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub source: FirewallSource,
    pub close_connection: bool,
}

/// Runs the enabled rules in order; the first one returning true blocks.
pub fn evaluate(
    rules: &[FirewallRule],
    message: &ParsedMessage,
    scripts: &dyn ScriptHook,
) -> ParseStep<Option<Verdict>> {
    for rule in rules.iter().filter(|rule| rule.enabled) {
        let inputs = inputs_for(rule.source, message);
        let hit = run_predicate(scripts, &rule.script, &inputs).map_err(|e| {
            ParseFailure::Script(format!(
                "Firewall rule on {} failed: {}",
                rule.source.as_str(),
                e
            ))
        })?;
        trace!("Firewall rule on {} returned {}", rule.source.as_str(), hit);
        if hit {
            return Ok(Some(Verdict {
                source: rule.source,
                close_connection: rule.close_connection,
            }));
        }
    }
    Ok(None)
}

/// Script inputs for a rule source. `input` always carries a text rendering
/// next to the source-specific variables.
pub fn inputs_for(source: FirewallSource, message: &ParsedMessage) -> ScriptVars {
    let text = |value: &str| ScriptValue::Text(value.to_string());
    match source {
        FirewallSource::Method => {
            ScriptVars::new().with(script::INPUT, text(&message.request_line.method))
        }
        FirewallSource::Url => {
            ScriptVars::new().with(script::INPUT, text(&message.request_line.uri))
        }
        FirewallSource::Version => {
            ScriptVars::new().with(script::INPUT, text(&message.request_line.version))
        }
        FirewallSource::Headers => {
            let block = message.header_block();
            ScriptVars::new()
                .with(
                    script::HEADER_LINES,
                    ScriptValue::Lines(message.header_lines_text()),
                )
                .with(
                    script::INPUT,
                    ScriptValue::Text(String::from_utf8_lossy(&block).into_owned()),
                )
                .with(script::HEADERS, ScriptValue::Bytes(block))
        }
        FirewallSource::Body => ScriptVars::new()
            .with(script::BODY, ScriptValue::Bytes(message.body.clone()))
            .with(
                script::INPUT,
                ScriptValue::Text(String::from_utf8_lossy(&message.body).into_owned()),
            ),
        FirewallSource::FullRequest => ScriptVars::new()
            .with(script::BUFFER, ScriptValue::Bytes(message.raw.clone()))
            .with(
                script::INPUT,
                ScriptValue::Text(String::from_utf8_lossy(&message.raw).into_owned()),
            ),
    }
}
