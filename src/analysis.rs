// File: analysis.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::chain::SimulationResult;
use crate::parser::ParsedUnit;
use crate::topology::HopId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DesyncSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl DesyncSeverity {
    pub const ALL: [DesyncSeverity; 5] = [
        DesyncSeverity::Critical,
        DesyncSeverity::High,
        DesyncSeverity::Medium,
        DesyncSeverity::Low,
        DesyncSeverity::Info,
    ];

    pub fn color(&self) -> &'static str {
        match self {
            DesyncSeverity::Critical => "bright_red",
            DesyncSeverity::High => "red",
            DesyncSeverity::Medium => "yellow",
            DesyncSeverity::Low => "blue",
            DesyncSeverity::Info => "cyan",
        }
    }
}

impl fmt::Display for DesyncSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DesyncKind {
    /// A hop saw several messages in what its upstream sent as one.
    RequestSplit,
    /// The target left part of a forwarded buffer unparsed.
    UnparsedRemainder,
    /// A hop failed on bytes its upstream accepted.
    Rejected,
    FirewallBlock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DesyncFinding {
    pub hop: HopId,
    pub kind: DesyncKind,
    pub severity: DesyncSeverity,
    pub detail: String,
}

/// Findings of one simulation, most severe first.
///
/// Only buffers that crossed at least one hop are judged: the first hop on
/// the path (or a target next to the client) sees raw client input, where
/// pipelining and truncation are not a discrepancy between hops.
pub fn analyze(result: &SimulationResult) -> Vec<DesyncFinding> {
    let mut findings = Vec::new();

    for (index, hop) in result.trace.iter().enumerate() {
        let forwarded_input = index > 0;
        for (buffer_index, buffer) in hop.buffers.iter().enumerate() {
            if forwarded_input && buffer.messages > 1 {
                findings.push(DesyncFinding {
                    hop: hop.hop.clone(),
                    kind: DesyncKind::RequestSplit,
                    severity: DesyncSeverity::High,
                    detail: format!(
                        "buffer {} ({} bytes) from {} parsed as {} messages",
                        buffer_index + 1,
                        buffer.bytes,
                        result.trace[index - 1].hop,
                        buffer.messages
                    ),
                });
            }
            if let (true, Some(failure)) = (forwarded_input, &buffer.failure) {
                findings.push(DesyncFinding {
                    hop: hop.hop.clone(),
                    kind: DesyncKind::Rejected,
                    severity: DesyncSeverity::Low,
                    detail: format!(
                        "buffer {} accepted by {} failed here: {}",
                        buffer_index + 1,
                        result.trace[index - 1].hop,
                        failure
                    ),
                });
            }
            if buffer.blocked > 0 {
                findings.push(firewall_finding(&hop.hop, buffer_index, buffer.blocked));
            }
        }
    }

    let forwarded_to_target = !result.path.is_empty();
    for (wave_index, wave) in result.waves.iter().enumerate() {
        let messages = wave.iter().filter(|u| u.message().is_some()).count();
        let blocked = wave
            .iter()
            .filter(|u| matches!(u, ParsedUnit::Blocked { .. }))
            .count();
        let failure = wave.iter().find_map(|u| match u {
            ParsedUnit::Diagnostic { failure, .. } => Some(failure),
            _ => None,
        });

        if forwarded_to_target && messages > 1 {
            findings.push(DesyncFinding {
                hop: result.target.clone(),
                kind: DesyncKind::RequestSplit,
                severity: DesyncSeverity::Critical,
                detail: format!(
                    "wave {} forwarded as one message was parsed as {} messages",
                    wave_index + 1,
                    messages
                ),
            });
        }
        if let (true, Some(failure)) = (forwarded_to_target, failure) {
            findings.push(DesyncFinding {
                hop: result.target.clone(),
                kind: DesyncKind::UnparsedRemainder,
                severity: DesyncSeverity::Medium,
                detail: format!("wave {} ends in {}", wave_index + 1, failure.tag()),
            });
        }
        if blocked > 0 {
            findings.push(firewall_finding(&result.target, wave_index, blocked));
        }
    }

    findings.sort_by_key(|finding| finding.severity);
    findings
}

fn firewall_finding(hop: &HopId, index: usize, blocked: usize) -> DesyncFinding {
    DesyncFinding {
        hop: hop.clone(),
        kind: DesyncKind::FirewallBlock,
        severity: DesyncSeverity::Info,
        detail: format!("{} message(s) blocked in buffer {}", blocked, index + 1),
    }
}

pub fn count_by_severity(findings: &[DesyncFinding]) -> BTreeMap<DesyncSeverity, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.severity).or_insert(0) += 1;
    }
    counts
}
