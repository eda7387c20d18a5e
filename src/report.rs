// File: report.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use chrono::{DateTime, Utc};
use colored::*;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::analysis::{analyze, count_by_severity, DesyncFinding, DesyncSeverity};
use crate::chain::{HopTrace, SimulationResult};
use crate::error::HopchainResult;
use crate::escape;
use crate::parser::{ParseMode, ParseOutcome, ParsedUnit};
use crate::topology::HopId;

static DIAGNOSTIC_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<parsing_error:".*?">|<incomplete_request(?:: [^>]*)?>|<WAF_RULE: [^>]*>|<CONNECTION_CLOSED_BY_WAF>"#,
    )
    .unwrap()
});

const RULE: &str =
    "===============================================================================";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// First 16 hex digits of the SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Escapes control characters and colours every diagnostic tag.
pub fn highlight_tags(raw: &[u8]) -> String {
    let text = escape::encode(raw);
    DIAGNOSTIC_TAG
        .replace_all(&text, |caps: &regex::Captures| {
            let tag = &caps[0];
            if tag.starts_with("<incomplete_request") {
                tag.yellow().bold().to_string()
            } else if tag.starts_with("<WAF_RULE") || tag.starts_with("<CONNECTION_CLOSED") {
                tag.magenta().bold().to_string()
            } else {
                tag.red().bold().to_string()
            }
        })
        .into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub kind: String,
    pub fingerprint: String,
    pub length: usize,
    pub text: String,
}

impl UnitReport {
    pub fn from_unit(unit: &ParsedUnit) -> Self {
        let bytes = unit.bytes();
        Self {
            kind: unit.kind().to_string(),
            fingerprint: fingerprint(bytes),
            length: bytes.len(),
            text: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    fn render_text(&self, out: &mut String) {
        out.push_str(&format!(
            "  [{}] {} ({} bytes)\n",
            self.kind_label(),
            self.fingerprint.dimmed(),
            self.length
        ));
        for line in highlight_tags(self.text.as_bytes()).split_inclusive("\\n") {
            out.push_str(&format!("      {}\n", line));
        }
    }

    fn kind_label(&self) -> ColoredString {
        match self.kind.as_str() {
            "message" => self.kind.green(),
            "blocked" => self.kind.magenta(),
            "incomplete" => self.kind.yellow(),
            _ => self.kind.red(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub waves: usize,
    pub units: usize,
    pub messages: usize,
    pub blocked: usize,
    pub diagnostics: usize,
    pub findings: BTreeMap<DesyncSeverity, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub generated_at: DateTime<Utc>,
    pub target: HopId,
    pub path: Vec<HopId>,
    pub input_fingerprint: String,
    pub summary: ReportSummary,
    pub waves: Vec<Vec<UnitReport>>,
    pub trace: Vec<HopTrace>,
    pub findings: Vec<DesyncFinding>,
}

impl SimulationReport {
    pub fn new(result: &SimulationResult, input: &[u8]) -> Self {
        let findings = analyze(result);
        let waves: Vec<Vec<UnitReport>> = result
            .waves
            .iter()
            .map(|wave| wave.iter().map(UnitReport::from_unit).collect())
            .collect();
        let units: Vec<&UnitReport> = waves.iter().flatten().collect();

        let summary = ReportSummary {
            waves: waves.len(),
            units: units.len(),
            messages: units.iter().filter(|u| u.kind == "message").count(),
            blocked: units.iter().filter(|u| u.kind == "blocked").count(),
            diagnostics: units
                .iter()
                .filter(|u| u.kind == "incomplete" || u.kind == "error")
                .count(),
            findings: count_by_severity(&findings),
        };

        Self {
            generated_at: Utc::now(),
            target: result.target.clone(),
            path: result.path.clone(),
            input_fingerprint: fingerprint(input),
            summary,
            waves,
            trace: result.trace.clone(),
            findings,
        }
    }

    pub fn render(&self, format: ReportFormat) -> HopchainResult<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!("  HOPCHAIN SIMULATION: {}\n", self.target.to_string().bold()));
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!(
            "Generated: {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("Input:     {}\n", self.input_fingerprint));
        let path = if self.path.is_empty() {
            "(direct)".to_string()
        } else {
            self.path
                .iter()
                .map(HopId::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        };
        out.push_str(&format!("Path:      client -> {} -> {}\n\n", path, self.target));

        if !self.trace.is_empty() {
            out.push_str("HOPS\n----\n");
            for hop in &self.trace {
                let parsed: usize = hop.buffers.iter().map(|b| b.messages).sum();
                out.push_str(&format!(
                    "  {:<16} in: {:<3} parsed: {:<3} forwarded: {:<3} off-path: {:<3} dropped: {}\n",
                    hop.hop.to_string(),
                    hop.buffers.len(),
                    parsed,
                    hop.forwarded,
                    hop.off_path,
                    hop.dropped
                ));
            }
            out.push('\n');
        }

        out.push_str(&format!(
            "TARGET {} ({} wave(s), {} unit(s))\n",
            self.target, self.summary.waves, self.summary.units
        ));
        out.push_str("------\n");
        if self.waves.is_empty() {
            out.push_str("  Nothing reached the target\n");
        }
        for (index, wave) in self.waves.iter().enumerate() {
            out.push_str(&format!("Wave {}\n", index + 1));
            for unit in wave {
                unit.render_text(&mut out);
            }
        }
        out.push('\n');

        out.push_str("FINDINGS\n--------\n");
        if self.findings.is_empty() {
            out.push_str("  No desync detected\n");
        }
        for severity in DesyncSeverity::ALL {
            let group: Vec<&DesyncFinding> = self
                .findings
                .iter()
                .filter(|f| f.severity == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "  {} ({})\n",
                severity.to_string().to_uppercase().color(severity.color()),
                group.len()
            ));
            for finding in group {
                out.push_str(&format!(
                    "    - {:?} at {}: {}\n",
                    finding.kind, finding.hop, finding.detail
                ));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseReport {
    pub generated_at: DateTime<Utc>,
    pub mode: String,
    pub input_fingerprint: String,
    pub stopped_early: bool,
    pub blocked: usize,
    pub units: Vec<UnitReport>,
}

impl ParseReport {
    pub fn new(outcome: &ParseOutcome, mode: ParseMode, input: &[u8]) -> Self {
        Self {
            generated_at: Utc::now(),
            mode: match mode {
                ParseMode::Tagged => "tagged".to_string(),
                ParseMode::ValidOnly => "valid-only".to_string(),
            },
            input_fingerprint: fingerprint(input),
            stopped_early: outcome.stopped_early,
            blocked: outcome.blocked,
            units: outcome.units.iter().map(UnitReport::from_unit).collect(),
        }
    }

    pub fn render(&self, format: ReportFormat) -> HopchainResult<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    fn render_text(&self) -> String {
        let mut out = format!(
            "Parsed {} unit(s) in {} mode (input {})\n",
            self.units.len(),
            self.mode,
            self.input_fingerprint
        );
        for unit in &self.units {
            unit.render_text(&mut out);
        }
        if self.stopped_early {
            out.push_str(&format!("{}\n", "Parsing stopped before the end of the input".yellow()));
        }
        out
    }
}

pub fn write_report(content: &str, output_path: &Path) -> HopchainResult<()> {
    let mut file = File::create(output_path)?;
    writeln!(file, "{}", content)?;
    Ok(())
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
