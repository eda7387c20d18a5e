// File: common/mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(dead_code)]

use hopchain::config::{
    BodyLengthRule, DuplicatePolicy, FirewallRule, FirewallSource, LoadBalancingRule, MatchMode,
    ParserConfig, RuleType,
};
use hopchain::script::{ScriptError, ScriptHook, ScriptValue, ScriptVars, RESULT};
use hopchain::topology::{Hop, HopId, Topology};
use std::path::PathBuf;
use tempfile::TempDir;

/// Front end that only honours Content-Length.
pub fn content_length_only() -> ParserConfig {
    ParserConfig {
        body_length_rules: vec![BodyLengthRule::fixed("Content-Length", DuplicatePolicy::First)],
        ..Default::default()
    }
}

/// Back end that only honours Transfer-Encoding.
pub fn chunked_only() -> ParserConfig {
    ParserConfig {
        body_length_rules: vec![BodyLengthRule::chunked("Transfer-Encoding")],
        ..Default::default()
    }
}

pub fn trace_firewall(close_connection: bool) -> FirewallRule {
    FirewallRule {
        source: FirewallSource::Method,
        script: r#"return input === "TRACE";"#.to_string(),
        close_connection,
        enabled: true,
    }
}

pub fn route_prefix(prefix: &str, forward_to: &str) -> LoadBalancingRule {
    LoadBalancingRule {
        rule_type: RuleType::Url,
        match_mode: MatchMode::Prefix,
        value: prefix.to_string(),
        forward_to: HopId::from(forward_to),
        ..Default::default()
    }
}

/// client - cdn - lb - {api, web}; the cdn honours Content-Length only and
/// the lb sends `/api` traffic to api and everything else to web.
pub fn shop_topology(cdn: ParserConfig, api: ParserConfig) -> Topology {
    let lb = ParserConfig {
        load_balancing_rules: vec![route_prefix("/api", "api"), route_prefix("/", "web")],
        ..Default::default()
    };

    let mut topology = Topology::new();
    topology
        .add_hop(Hop::client("client"))
        .add_hop(Hop::new("cdn", cdn))
        .add_hop(Hop::new("lb", lb))
        .add_hop(Hop::new("api", api))
        .add_hop(Hop::new("web", ParserConfig::default()))
        .connect("client", "cdn")
        .connect("cdn", "lb")
        .connect("lb", "api")
        .connect("lb", "web");
    topology
}

/// Answers every script call with `result` set to `verdict`.
pub struct StaticHook {
    pub verdict: bool,
}

impl ScriptHook for StaticHook {
    fn invoke(&self, _script: &str, _inputs: &ScriptVars) -> Result<ScriptVars, ScriptError> {
        Ok(ScriptVars::new().with(RESULT, ScriptValue::Bool(self.verdict)))
    }
}

pub fn write_scenario(dir: &TempDir, topology: &Topology) -> PathBuf {
    let path = dir.path().join("scenario.json");
    topology.save(&path).unwrap();
    path
}

pub fn write_input(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// CL.TE: the Content-Length covers a chunked terminator plus a second
/// request, so a chunked-first back end sees two requests.
pub const CL_TE: &str = "POST /api/cart HTTP/1.1\r\nHost: shop\r\nContent-Length: 32\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\nGET /api/admin HTTP/1.1\r\n\r\n";

/// TE.CL: the chunk carries a second request that a Content-Length back end
/// starts reading as the next message.
pub const TE_CL: &str = "POST /api/cart HTTP/1.1\r\nHost: shop\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\n\r\n1b\r\nGET /api/admin HTTP/1.1\r\n\r\n\r\n0\r\n\r\n";

pub fn texts(units: &[hopchain::ParsedUnit]) -> Vec<String> {
    units
        .iter()
        .map(|u| String::from_utf8_lossy(u.bytes()).into_owned())
        .collect()
}
