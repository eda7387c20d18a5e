// File: chain_integration_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

mod common;

use common::*;
use hopchain::analysis::{analyze, DesyncKind, DesyncSeverity};
use hopchain::cli::{ImportProfileArgs, InputArgs, SimulateArgs};
use hopchain::commands::{profile, simulate};
use hopchain::config::{LoadBalancingRule, OutputBodyEncoding, ParserConfig, RuleType};
use hopchain::report::ReportFormat;
use hopchain::{ChainForwarder, ExpressionHook, HopId, NoScripts, Topology};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_cl_te_splits_at_load_balancer() {
    let topology = shop_topology(content_length_only(), ParserConfig::default());
    let result = ChainForwarder::new(&topology, &NoScripts)
        .simulate_traced(&HopId::from("api"), CL_TE.as_bytes());

    assert_eq!(result.path, vec![HopId::from("cdn"), HopId::from("lb")]);
    assert_eq!(result.waves.len(), 2);
    assert_eq!(texts(&result.waves[1]), vec!["GET /api/admin HTTP/1.1\r\n\r\n"]);

    let lb = &result.trace[1];
    assert_eq!(lb.buffers[0].messages, 2);
    assert_eq!(lb.forwarded, 2);

    let findings = analyze(&result);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].hop, HopId::from("lb"));
    assert_eq!(findings[0].kind, DesyncKind::RequestSplit);
    assert_eq!(findings[0].severity, DesyncSeverity::High);
}

#[test]
fn test_te_cl_smuggles_into_target() {
    let topology = shop_topology(ParserConfig::default(), content_length_only());
    let result = ChainForwarder::new(&topology, &NoScripts)
        .simulate_traced(&HopId::from("api"), TE_CL.as_bytes());

    assert_eq!(result.waves.len(), 1);
    let wave = texts(&result.waves[0]);
    assert_eq!(wave.len(), 3);
    assert!(wave[0].ends_with("\r\n\r\n1b\r\n"));
    assert_eq!(wave[1], "GET /api/admin HTTP/1.1\r\n\r\n");
    assert!(wave[2].starts_with("<parsing_error:\"Request line could not split into exactly 3 parts\">"));

    let severities: Vec<DesyncSeverity> = analyze(&result).iter().map(|f| f.severity).collect();
    assert_eq!(severities, vec![DesyncSeverity::Critical, DesyncSeverity::Medium]);
}

#[test]
fn test_messages_for_other_backend_leave_the_path() {
    let topology = shop_topology(content_length_only(), ParserConfig::default());
    let result = ChainForwarder::new(&topology, &NoScripts)
        .simulate_traced(&HopId::from("web"), CL_TE.as_bytes());

    assert!(result.waves.is_empty());
    assert_eq!(result.trace[1].off_path, 2);
    assert_eq!(result.trace[1].forwarded, 0);
}

#[test]
fn test_firewall_at_cdn_protects_backends() {
    let cdn = ParserConfig {
        firewall_rules: vec![trace_firewall(true)],
        ..Default::default()
    };
    let topology = shop_topology(cdn, ParserConfig::default());
    let input = "TRACE /api HTTP/1.1\r\n\r\nGET /api/a HTTP/1.1\r\n\r\n";

    let waves = ChainForwarder::new(&topology, &ExpressionHook)
        .simulate(&HopId::from("api"), input.as_bytes());
    assert!(waves.is_empty());

    let open = ParserConfig {
        firewall_rules: vec![trace_firewall(false)],
        ..Default::default()
    };
    let topology = shop_topology(open, ParserConfig::default());
    let waves = ChainForwarder::new(&topology, &ExpressionHook)
        .simulate(&HopId::from("api"), input.as_bytes());
    assert_eq!(waves.len(), 1);
    assert_eq!(texts(&waves[0]), vec!["GET /api/a HTTP/1.1\r\n\r\n"]);
}

#[test]
fn test_rewriting_hop_normalises_the_smuggled_body() {
    let cdn = ParserConfig {
        output_body_encoding: OutputBodyEncoding::ForceClHeader,
        ..content_length_only()
    };
    let topology = shop_topology(cdn, ParserConfig::default());
    let result = ChainForwarder::new(&topology, &NoScripts)
        .simulate_traced(&HopId::from("api"), CL_TE.as_bytes());

    // Transfer-Encoding is stripped at the cdn, so the lb agrees on the length
    assert_eq!(result.waves.len(), 1);
    assert!(analyze(&result).is_empty());
}

#[test]
fn test_custom_routing_rule_consults_script_hook() {
    let mut topology = shop_topology(ParserConfig::default(), ParserConfig::default());
    let lb = topology.hop_mut(&HopId::from("lb")).unwrap();
    lb.config.load_balancing_rules.insert(
        0,
        LoadBalancingRule {
            rule_type: RuleType::Custom,
            script: "canary()".to_string(),
            forward_to: HopId::from("web"),
            ..Default::default()
        },
    );
    let input = "GET /api/a HTTP/1.1\r\n\r\n";

    let to_web = ChainForwarder::new(&topology, &StaticHook { verdict: true })
        .simulate(&HopId::from("web"), input.as_bytes());
    assert_eq!(to_web.len(), 1);

    let to_api = ChainForwarder::new(&topology, &StaticHook { verdict: false })
        .simulate(&HopId::from("api"), input.as_bytes());
    assert_eq!(to_api.len(), 1);
}

#[test]
fn test_scenario_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let topology = shop_topology(content_length_only(), ParserConfig::default());
    let path = write_scenario(&dir, &topology);

    let loaded = Topology::load(&path).unwrap();
    assert_eq!(loaded, topology);
    assert_eq!(
        loaded.path_to_client(&HopId::from("web")),
        Some(vec![HopId::from("cdn"), HopId::from("lb")])
    );
}

#[test]
fn test_simulate_command_writes_json_report() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, &shop_topology(content_length_only(), ParserConfig::default()));
    let escaped = CL_TE.replace('\r', "\\r").replace('\n', "\\n");
    let input = write_input(&dir, "request.txt", &escaped);
    let output = dir.path().join("report.json");

    simulate::execute(&SimulateArgs {
        scenario,
        target: "api".to_string(),
        input: InputArgs {
            input: Some(input),
            escaped: true,
        },
        format: ReportFormat::Json,
        output: Some(output.clone()),
    })
    .unwrap();

    let report: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["target"], "api");
    assert_eq!(report["summary"]["waves"], 2);
    assert_eq!(report["findings"][0]["kind"], "RequestSplit");
    assert_eq!(report["findings"][0]["hop"], "lb");
}

#[test]
fn test_simulate_command_rejects_unknown_target() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, &shop_topology(content_length_only(), ParserConfig::default()));
    let input = write_input(&dir, "request.txt", "GET / HTTP/1.1\r\n\r\n");

    let err = simulate::execute(&SimulateArgs {
        scenario,
        target: "mainframe".to_string(),
        input: InputArgs {
            input: Some(input),
            escaped: false,
        },
        format: ReportFormat::Text,
        output: None,
    })
    .unwrap_err();
    assert!(err.to_string().contains("mainframe"));
}

#[test]
fn test_import_profile_command_updates_scenario() {
    let dir = TempDir::new().unwrap();
    let scenario = write_scenario(&dir, &shop_topology(content_length_only(), ParserConfig::default()));
    let profile_path = write_input(
        &dir,
        "lb.json",
        r#"{"output_body_encoding": "FORCE_CHUNKED", "allow_header_folding": true}"#,
    );
    let updated = dir.path().join("updated.json");

    profile::import(&ImportProfileArgs {
        scenario: scenario.clone(),
        hop: "lb".to_string(),
        profile: profile_path,
        output: Some(updated.clone()),
    })
    .unwrap();

    let topology = Topology::load(&updated).unwrap();
    let lb = topology.hop(&HopId::from("lb")).unwrap();
    assert_eq!(lb.config.output_body_encoding, OutputBodyEncoding::ForceChunked);
    assert!(lb.config.allow_header_folding);
    assert_eq!(lb.config.load_balancing_rules.len(), 2);

    let original = Topology::load(&scenario).unwrap();
    assert!(!original.hop(&HopId::from("lb")).unwrap().config.allow_header_folding);
}
