// File: parser_integration_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

mod common;

use common::*;
use hopchain::config::{BodyLengthRule, DuplicatePolicy, ParserConfig};
use hopchain::{parse, ExpressionHook, HopParser, NoScripts, ParseMode, ParsedUnit};
use pretty_assertions::assert_eq;
use rstest::*;

#[test]
fn test_front_and_back_disagree_on_cl_te() {
    let front = parse(&content_length_only(), CL_TE.as_bytes(), ParseMode::Tagged, &NoScripts);
    assert_eq!(front.len(), 1);

    let back = parse(&chunked_only(), CL_TE.as_bytes(), ParseMode::Tagged, &NoScripts);
    assert_eq!(back.len(), 2);
    assert_eq!(texts(&back)[1], "GET /api/admin HTTP/1.1\r\n\r\n");
}

#[test]
fn test_te_cl_leftover_is_reported() {
    let units = parse(&content_length_only(), TE_CL.as_bytes(), ParseMode::Tagged, &NoScripts);
    let kinds: Vec<&str> = units.iter().map(ParsedUnit::kind).collect();
    assert_eq!(kinds, vec!["message", "message", "error"]);

    let valid = parse(&content_length_only(), TE_CL.as_bytes(), ParseMode::ValidOnly, &NoScripts);
    assert_eq!(valid.len(), 2);
}

#[rstest]
#[case(DuplicatePolicy::First, "a")]
#[case(DuplicatePolicy::Last, "abcdef")]
fn test_duplicate_content_length(#[case] policy: DuplicatePolicy, #[case] body: &str) {
    let config = ParserConfig {
        body_length_rules: vec![BodyLengthRule::fixed("Content-Length", policy)],
        ..Default::default()
    };
    let input = "POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 6\r\n\r\nabcdef";
    let units = parse(&config, input.as_bytes(), ParseMode::ValidOnly, &NoScripts);
    assert_eq!(units[0].message().unwrap().body, body.as_bytes().to_vec());
}

#[test]
fn test_obfuscated_transfer_encoding_value_still_chunked() {
    let input = "POST / HTTP/1.1\r\nTransfer-Encoding: xchunked\r\nContent-Length: 3\r\n\r\n0\r\n\r\n";
    let units = parse(&ParserConfig::default(), input.as_bytes(), ParseMode::Tagged, &NoScripts);
    assert_eq!(units.len(), 1);
    assert!(units[0].message().unwrap().body.is_empty());
}

#[test]
fn test_waf_close_stops_pipeline() {
    let config = ParserConfig {
        firewall_rules: vec![trace_firewall(true)],
        ..Default::default()
    };
    let input = "TRACE / HTTP/1.1\r\nHost: x\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n";
    let outcome = HopParser::new(&config, &ExpressionHook).parse_detailed(input.as_bytes(), ParseMode::Tagged);

    assert_eq!(outcome.units.len(), 1);
    assert_eq!(outcome.blocked, 1);
    assert!(texts(&outcome.units)[0].ends_with(
        "<WAF_RULE: the request was not forwarded as it hit a rule for \"METHOD\"><CONNECTION_CLOSED_BY_WAF>"
    ));
}

#[test]
fn test_many_pipelined_requests() {
    let one = "GET /ping HTTP/1.1\r\nHost: x\r\n\r\n";
    let input = one.repeat(50);
    let units = parse(&ParserConfig::default(), input.as_bytes(), ParseMode::Tagged, &NoScripts);
    assert_eq!(units.len(), 50);
    assert!(texts(&units).iter().all(|u| u == one));
}
