// File: chain.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::parser::{HopParser, ParseMode, ParseOutcome, ParsedUnit};
use crate::routing::Router;
use crate::script::ScriptHook;
use crate::topology::{HopId, Topology};

/// What one hop saw in one received buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BufferTrace {
    pub bytes: usize,
    pub messages: usize,
    pub blocked: usize,
    pub stopped_early: bool,
    pub failure: Option<String>,
}

impl BufferTrace {
    fn from_outcome(bytes: usize, outcome: &ParseOutcome) -> Self {
        Self {
            bytes,
            messages: outcome.message_count(),
            blocked: outcome.blocked,
            stopped_early: outcome.stopped_early,
            failure: outcome.failure.as_ref().map(|f| f.tag()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopTrace {
    pub hop: HopId,
    pub next: HopId,
    pub candidates: Vec<HopId>,
    pub buffers: Vec<BufferTrace>,
    /// Messages sent on to `next`.
    pub forwarded: usize,
    /// Messages routed to a neighbour that is not on the simulated path.
    pub off_path: usize,
    /// Messages no rule accepted, or with nowhere to go.
    pub dropped: usize,
}

impl HopTrace {
    fn new(hop: HopId, next: HopId, candidates: Vec<HopId>) -> Self {
        Self {
            hop,
            next,
            candidates,
            buffers: Vec::new(),
            forwarded: 0,
            off_path: 0,
            dropped: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub target: HopId,
    pub path: Vec<HopId>,
    /// One entry per buffer reaching the target, parsed in tagged mode.
    pub waves: Vec<Vec<ParsedUnit>>,
    pub trace: Vec<HopTrace>,
}

impl SimulationResult {
    fn empty(target: &HopId) -> Self {
        Self {
            target: target.clone(),
            path: Vec::new(),
            waves: Vec::new(),
            trace: Vec::new(),
        }
    }

    pub fn unit_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }
}

/// Drives a client buffer through every hop between the client and a target.
pub struct ChainForwarder<'a> {
    topology: &'a Topology,
    scripts: &'a dyn ScriptHook,
}

impl<'a> ChainForwarder<'a> {
    pub fn new(topology: &'a Topology, scripts: &'a dyn ScriptHook) -> Self {
        Self { topology, scripts }
    }

    pub fn simulate(&self, target: &HopId, input: &[u8]) -> Vec<Vec<ParsedUnit>> {
        self.simulate_traced(target, input).waves
    }

    pub fn simulate_traced(&self, target: &HopId, input: &[u8]) -> SimulationResult {
        let Some(target_hop) = self.topology.hop(target) else {
            warn!("Unknown target hop {}", target);
            return SimulationResult::empty(target);
        };

        let path = self.topology.path_to_client(target).unwrap_or_default();
        let client = self.topology.client().map(|hop| hop.id.clone());
        info!(
            "Simulating {} byte buffer towards {} via {} hop(s)",
            input.len(),
            target,
            path.len()
        );

        let mut group: Vec<Vec<u8>> = vec![input.to_vec()];
        let mut trace = Vec::with_capacity(path.len());

        for (index, hop_id) in path.iter().enumerate() {
            let previous = if index == 0 {
                client.as_ref()
            } else {
                path.get(index - 1)
            };
            let next = path.get(index + 1).unwrap_or(target);
            let Some(hop) = self.topology.hop(hop_id) else {
                continue;
            };

            let candidates = self.topology.forward_candidates(hop_id, previous);
            let parser = HopParser::new(&hop.config, self.scripts);
            let router = Router::new(&hop.config, self.scripts);
            let mut hop_trace = HopTrace::new(hop_id.clone(), next.clone(), candidates.clone());
            let mut forwarded = Vec::new();

            for buffer in &group {
                let outcome = parser.parse_detailed(buffer, ParseMode::ValidOnly);
                hop_trace
                    .buffers
                    .push(BufferTrace::from_outcome(buffer.len(), &outcome));

                for unit in &outcome.units {
                    let ParsedUnit::Message(message) = unit else {
                        continue;
                    };
                    match router.route(message, &candidates) {
                        Some(destination) if &destination == next => {
                            hop_trace.forwarded += 1;
                            forwarded.push(message.raw.clone());
                        }
                        Some(destination) => {
                            trace!("{} routed a message off path to {}", hop_id, destination);
                            hop_trace.off_path += 1;
                        }
                        None => hop_trace.dropped += 1,
                    }
                }
            }

            debug!(
                "Hop {}: {} buffer(s) in, {} forwarded to {}, {} off path, {} dropped",
                hop_id,
                group.len(),
                hop_trace.forwarded,
                next,
                hop_trace.off_path,
                hop_trace.dropped
            );

            trace.push(hop_trace);
            group = forwarded;
        }

        let parser = HopParser::new(&target_hop.config, self.scripts);
        let waves: Vec<Vec<ParsedUnit>> = group
            .iter()
            .map(|buffer| parser.parse(buffer, ParseMode::Tagged))
            .collect();

        info!(
            "Target {} received {} buffer(s), {} unit(s)",
            target,
            waves.len(),
            waves.iter().map(Vec::len).sum::<usize>()
        );

        SimulationResult {
            target: target.clone(),
            path,
            waves,
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BodyLengthRule, DuplicatePolicy, FirewallRule, LoadBalancingRule, ParserConfig, RuleType,
    };
    use crate::script::{ExpressionHook, NoScripts};
    use crate::topology::Hop;
    use pretty_assertions::assert_eq;

    fn texts(waves: &[Vec<ParsedUnit>]) -> Vec<Vec<String>> {
        waves
            .iter()
            .map(|wave| {
                wave.iter()
                    .map(|u| String::from_utf8_lossy(u.bytes()).into_owned())
                    .collect()
            })
            .collect()
    }

    fn content_length_only() -> ParserConfig {
        ParserConfig {
            body_length_rules: vec![BodyLengthRule::fixed("Content-Length", DuplicatePolicy::First)],
            ..Default::default()
        }
    }

    fn front_back(front: ParserConfig, back: ParserConfig) -> Topology {
        let mut topology = Topology::new();
        topology
            .add_hop(Hop::client("client"))
            .add_hop(Hop::new("front", front))
            .add_hop(Hop::new("back", back))
            .connect("client", "front")
            .connect("front", "back");
        topology
    }

    const CL_TE: &str = "POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 28\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\nGET /admin HTTP/1.1\r\n\r\n";

    #[test]
    fn test_cl_te_discrepancy_smuggles_second_request() {
        let topology = front_back(content_length_only(), ParserConfig::default());
        let forwarder = ChainForwarder::new(&topology, &NoScripts);

        let result = forwarder.simulate_traced(&HopId::from("back"), CL_TE.as_bytes());

        assert_eq!(result.path, vec![HopId::from("front")]);
        assert_eq!(
            texts(&result.waves),
            vec![vec![
                "POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 28\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n".to_string(),
                "GET /admin HTTP/1.1\r\n\r\n".to_string(),
            ]]
        );

        let front = &result.trace[0];
        assert_eq!(front.buffers.len(), 1);
        assert_eq!(front.buffers[0].messages, 1);
        assert_eq!(front.forwarded, 1);
        assert_eq!(front.next, HopId::from("back"));
    }

    #[test]
    fn test_agreeing_hops_forward_unchanged() {
        let topology = front_back(ParserConfig::default(), ParserConfig::default());
        let waves = ChainForwarder::new(&topology, &NoScripts)
            .simulate(&HopId::from("back"), CL_TE.as_bytes());
        assert_eq!(waves.len(), 2);
        assert!(waves.iter().all(|wave| wave.len() == 1));

        let single = "GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let waves = ChainForwarder::new(&topology, &NoScripts)
            .simulate(&HopId::from("back"), single.as_bytes());
        assert_eq!(texts(&waves), vec![vec![single.to_string()]]);
    }

    #[test]
    fn test_pipelined_messages_become_separate_waves() {
        let topology = front_back(ParserConfig::default(), ParserConfig::default());
        let input = "GET /1 HTTP/1.1\r\n\r\nGET /2 HTTP/1.1\r\n\r\n";
        let waves = ChainForwarder::new(&topology, &NoScripts)
            .simulate(&HopId::from("back"), input.as_bytes());
        assert_eq!(
            texts(&waves),
            vec![
                vec!["GET /1 HTTP/1.1\r\n\r\n".to_string()],
                vec!["GET /2 HTTP/1.1\r\n\r\n".to_string()],
            ]
        );
    }

    #[test]
    fn test_method_rule_routes_post_and_drops_get() {
        let mut topology = Topology::new();
        let lb = ParserConfig {
            load_balancing_rules: vec![LoadBalancingRule {
                rule_type: RuleType::Method,
                value: "POST".to_string(),
                forward_to: HopId::from("api"),
                ..Default::default()
            }],
            ..Default::default()
        };
        topology
            .add_hop(Hop::client("client"))
            .add_hop(Hop::new("lb", lb))
            .add_hop(Hop::new("api", ParserConfig::default()))
            .add_hop(Hop::new("web", ParserConfig::default()))
            .connect("client", "lb")
            .connect("lb", "api")
            .connect("lb", "web");

        let post = "POST /p HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi";
        let input = format!("GET /g HTTP/1.1\r\n\r\n{}", post);
        let forwarder = ChainForwarder::new(&topology, &NoScripts);

        let result = forwarder.simulate_traced(&HopId::from("api"), input.as_bytes());
        assert_eq!(texts(&result.waves), vec![vec![post.to_string()]]);
        assert_eq!(result.trace[0].dropped, 1);
        assert_eq!(result.trace[0].forwarded, 1);

        let to_web = forwarder.simulate_traced(&HopId::from("web"), input.as_bytes());
        assert!(to_web.waves.is_empty());
        assert_eq!(to_web.trace[0].off_path, 1);
        assert_eq!(to_web.trace[0].dropped, 1);
    }

    #[test]
    fn test_firewall_mid_chain_drops_silently() {
        let front = ParserConfig {
            firewall_rules: vec![FirewallRule {
                script: r#"return input === "TRACE";"#.to_string(),
                close_connection: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        let topology = front_back(front, ParserConfig::default());
        let input = "TRACE / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n";

        let result = ChainForwarder::new(&topology, &ExpressionHook)
            .simulate_traced(&HopId::from("back"), input.as_bytes());

        assert!(result.waves.is_empty());
        assert_eq!(result.trace[0].buffers[0].blocked, 1);
        assert!(result.trace[0].buffers[0].stopped_early);
    }

    #[test]
    fn test_broken_mid_chain_config_yields_nothing() {
        let broken = ParserConfig {
            header_line_endings: Vec::new(),
            ..Default::default()
        };
        let topology = front_back(broken, ParserConfig::default());
        let result = ChainForwarder::new(&topology, &NoScripts)
            .simulate_traced(&HopId::from("back"), b"GET / HTTP/1.1\r\n\r\n");

        assert!(result.waves.is_empty());
        assert_eq!(
            result.trace[0].buffers[0].failure.as_deref(),
            Some("<parsing_error:\"No header line endings configured\">")
        );
    }

    #[test]
    fn test_unknown_target_is_empty() {
        let topology = front_back(ParserConfig::default(), ParserConfig::default());
        let result = ChainForwarder::new(&topology, &NoScripts)
            .simulate_traced(&HopId::from("nowhere"), b"GET / HTTP/1.1\r\n\r\n");
        assert!(result.waves.is_empty());
        assert!(result.path.is_empty());
        assert_eq!(result.unit_count(), 0);
    }

    #[test]
    fn test_unreachable_target_parses_raw_input() {
        let mut topology = front_back(ParserConfig::default(), ParserConfig::default());
        topology.add_hop(Hop::new("island", ParserConfig::default()));

        let waves = ChainForwarder::new(&topology, &NoScripts)
            .simulate(&HopId::from("island"), b"GET / HTTP/1.1\r\n\r\nGET");
        assert_eq!(
            texts(&waves),
            vec![vec![
                "GET / HTTP/1.1\r\n\r\n".to_string(),
                "<incomplete_request>GET".to_string()
            ]]
        );
    }

    #[test]
    fn test_target_next_to_client_has_empty_path() {
        let topology = front_back(ParserConfig::default(), ParserConfig::default());
        let result = ChainForwarder::new(&topology, &NoScripts)
            .simulate_traced(&HopId::from("front"), b"GET / HTTP/1.1\r\n\r\n");
        assert!(result.path.is_empty());
        assert!(result.trace.is_empty());
        assert_eq!(result.unit_count(), 1);
    }
}
