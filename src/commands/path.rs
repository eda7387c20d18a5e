// File: path.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::Result;
use colored::*;

use super::{load_topology, print_info, require_hop};
use crate::cli::PathArgs;
use crate::topology::{HopId, Topology};

pub fn execute(args: &PathArgs) -> Result<()> {
    let topology = load_topology(&args.scenario)?;
    let target = require_hop(&topology, &args.target)?;

    let Some(path) = topology.path_to_client(&target) else {
        print_info(&format!(
            "{} is the client or not reachable from it; input goes to it directly",
            target
        ));
        return Ok(());
    };

    for line in describe_path(&topology, &target, &path) {
        println!("{}", line);
    }
    Ok(())
}

/// One line per hop on the way to `target` with the hop it forwards to and
/// every candidate it could choose from.
pub fn describe_path(topology: &Topology, target: &HopId, path: &[HopId]) -> Vec<String> {
    let client = topology.client().map(|hop| hop.id.clone());
    let mut lines = Vec::with_capacity(path.len() + 1);

    for (index, hop) in path.iter().enumerate() {
        let previous = if index == 0 {
            client.as_ref()
        } else {
            path.get(index - 1)
        };
        let next = path.get(index + 1).unwrap_or(target);
        let candidates = topology
            .forward_candidates(hop, previous)
            .iter()
            .map(|c| {
                if c == next {
                    c.to_string().bold().to_string()
                } else {
                    c.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("{}. {} -> {} [{}]", index + 1, hop, next, candidates));
    }
    lines.push(format!("{}. {} (target)", path.len() + 1, target));
    lines
}
