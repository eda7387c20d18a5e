// File: simulate.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use log::info;

use super::{load_topology, print_info, print_success, read_input, require_hop};
use crate::chain::ChainForwarder;
use crate::cli::SimulateArgs;
use crate::report::{write_report, SimulationReport};
use crate::script::ExpressionHook;

pub fn execute(args: &SimulateArgs) -> Result<()> {
    let topology = load_topology(&args.scenario)?;
    let target = require_hop(&topology, &args.target)?;
    let input = read_input(&args.input)?;

    info!(
        "Simulating {} bytes from the client to {}",
        input.len(),
        target
    );
    let scripts = ExpressionHook::new();
    let result = ChainForwarder::new(&topology, &scripts).simulate_traced(&target, &input);
    let report = SimulationReport::new(&result, &input);
    let rendered = report
        .render(args.format)
        .context("Failed to render simulation report")?;

    match &args.output {
        Some(path) => {
            write_report(&rendered, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            print_success(&format!("Report written to {}", path.display()));
        }
        None => println!("{}", rendered),
    }

    if !report.findings.is_empty() {
        print_info(&format!(
            "{} finding(s) for target {}",
            report.findings.len(),
            target
        ));
    }
    Ok(())
}
