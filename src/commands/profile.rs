// File: profile.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};

use super::{load_topology, print_success, require_hop};
use crate::cli::{ExportProfileArgs, ImportProfileArgs};
use crate::topology::Topology;

pub fn export(args: &ExportProfileArgs) -> Result<()> {
    let topology = load_topology(&args.scenario)?;
    let profile = export_from(&topology, &args.hop)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &profile)
                .with_context(|| format!("Failed to write profile to {}", path.display()))?;
            print_success(&format!("Profile of {} written to {}", args.hop, path.display()));
        }
        None => println!("{}", profile),
    }
    Ok(())
}

pub fn import(args: &ImportProfileArgs) -> Result<()> {
    let mut topology = load_topology(&args.scenario)?;
    let profile = std::fs::read_to_string(&args.profile)
        .with_context(|| format!("Failed to read profile {}", args.profile.display()))?;

    import_into(&mut topology, &args.hop, &profile)?;

    let destination = args.output.as_ref().unwrap_or(&args.scenario);
    topology
        .save(destination)
        .with_context(|| format!("Failed to save scenario to {}", destination.display()))?;
    print_success(&format!(
        "Imported profile into {} ({})",
        args.hop,
        destination.display()
    ));
    Ok(())
}

pub fn export_from(topology: &Topology, hop: &str) -> Result<String> {
    let id = require_hop(topology, hop)?;
    let hop = topology
        .hop(&id)
        .with_context(|| format!("Hop {} disappeared", id))?;
    Ok(hop.config.export_profile()?)
}

/// Replaces the parser settings of `hop`, keeping its routing rules. The
/// imported profile must validate before anything is changed.
pub fn import_into(topology: &mut Topology, hop: &str, profile: &str) -> Result<()> {
    let id = require_hop(topology, hop)?;
    let hop = topology
        .hop_mut(&id)
        .with_context(|| format!("Hop {} disappeared", id))?;

    let imported = hop
        .config
        .import_profile(profile)
        .context("Profile is not a valid hop configuration")?;
    imported
        .validate()
        .context("Imported profile failed validation")?;
    hop.config = imported;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadBalancingRule, OutputBodyEncoding, ParserConfig};
    use crate::topology::{Hop, HopId};
    use pretty_assertions::assert_eq;

    fn scenario() -> Topology {
        let lb = ParserConfig {
            allow_header_folding: true,
            load_balancing_rules: vec![LoadBalancingRule {
                forward_to: HopId::from("origin"),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut topology = Topology::new();
        topology
            .add_hop(Hop::client("client"))
            .add_hop(Hop::new("lb", lb))
            .add_hop(Hop::new("origin", ParserConfig::default()))
            .connect("client", "lb")
            .connect("lb", "origin");
        topology
    }

    #[test]
    fn test_export_then_import_keeps_routing() {
        let mut topology = scenario();
        let exported = export_from(&topology, "lb").unwrap();
        assert!(!exported.contains("load_balancing_rules"));

        let mut changed: ParserConfig = serde_json::from_str(&exported).unwrap();
        assert!(changed.allow_header_folding);
        changed.output_body_encoding = OutputBodyEncoding::ForceChunked;
        let profile = serde_json::to_string(&changed).unwrap();

        import_into(&mut topology, "lb", &profile).unwrap();

        let lb = topology.hop(&HopId::from("lb")).unwrap();
        assert_eq!(lb.config.output_body_encoding, OutputBodyEncoding::ForceChunked);
        assert_eq!(lb.config.load_balancing_rules.len(), 1);
    }

    #[test]
    fn test_invalid_profile_leaves_hop_untouched() {
        let mut topology = scenario();
        let before = topology.clone();

        assert!(import_into(&mut topology, "lb", "{not json").is_err());
        assert!(import_into(&mut topology, "lb", r#"{"header_line_endings": []}"#).is_err());
        assert!(import_into(&mut topology, "nowhere", "{}").is_err());
        assert_eq!(topology, before);
    }
}
