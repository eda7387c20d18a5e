// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use colored::*;
use std::io::{self, Read};
use std::path::Path;

use crate::cli::{
    Commands, ExportProfileArgs, ImportProfileArgs, InputArgs, ParseArgs, PathArgs, SimulateArgs,
};
use crate::escape;
use crate::topology::{HopId, Topology};

pub mod parse;
pub mod path;
pub mod profile;
pub mod simulate;

pub fn run(command: &Commands) -> Result<()> {
    match command {
        Commands::Simulate(args) => handle_simulate_command(args),
        Commands::Parse(args) => handle_parse_command(args),
        Commands::Path(args) => handle_path_command(args),
        Commands::ExportProfile(args) => handle_export_profile_command(args),
        Commands::ImportProfile(args) => handle_import_profile_command(args),
    }
}

pub fn handle_simulate_command(args: &SimulateArgs) -> Result<()> {
    simulate::execute(args)
}

pub fn handle_parse_command(args: &ParseArgs) -> Result<()> {
    parse::execute(args)
}

pub fn handle_path_command(args: &PathArgs) -> Result<()> {
    path::execute(args)
}

pub fn handle_export_profile_command(args: &ExportProfileArgs) -> Result<()> {
    profile::export(args)
}

pub fn handle_import_profile_command(args: &ImportProfileArgs) -> Result<()> {
    profile::import(args)
}

fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

/// Request bytes from `--input` or stdin, escape-decoded with `--escaped`.
pub fn read_input(args: &InputArgs) -> Result<Vec<u8>> {
    let raw = match &args.input {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))?,
        None => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .context("Failed to read input from stdin")?;
            buffer
        }
    };

    if args.escaped {
        Ok(escape::decode(&String::from_utf8_lossy(&raw)))
    } else {
        Ok(raw)
    }
}

pub fn load_topology(path: &Path) -> Result<Topology> {
    Topology::load(path).with_context(|| format!("Failed to load scenario {}", path.display()))
}

fn require_hop(topology: &Topology, id: &str) -> Result<HopId> {
    let id = HopId::from(id);
    if topology.hop(&id).is_none() {
        anyhow::bail!("Hop {} is not part of the scenario", id);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_input_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("request.txt");
        fs::write(&path, "GET / HTTP/1.1\\r\\n\\r\\n").unwrap();

        let raw = read_input(&InputArgs {
            input: Some(path.clone()),
            escaped: false,
        })
        .unwrap();
        assert_eq!(raw, b"GET / HTTP/1.1\\r\\n\\r\\n".to_vec());

        let decoded = read_input(&InputArgs {
            input: Some(path),
            escaped: true,
        })
        .unwrap();
        assert_eq!(decoded, b"GET / HTTP/1.1\r\n\r\n".to_vec());
    }

    #[test]
    fn test_read_missing_input_file() {
        let err = read_input(&InputArgs {
            input: Some("/nonexistent/request.txt".into()),
            escaped: false,
        })
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read input file"));
    }

    #[test]
    fn test_require_hop() {
        let mut topology = Topology::new();
        topology.add_hop(crate::topology::Hop::client("client"));
        assert_eq!(require_hop(&topology, "client").unwrap(), HopId::from("client"));
        assert!(require_hop(&topology, "origin").is_err());
    }
}
