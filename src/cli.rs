// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use crate::report::ReportFormat;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long = "log-level", default_value = "warn", global = true)]
    pub log_level: String,

    #[arg(
        short = 'v',
        long = "verbose",
        help = "Enable verbose output",
        global = true
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Reduce output verbosity",
        global = true
    )]
    pub quiet: bool,

    #[arg(long = "no-color", help = "Disable colored output", global = true)]
    pub no_color: bool,
}

impl Cli {
    /// `--verbose` and `--quiet` override `--log-level`.
    pub fn level_filter(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        if self.verbose {
            return LevelFilter::Debug;
        }
        self.log_level.parse().unwrap_or(LevelFilter::Warn)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a buffer from the client through the chain to a target hop
    Simulate(SimulateArgs),
    /// Parse a buffer with a single hop configuration
    Parse(ParseArgs),
    /// Show the resolved path and forward candidates for a target hop
    Path(PathArgs),
    /// Write a hop's parser profile to a file
    ExportProfile(ExportProfileArgs),
    /// Replace a hop's parser profile, keeping its routing rules
    ImportProfile(ImportProfileArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    #[arg(short = 'i', long = "input", help = "Read the request buffer from a file (default: stdin)")]
    pub input: Option<PathBuf>,

    #[arg(
        short = 'e',
        long = "escaped",
        help = "Decode \\r \\n \\t \\\\ escapes in the input"
    )]
    pub escaped: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(short = 's', long = "scenario")]
    pub scenario: PathBuf,

    #[arg(short = 't', long = "target")]
    pub target: String,

    #[command(flatten)]
    pub input: InputArgs,

    #[arg(short = 'f', long = "format", value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    #[arg(short = 'o', long = "output", help = "Write the report to a file")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    #[arg(short = 'c', long = "config", help = "Hop parser profile (JSON)")]
    pub config: PathBuf,

    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long = "valid-only", help = "Drop diagnostics and blocked messages")]
    pub valid_only: bool,

    #[arg(short = 'f', long = "format", value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Args, Debug)]
pub struct PathArgs {
    #[arg(short = 's', long = "scenario")]
    pub scenario: PathBuf,

    #[arg(short = 't', long = "target")]
    pub target: String,
}

#[derive(Args, Debug)]
pub struct ExportProfileArgs {
    #[arg(short = 's', long = "scenario")]
    pub scenario: PathBuf,

    #[arg(long = "hop")]
    pub hop: String,

    #[arg(short = 'o', long = "output", help = "Write to a file instead of stdout")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportProfileArgs {
    #[arg(short = 's', long = "scenario")]
    pub scenario: PathBuf,

    #[arg(long = "hop")]
    pub hop: String,

    #[arg(short = 'p', long = "profile")]
    pub profile: PathBuf,

    #[arg(
        short = 'o',
        long = "output",
        help = "Write the updated scenario here instead of overwriting it"
    )]
    pub output: Option<PathBuf>,
}
