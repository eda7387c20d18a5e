// File: main.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::Parser;
use log::debug;
use simple_logger::SimpleLogger;

use hopchain::cli::Cli;
use hopchain::commands;

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = SimpleLogger::new().with_level(cli.level_filter()).init() {
        eprintln!("Failed to initialise logging: {}", e);
    }
    debug!("{} {} starting", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    if let Err(e) = commands::run(&cli.command) {
        commands::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
