// File: parse.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};

use super::read_input;
use crate::cli::ParseArgs;
use crate::config::ParserConfig;
use crate::parser::{HopParser, ParseMode};
use crate::report::ParseReport;
use crate::script::ExpressionHook;

pub fn execute(args: &ParseArgs) -> Result<()> {
    let config = ParserConfig::load(&args.config)
        .with_context(|| format!("Failed to load hop profile {}", args.config.display()))?;
    let input = read_input(&args.input)?;

    let mode = if args.valid_only {
        ParseMode::ValidOnly
    } else {
        ParseMode::Tagged
    };

    let scripts = ExpressionHook::new();
    let outcome = HopParser::new(&config, &scripts).parse_detailed(&input, mode);
    let report = ParseReport::new(&outcome, mode, &input);
    println!("{}", report.render(args.format)?);
    Ok(())
}
