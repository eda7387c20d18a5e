// File: lib.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_inception)]
#![allow(clippy::new_without_default)]
#![allow(clippy::useless_vec)]

pub mod analysis;
pub mod chain;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod escape;
pub mod parser;
pub mod report;
pub mod routing;
pub mod script;
pub mod topology;

pub use chain::{ChainForwarder, SimulationResult};
pub use config::ParserConfig;
pub use error::{HopchainError, HopchainResult};
pub use parser::{parse, HopParser, ParseMode, ParsedUnit};
pub use script::{ExpressionHook, NoScripts, ScriptHook};
pub use topology::{Hop, HopId, Topology};
