// File: error.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::fmt;

#[derive(Debug)]
pub enum HopchainError {
    Configuration(String),
    Topology(String),
    UnknownHop(String),
    Serialization(serde_json::Error),
    Pattern(regex::Error),
    Io(std::io::Error),
}

impl fmt::Display for HopchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            Self::Topology(msg) => write!(f, "Topology error: {}", msg),
            Self::UnknownHop(id) => write!(f, "Unknown hop: {}", id),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::Pattern(e) => write!(f, "Invalid pattern: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for HopchainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(_) => None,
            Self::Topology(_) => None,
            Self::UnknownHop(_) => None,
            Self::Serialization(e) => Some(e),
            Self::Pattern(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for HopchainError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error)
    }
}

impl From<regex::Error> for HopchainError {
    fn from(error: regex::Error) -> Self {
        Self::Pattern(error)
    }
}

impl From<std::io::Error> for HopchainError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

pub type HopchainResult<T> = Result<T, HopchainError>;
