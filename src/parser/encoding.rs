// File: encoding.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::config::OutputBodyEncoding;

use super::body::{Framing, ResolvedBody};
use super::headers::{self, split_ending};
use super::HopRules;

const CONTENT_LENGTH: &str = "Content-Length";
const TRANSFER_ENCODING: &str = "Transfer-Encoding";

/// Rewrites the head for the configured output framing and returns the body
/// bytes to emit after it.
pub(crate) fn apply(
    encoding: OutputBodyEncoding,
    lines: &mut Vec<Vec<u8>>,
    resolved: &ResolvedBody,
    rules: &HopRules,
) -> Vec<u8> {
    let endings = &rules.header_endings;
    match encoding {
        OutputBodyEncoding::DontModify => match &resolved.framing {
            Framing::Chunked { wire } => wire.clone(),
            Framing::ChunkedModified => {
                encode_single_chunk(&resolved.body, &rules.best_chunked_ending)
            }
            Framing::None | Framing::Fixed => resolved.body.clone(),
        },
        OutputBodyEncoding::ForceChunked => {
            headers::remove_named(lines, CONTENT_LENGTH, endings);
            headers::remove_named(lines, TRANSFER_ENCODING, endings);
            let line = format!("{}: chunked", TRANSFER_ENCODING);
            headers::insert_lines(lines, &[line], &rules.best_ending, endings);
            encode_single_chunk(&resolved.body, &rules.best_chunked_ending)
        }
        OutputBodyEncoding::ForceClHeader => {
            headers::remove_named(lines, TRANSFER_ENCODING, endings);
            set_content_length(lines, resolved.body.len(), rules);
            resolved.body.clone()
        }
    }
}

/// Replaces the first Content-Length line in place, drops any others, or
/// inserts one before the blank lines ending the head.
fn set_content_length(lines: &mut Vec<Vec<u8>>, length: usize, rules: &HopRules) {
    let endings = &rules.header_endings;
    let value = format!("{}: {}", CONTENT_LENGTH, length);

    let existing_ending = lines
        .iter()
        .skip(1)
        .find(|line| {
            headers::header_name(line, endings)
                .map(|n| n.eq_ignore_ascii_case(CONTENT_LENGTH.as_bytes()))
                .unwrap_or(false)
        })
        .map(|line| split_ending(line, endings).1.to_vec());

    match headers::remove_named(lines, CONTENT_LENGTH, endings) {
        Some(index) => {
            let mut line = value.into_bytes();
            line.extend_from_slice(&existing_ending.unwrap_or_else(|| rules.best_ending.clone()));
            lines.insert(index, line);
        }
        None => headers::insert_lines(lines, &[value], &rules.best_ending, endings),
    }
}

/// The whole body as one chunk followed by the terminating zero chunk.
pub fn encode_single_chunk(body: &[u8], ending: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 16);
    if !body.is_empty() {
        out.extend_from_slice(format!("{:x}", body.len()).as_bytes());
        out.extend_from_slice(ending);
        out.extend_from_slice(body);
        out.extend_from_slice(ending);
    }
    out.push(b'0');
    out.extend_from_slice(ending);
    out.extend_from_slice(ending);
    out
}
