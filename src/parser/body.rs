// File: body.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::trace;

use crate::config::{BodyLengthRule, DuplicatePolicy};

use super::headers::HeaderMap;
use super::{find_earliest, Incomplete, ParseFailure, ParseStep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// No body-length rule applied.
    None,
    Fixed,
    /// Chunked on the wire; `wire` holds the original chunk stream.
    Chunked { wire: Vec<u8> },
    /// Chunked on the wire but the body was rewritten afterwards.
    ChunkedModified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBody {
    pub body: Vec<u8>,
    pub framing: Framing,
    /// Bytes of the input taken by the body, framing included.
    pub consumed: usize,
}

/// Applies the first body-length rule whose header is present. Without a
/// matching rule the body is empty and everything after the head belongs
/// to the next message.
pub fn resolve(
    headers: &HeaderMap,
    data: &[u8],
    rules: &[BodyLengthRule],
    chunked_endings: &[Vec<u8>],
) -> ParseStep<ResolvedBody> {
    for rule in rules {
        let values = headers.get_all(&rule.header_name);
        if values.is_empty() {
            continue;
        }

        if rule.duplicate_policy == DuplicatePolicy::Error && values.len() > 1 {
            return Err(ParseFailure::Malformed(format!(
                "Duplicate header: {}",
                rule.header_name.trim()
            )));
        }

        if rule.chunked {
            trace!("Body framed by chunked rule on {}", rule.header_name);
            let (body, consumed) = decode_chunked(data, chunked_endings)?;
            return Ok(ResolvedBody {
                body,
                framing: Framing::Chunked {
                    wire: data[..consumed].to_vec(),
                },
                consumed,
            });
        }

        let value = match rule.duplicate_policy {
            DuplicatePolicy::Last => values[values.len() - 1],
            DuplicatePolicy::First | DuplicatePolicy::Error => values[0],
        };
        let length = parse_length(&rule.header_name, value)?;
        trace!("Body framed by {}: {} bytes", rule.header_name, length);

        if data.len() < length {
            return Err(ParseFailure::Incomplete(Incomplete::Body {
                missing: length - data.len(),
            }));
        }

        return Ok(ResolvedBody {
            body: data[..length].to_vec(),
            framing: Framing::Fixed,
            consumed: length,
        });
    }

    Ok(ResolvedBody {
        body: Vec::new(),
        framing: Framing::None,
        consumed: 0,
    })
}

fn parse_length(header_name: &str, value: &str) -> ParseStep<usize> {
    let parsed: i64 = value.trim().parse().map_err(|_| {
        ParseFailure::Malformed(format!(
            "Invalid {} value: \"{}\"",
            header_name.trim(),
            value
        ))
    })?;
    if parsed < 0 {
        return Err(ParseFailure::Malformed(format!(
            "Negative {} value: {}",
            header_name.trim(),
            parsed
        )));
    }
    usize::try_from(parsed).map_err(|_| {
        ParseFailure::Malformed(format!("{} value too large: {}", header_name.trim(), parsed))
    })
}

/// Decodes a chunk stream, returning the payload and the number of input
/// bytes it spans (through the blank line after the last chunk).
pub fn decode_chunked(data: &[u8], endings: &[Vec<u8>]) -> ParseStep<(Vec<u8>, usize)> {
    if endings.is_empty() {
        return Err(ParseFailure::Malformed(
            "No chunked line endings configured".to_string(),
        ));
    }

    let incomplete = || ParseFailure::Incomplete(Incomplete::Chunks);
    let mut decoded = Vec::new();
    let mut pos = 0;

    loop {
        let (line_len, ending_len) = find_earliest(&data[pos..], endings).ok_or_else(incomplete)?;
        let size_line = String::from_utf8_lossy(&data[pos..pos + line_len]).into_owned();
        let size_text = size_line.split(';').next().unwrap_or("").trim();
        let invalid_size =
            || ParseFailure::Malformed(format!("Invalid chunk size: \"{}\"", size_text));
        if !size_text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid_size());
        }
        let size = usize::from_str_radix(size_text, 16).map_err(|_| invalid_size())?;
        pos += line_len + ending_len;

        if size == 0 {
            // trailer fields until the first empty line
            loop {
                let (line_len, ending_len) =
                    find_earliest(&data[pos..], endings).ok_or_else(incomplete)?;
                pos += line_len + ending_len;
                if line_len == 0 {
                    return Ok((decoded, pos));
                }
            }
        }

        let end = match pos.checked_add(size) {
            Some(end) if end <= data.len() => end,
            _ => return Err(incomplete()),
        };
        decoded.extend_from_slice(&data[pos..end]);
        pos = end;

        let rest = &data[pos..];
        let terminator = endings
            .iter()
            .filter(|e| rest.starts_with(e))
            .map(|e| e.len())
            .max();
        match terminator {
            Some(len) => pos += len,
            None if endings.iter().any(|e| e.starts_with(rest)) => return Err(incomplete()),
            None => {
                return Err(ParseFailure::Malformed(
                    "Missing line ending after chunk data".to_string(),
                ))
            }
        }
    }
}
