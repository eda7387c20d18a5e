// File: escape.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Backslash escapes used by every configured delimiter and line ending.

/// Decodes `\r`, `\n`, `\t` and `\\` into raw bytes. Any other escaped
/// character is passed through without the backslash.
pub fn decode(escaped: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('r') => out.push(b'\r'),
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('\\') => out.push(b'\\'),
            Some(other) => out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes()),
            None => out.push(b'\\'),
        }
    }

    out
}

/// Decodes a list of escaped sequences, dropping entries that decode to nothing.
pub fn decode_all(escaped: &[String]) -> Vec<Vec<u8>> {
    escaped
        .iter()
        .map(|s| decode(s))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Renders raw bytes with control characters escaped, for logs and reports.
pub fn encode(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in String::from_utf8_lossy(raw).chars() {
        match c {
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}
