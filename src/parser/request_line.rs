// File: request_line.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::config::ParserConfig;
use crate::script::{self, ScriptHook, ScriptValue, ScriptVars};

use super::headers::split_ending;
use super::{trim_bytes, HopRules, ParseFailure, ParseStep, RequestLine};

/// Parses the first head line into method, URI and version, applies the
/// configured rewrites and returns the line as this hop would emit it.
pub(crate) fn rebuild(
    line: &[u8],
    rules: &HopRules,
    config: &ParserConfig,
    scripts: &dyn ScriptHook,
) -> ParseStep<(RequestLine, Vec<u8>)> {
    let (content, ending) = split_ending(line, &rules.header_endings);
    let mut content = trim_bytes(content).to_vec();

    if let Some(script) = config.request_line_script.active() {
        let inputs = ScriptVars::new().with(
            script::INPUT,
            ScriptValue::Text(String::from_utf8_lossy(&content).into_owned()),
        );
        let outputs = scripts
            .invoke(script, &inputs)
            .map_err(|e| ParseFailure::Script(format!("Request line script failed: {}", e)))?;
        if let Some(output) = outputs.get(script::OUTPUT) {
            content = output.as_bytes();
        }
    }

    let mut matches = rules.request_delimiter.find_iter(&content);
    let (first, second) = match (matches.next(), matches.next()) {
        (Some(first), Some(second)) => (first, second),
        _ => {
            return Err(ParseFailure::Malformed(
                "Request line could not split into exactly 3 parts".to_string(),
            ))
        }
    };

    let mut method = content[..first.start()].to_vec();
    let mut uri = content[first.end()..second.start()].to_vec();
    let mut version = content[second.end()..].to_vec();

    let rewrite = &config.rewrite_method;
    if rewrite.enabled && method.eq_ignore_ascii_case(rewrite.from.as_bytes()) {
        method = rewrite.to.as_bytes().to_vec();
    }

    if let Some((from, to)) = rules.url_range {
        uri = percent_decode_range(&uri, from, to);
    }

    if let Some(token) = config.forced_http_version.version_token() {
        version = token.as_bytes().to_vec();
    }

    let mut rebuilt = Vec::with_capacity(line.len());
    rebuilt.extend_from_slice(&method);
    rebuilt.extend_from_slice(first.as_bytes());
    rebuilt.extend_from_slice(&uri);
    rebuilt.extend_from_slice(second.as_bytes());
    rebuilt.extend_from_slice(&version);
    rebuilt.extend_from_slice(ending);

    let request_line = RequestLine {
        method: String::from_utf8_lossy(&method).into_owned(),
        uri: String::from_utf8_lossy(&uri).into_owned(),
        version: String::from_utf8_lossy(&version).into_owned(),
    };

    Ok((request_line, rebuilt))
}

/// Decodes `%xx` escapes whose value lies in `from..=to`. Escapes outside
/// the range and malformed escapes are kept verbatim.
pub fn percent_decode_range(uri: &[u8], from: u32, to: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(uri.len());
    let mut i = 0;
    while i < uri.len() {
        if uri[i] == b'%' && i + 2 < uri.len() {
            let hex = std::str::from_utf8(&uri[i + 1..i + 3]).ok();
            let value = hex
                .filter(|h| h.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|h| u32::from_str_radix(h, 16).ok());
            if let Some(value) = value {
                if (from..=to).contains(&value) {
                    out.push(value as u8);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(uri[i]);
        i += 1;
    }
    out
}
