// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Single-hop message parser. One call splits a byte buffer into the HTTP
//! messages a hop configured by [`ParserConfig`] would see and forward.

pub mod body;
pub mod encoding;
pub mod firewall;
pub mod headers;
pub mod request_line;

use log::{debug, trace, warn};
use regex::bytes::Regex;
use std::fmt;

use crate::config::{FirewallSource, ParserConfig};
use crate::escape;
use crate::script::{self, ScriptHook, ScriptValue, ScriptVars};

use body::{Framing, ResolvedBody};
use headers::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Emit diagnostics for every failure; used for the hop being inspected.
    Tagged,
    /// Stop silently on the first failure; used mid-chain.
    ValidOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incomplete {
    Headers,
    Body { missing: usize },
    Chunks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    Incomplete(Incomplete),
    Malformed(String),
    Script(String),
}

impl ParseFailure {
    pub fn tag(&self) -> String {
        match self {
            Self::Incomplete(Incomplete::Headers) => "<incomplete_request>".to_string(),
            Self::Incomplete(Incomplete::Body { missing }) => {
                format!("<incomplete_request: {} body bytes missing>", missing)
            }
            Self::Incomplete(Incomplete::Chunks) => {
                "<incomplete_request: chunks incomplete>".to_string()
            }
            Self::Malformed(msg) | Self::Script(msg) => format!("<parsing_error:\"{}\">", msg),
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete(_))
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

pub type ParseStep<T> = Result<T, ParseFailure>;

pub fn waf_tag(source: FirewallSource) -> String {
    format!(
        "<WAF_RULE: the request was not forwarded as it hit a rule for \"{}\">",
        source.as_str()
    )
}

pub const CONNECTION_CLOSED_TAG: &str = "<CONNECTION_CLOSED_BY_WAF>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub uri: String,
    pub version: String,
}

/// A message as this hop would forward it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub raw: Vec<u8>,
    pub request_line: RequestLine,
    /// Every line of the head including the request line and the trailing
    /// blank lines, each with its own line ending.
    pub header_lines: Vec<Vec<u8>>,
    /// Decoded body (chunk framing removed).
    pub body: Vec<u8>,
    header_endings: Vec<Vec<u8>>,
}

impl ParsedMessage {
    pub fn header_block(&self) -> Vec<u8> {
        self.header_lines.concat()
    }

    pub fn headers(&self) -> HeaderMap {
        HeaderMap::from_lines(&self.header_lines, &self.header_endings)
    }

    pub fn header_lines_text(&self) -> Vec<String> {
        lossy_lines(&self.header_lines)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedUnit {
    Message(ParsedMessage),
    Blocked {
        tagged: Vec<u8>,
        message: ParsedMessage,
        source: FirewallSource,
        connection_closed: bool,
    },
    Diagnostic {
        tagged: Vec<u8>,
        failure: ParseFailure,
    },
}

impl ParsedUnit {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Message(message) => &message.raw,
            Self::Blocked { tagged, .. } => tagged,
            Self::Diagnostic { tagged, .. } => tagged,
        }
    }

    pub fn message(&self) -> Option<&ParsedMessage> {
        match self {
            Self::Message(message) | Self::Blocked { message, .. } => Some(message),
            Self::Diagnostic { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Blocked { .. } => "blocked",
            Self::Diagnostic { failure, .. } if failure.is_incomplete() => "incomplete",
            Self::Diagnostic { .. } => "error",
        }
    }
}

/// Units of one parse call plus what happened to the bytes that did not
/// become units. `blocked` and `failure` are filled in either mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub units: Vec<ParsedUnit>,
    pub stopped_early: bool,
    pub blocked: usize,
    pub failure: Option<ParseFailure>,
}

impl ParseOutcome {
    pub fn message_count(&self) -> usize {
        self.units
            .iter()
            .filter(|u| matches!(u, ParsedUnit::Message(_)))
            .count()
    }
}

/// Delimiters of one configuration, decoded and compiled once per call.
#[derive(Debug)]
pub(crate) struct HopRules {
    pub header_endings: Vec<Vec<u8>>,
    pub best_ending: Vec<u8>,
    pub head_terminator: Regex,
    pub line_splitter: Regex,
    pub request_delimiter: Regex,
    pub chunked_endings: Vec<Vec<u8>>,
    pub best_chunked_ending: Vec<u8>,
    pub url_range: Option<(u32, u32)>,
}

impl HopRules {
    pub fn compile(config: &ParserConfig) -> ParseStep<Self> {
        let header_endings = escape::decode_all(&config.header_line_endings);
        if header_endings.is_empty() {
            return Err(ParseFailure::Malformed(
                "No header line endings configured".to_string(),
            ));
        }

        let delimiters = escape::decode_all(&config.request_line_delimiters);
        if delimiters.is_empty() {
            return Err(ParseFailure::Malformed(
                "No request line delimiters configured".to_string(),
            ));
        }

        let url_range = if config.url_decode.enabled {
            match config.url_decode.range() {
                Some(range) => Some(range),
                None => {
                    return Err(ParseFailure::Malformed(format!(
                        "Invalid URL decode range {}-{}",
                        config.url_decode.from_hex, config.url_decode.to_hex
                    )))
                }
            }
        } else {
            None
        };

        let pairs: Vec<Vec<u8>> = header_endings
            .iter()
            .flat_map(|a| header_endings.iter().map(move |b| [a.as_slice(), b].concat()))
            .collect();

        let chunked_endings = escape::decode_all(&config.chunked_line_endings);

        Ok(Self {
            best_ending: best_ending(&header_endings),
            head_terminator: alternation(&pairs)?,
            line_splitter: alternation(&header_endings)?,
            request_delimiter: alternation(&delimiters)?,
            best_chunked_ending: best_ending(&chunked_endings),
            header_endings,
            chunked_endings,
            url_range,
        })
    }
}

/// CRLF if configured, else LF, else the first configured ending.
pub fn best_ending(endings: &[Vec<u8>]) -> Vec<u8> {
    for preferred in [&b"\r\n"[..], &b"\n"[..]] {
        if endings.iter().any(|e| e == preferred) {
            return preferred.to_vec();
        }
    }
    endings.first().cloned().unwrap_or_else(|| b"\r\n".to_vec())
}

/// Leftmost match over all alternatives, longest alternative first at equal
/// start positions.
fn alternation(alternatives: &[Vec<u8>]) -> ParseStep<Regex> {
    let mut sorted: Vec<&Vec<u8>> = alternatives.iter().collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()));
    sorted.dedup();

    let pattern = sorted
        .iter()
        .map(|alt| regex::escape(&String::from_utf8_lossy(alt)))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&pattern).map_err(|e| ParseFailure::Malformed(format!("Invalid delimiter: {}", e)))
}

/// Earliest occurrence of any needle as `(position, needle length)`; the
/// longest needle wins at equal positions.
pub fn find_earliest(haystack: &[u8], needles: &[Vec<u8>]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for needle in needles.iter().filter(|n| !n.is_empty()) {
        if let Some(pos) = find_subslice(haystack, needle) {
            best = match best {
                Some((bp, bl)) if bp < pos || (bp == pos && bl >= needle.len()) => Some((bp, bl)),
                _ => Some((pos, needle.len())),
            };
        }
    }
    best
}

pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|p| p + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

pub fn lossy_lines(lines: &[Vec<u8>]) -> Vec<String> {
    lines
        .iter()
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect()
}

pub struct HopParser<'a> {
    config: &'a ParserConfig,
    scripts: &'a dyn ScriptHook,
}

impl<'a> HopParser<'a> {
    pub fn new(config: &'a ParserConfig, scripts: &'a dyn ScriptHook) -> Self {
        Self { config, scripts }
    }

    pub fn parse(&self, buffer: &[u8], mode: ParseMode) -> Vec<ParsedUnit> {
        self.parse_detailed(buffer, mode).units
    }

    pub fn parse_detailed(&self, buffer: &[u8], mode: ParseMode) -> ParseOutcome {
        let mut units = Vec::new();

        let rules = match HopRules::compile(self.config) {
            Ok(rules) => rules,
            Err(failure) => {
                warn!("Hop configuration unusable: {}", failure.tag());
                if mode == ParseMode::Tagged {
                    units.push(diagnostic(failure.clone(), buffer));
                }
                return ParseOutcome {
                    units,
                    stopped_early: !buffer.is_empty(),
                    blocked: 0,
                    failure: Some(failure),
                };
            }
        };

        let mut remaining = buffer;
        let mut stopped_early = false;
        let mut blocked = 0;
        let mut last_failure = None;

        while !remaining.is_empty() {
            let (message, rest) = match self.parse_message(&rules, remaining) {
                Ok(parsed) => parsed,
                Err(failure) => {
                    trace!("Parse stopped: {}", failure.tag());
                    if mode == ParseMode::Tagged {
                        units.push(diagnostic(failure.clone(), remaining));
                    }
                    last_failure = Some(failure);
                    stopped_early = true;
                    break;
                }
            };

            let verdict =
                match firewall::evaluate(&self.config.firewall_rules, &message, self.scripts) {
                    Ok(verdict) => verdict,
                    Err(failure) => {
                        trace!("Firewall evaluation failed: {}", failure.tag());
                        if mode == ParseMode::Tagged {
                            units.push(diagnostic(failure.clone(), remaining));
                        }
                        last_failure = Some(failure);
                        stopped_early = true;
                        break;
                    }
                };

            remaining = rest;

            match verdict {
                None => {
                    trace!(
                        "Parsed {} {} ({} bytes)",
                        message.request_line.method,
                        message.request_line.uri,
                        message.raw.len()
                    );
                    units.push(ParsedUnit::Message(message));
                }
                Some(verdict) => {
                    blocked += 1;
                    debug!(
                        "Firewall rule on {} blocked {} {}",
                        verdict.source.as_str(),
                        message.request_line.method,
                        message.request_line.uri
                    );
                    if mode == ParseMode::Tagged {
                        let mut tagged = message.raw.clone();
                        tagged.extend_from_slice(waf_tag(verdict.source).as_bytes());
                        if verdict.close_connection {
                            tagged.extend_from_slice(CONNECTION_CLOSED_TAG.as_bytes());
                        }
                        units.push(ParsedUnit::Blocked {
                            tagged,
                            message,
                            source: verdict.source,
                            connection_closed: verdict.close_connection,
                        });
                    }
                    if verdict.close_connection {
                        stopped_early = !remaining.is_empty();
                        break;
                    }
                }
            }
        }

        debug!(
            "Parsed {} unit(s) from {} byte buffer (stopped early: {})",
            units.len(),
            buffer.len(),
            stopped_early
        );

        ParseOutcome {
            units,
            stopped_early,
            blocked,
            failure: last_failure,
        }
    }

    fn parse_message<'b>(
        &self,
        rules: &HopRules,
        buffer: &'b [u8],
    ) -> ParseStep<(ParsedMessage, &'b [u8])> {
        let head_end = headers::find_head_end(buffer, &rules.head_terminator)
            .ok_or(ParseFailure::Incomplete(Incomplete::Headers))?;

        let mut lines = headers::split_lines(&buffer[..head_end], &rules.line_splitter);
        if self.config.allow_header_folding {
            lines = headers::unfold(lines, &rules.header_endings);
        }

        headers::delete_lines(
            &mut lines,
            &self.config.delete_header_rules,
            &rules.header_endings,
        );
        headers::insert_lines(
            &mut lines,
            &self.config.add_header_rules,
            &rules.best_ending,
            &rules.header_endings,
        );

        if let Some(script) = self.config.header_lines_script.active() {
            lines = self.run_header_lines_script(script, &lines)?;
        }

        if lines.is_empty() {
            return Err(ParseFailure::Malformed("Empty request head".to_string()));
        }

        let (request_line, rebuilt) =
            request_line::rebuild(&lines[0], rules, self.config, self.scripts)?;
        lines[0] = rebuilt;

        let header_map = HeaderMap::from_lines(&lines, &rules.header_endings);
        let mut resolved = body::resolve(
            &header_map,
            &buffer[head_end..],
            &self.config.body_length_rules,
            &rules.chunked_endings,
        )?;
        let consumed = head_end + resolved.consumed;

        if let Some(script) = self.config.message_length_script.active() {
            self.run_message_length_script(script, &mut lines, &mut resolved)?;
        }

        let output_body = encoding::apply(
            self.config.output_body_encoding,
            &mut lines,
            &resolved,
            rules,
        );

        let mut raw = lines.concat();
        raw.extend_from_slice(&output_body);

        let message = ParsedMessage {
            raw,
            request_line,
            header_lines: lines,
            body: resolved.body,
            header_endings: rules.header_endings.clone(),
        };

        Ok((message, &buffer[consumed..]))
    }

    fn run_header_lines_script(
        &self,
        script: &str,
        lines: &[Vec<u8>],
    ) -> ParseStep<Vec<Vec<u8>>> {
        let inputs = ScriptVars::new()
            .with(script::HEADER_LINES, ScriptValue::Lines(lossy_lines(lines)))
            .with(script::HEADERS, ScriptValue::Bytes(lines.concat()));

        let outputs = self
            .scripts
            .invoke(script, &inputs)
            .map_err(|e| ParseFailure::Script(format!("Header lines script failed: {}", e)))?;

        outputs
            .get(script::OUT_HEADER_LINES)
            .and_then(ScriptValue::as_lines)
            .map(|lines| lines.into_iter().map(String::into_bytes).collect())
            .ok_or_else(|| {
                ParseFailure::Script(format!(
                    "Header lines script failed: {} not set",
                    script::OUT_HEADER_LINES
                ))
            })
    }

    fn run_message_length_script(
        &self,
        script: &str,
        lines: &mut Vec<Vec<u8>>,
        resolved: &mut ResolvedBody,
    ) -> ParseStep<()> {
        let inputs = ScriptVars::new()
            .with(script::HEADER_LINES, ScriptValue::Lines(lossy_lines(lines)))
            .with(script::HEADERS, ScriptValue::Bytes(lines.concat()))
            .with(script::BODY, ScriptValue::Bytes(resolved.body.clone()));

        let outputs = self
            .scripts
            .invoke(script, &inputs)
            .map_err(|e| ParseFailure::Script(format!("Message length script failed: {}", e)))?;

        if let Some(new_lines) = outputs
            .get(script::OUT_HEADER_LINES)
            .and_then(ScriptValue::as_lines)
        {
            *lines = new_lines.into_iter().map(String::into_bytes).collect();
        }

        if let Some(new_body) = outputs.get(script::OUT_BODY) {
            let new_body = new_body.as_bytes();
            if new_body != resolved.body {
                resolved.body = new_body;
                if let Framing::Chunked { .. } = resolved.framing {
                    resolved.framing = Framing::ChunkedModified;
                }
            }
        }

        Ok(())
    }
}

fn diagnostic(failure: ParseFailure, remaining: &[u8]) -> ParsedUnit {
    let mut tagged = failure.tag().into_bytes();
    tagged.extend_from_slice(remaining);
    ParsedUnit::Diagnostic { tagged, failure }
}

/// Convenience wrapper around [`HopParser::parse`].
pub fn parse(
    config: &ParserConfig,
    buffer: &[u8],
    mode: ParseMode,
    scripts: &dyn ScriptHook,
) -> Vec<ParsedUnit> {
    HopParser::new(config, scripts).parse(buffer, mode)
}
