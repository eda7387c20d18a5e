// File: headers.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use regex::bytes::Regex;

use super::trim_bytes;

/// End offset of the head: the earliest pair of configured line endings.
pub fn find_head_end(buffer: &[u8], terminator: &Regex) -> Option<usize> {
    terminator.find(buffer).map(|m| m.end())
}

/// Splits a head into lines, each keeping its own ending.
pub fn split_lines(head: &[u8], splitter: &Regex) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for m in splitter.find_iter(head) {
        lines.push(head[start..m.end()].to_vec());
        start = m.end();
    }
    if start < head.len() {
        lines.push(head[start..].to_vec());
    }
    lines
}

/// Splits a line into content and the longest configured ending it carries.
pub fn split_ending<'a>(line: &'a [u8], endings: &[Vec<u8>]) -> (&'a [u8], &'a [u8]) {
    let ending_len = endings
        .iter()
        .filter(|e| line.ends_with(e))
        .map(|e| e.len())
        .max()
        .unwrap_or(0);
    line.split_at(line.len() - ending_len)
}

pub fn is_blank(line: &[u8], endings: &[Vec<u8>]) -> bool {
    split_ending(line, endings).0.is_empty()
}

/// Joins obsolete continuation lines (leading SP or HTAB) onto the line
/// before them. The previous line keeps its own ending.
pub fn unfold(lines: Vec<Vec<u8>>, endings: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut unfolded: Vec<Vec<u8>> = Vec::with_capacity(lines.len());
    for line in lines {
        let continuation = matches!(line.first(), Some(b' ') | Some(b'\t'));
        match unfolded.last_mut() {
            Some(previous) if continuation => {
                let (content, _) = split_ending(&line, endings);
                let start = content
                    .iter()
                    .position(|b| *b != b' ' && *b != b'\t')
                    .unwrap_or(content.len());

                let (prev_content, prev_ending) = split_ending(previous, endings);
                let mut merged = prev_content.to_vec();
                merged.extend_from_slice(&content[start..]);
                merged.extend_from_slice(prev_ending);
                *previous = merged;
            }
            _ => unfolded.push(line),
        }
    }
    unfolded
}

/// Drops header lines containing any of `rules`. The request line and the
/// blank lines closing the head are never dropped.
pub fn delete_lines(lines: &mut Vec<Vec<u8>>, rules: &[String], endings: &[Vec<u8>]) {
    let needles: Vec<&[u8]> = rules
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| r.as_bytes())
        .collect();
    if needles.is_empty() {
        return;
    }

    let mut index = 0;
    lines.retain(|line| {
        let keep = index == 0
            || is_blank(line, endings)
            || !needles
                .iter()
                .any(|needle| super::find_subslice(line, needle).is_some());
        index += 1;
        keep
    });
}

/// Position of the first line of the trailing blank-line run.
pub fn trailing_blank_start(lines: &[Vec<u8>], endings: &[Vec<u8>]) -> usize {
    lines
        .iter()
        .rposition(|line| !is_blank(line, endings))
        .map(|p| p + 1)
        .unwrap_or(0)
}

/// Inserts `additions` in order just before the blank lines ending the head.
pub fn insert_lines(
    lines: &mut Vec<Vec<u8>>,
    additions: &[String],
    ending: &[u8],
    endings: &[Vec<u8>],
) {
    let mut at = trailing_blank_start(lines, endings);
    for addition in additions.iter().filter(|a| !a.is_empty()) {
        let mut line = addition.as_bytes().to_vec();
        if split_ending(&line, endings).1.is_empty() {
            line.extend_from_slice(ending);
        }
        lines.insert(at, line);
        at += 1;
    }
}

/// Header name of a line, without surrounding whitespace.
pub fn header_name<'a>(line: &'a [u8], endings: &[Vec<u8>]) -> Option<&'a [u8]> {
    let (content, _) = split_ending(line, endings);
    let colon = content.iter().position(|b| *b == b':')?;
    Some(trim_bytes(&content[..colon]))
}

/// Removes every header line named `name` (case-insensitive), returning the
/// index of the first removed line.
pub fn remove_named(lines: &mut Vec<Vec<u8>>, name: &str, endings: &[Vec<u8>]) -> Option<usize> {
    let mut first = None;
    let mut index = 0;
    lines.retain(|line| {
        let matches = index > 0
            && header_name(line, endings)
                .map(|n| n.eq_ignore_ascii_case(name.as_bytes()))
                .unwrap_or(false);
        if matches && first.is_none() {
            first = Some(index);
        }
        index += 1;
        !matches
    });
    first
}

/// Case-insensitive view of the header fields of a head, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    fields: Vec<(String, String)>,
}

impl HeaderMap {
    /// Builds the map from head lines, skipping the request line and blank
    /// lines. Names are lower-cased, values trimmed.
    pub fn from_lines(lines: &[Vec<u8>], endings: &[Vec<u8>]) -> Self {
        let mut fields = Vec::new();
        for line in lines.iter().skip(1) {
            let (content, _) = split_ending(line, endings);
            let Some(colon) = content.iter().position(|b| *b == b':') else {
                continue;
            };
            let name = String::from_utf8_lossy(trim_bytes(&content[..colon])).to_lowercase();
            let value = String::from_utf8_lossy(trim_bytes(&content[colon + 1..])).into_owned();
            fields.push((name, value));
        }
        Self { fields }
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        let name = name.trim().to_lowercase();
        self.fields
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get_all(name).into_iter().next()
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.get_all(name).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
