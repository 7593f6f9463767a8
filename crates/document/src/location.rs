//! Location tokens.
//!
//! A token is a `;`-separated list of `key=value` pairs naming the format and
//! enough structure to find the line again:
//!
//! - `fmt=txt;line=N`
//! - `fmt=pdf;page=P;line=N`
//! - `fmt=epub;spine=S;offset=O;line=N`
//!
//! The legacy `line:N` form is accepted when decoding. Whenever a token
//! carries a parseable `line` it wins over the structural keys, so a token
//! cached against the same document always lands on the exact same line.

use crate::model::{Document, Format, LineAnchor};
use std::collections::HashMap;

const LEGACY_PREFIX: &str = "line:";

/// Encode the position of `line` (clamped into the document) as a token.
pub fn encode(document: &Document, line: i64) -> String {
    let line = document.clamp(line);
    let anchor = document.anchor(line);
    match document.format {
        Format::Txt => format!("fmt=txt;line={line}"),
        Format::Pdf => {
            let page = nearest(document, line, |a| a.page.filter(|page| *page > 0)).unwrap_or(1);
            format!("fmt=pdf;page={page};line={line}")
        },
        Format::Epub => {
            let spine = nearest(document, line, |a| a.spine).unwrap_or(0);
            let offset = anchor.and_then(|a| a.offset).unwrap_or(0);
            format!("fmt=epub;spine={spine};offset={offset};line={line}")
        },
    }
}

/// Resolve a token against `document`.
///
/// Returns the line and whether the token matched anything; unmatched tokens
/// resolve to `(0, false)`.
pub fn decode(document: &Document, token: &str) -> (usize, bool) {
    let token = token.trim();
    if let Some(prefix) = token.get(..LEGACY_PREFIX.len())
        && prefix.eq_ignore_ascii_case(LEGACY_PREFIX)
    {
        return match token[LEGACY_PREFIX.len()..].trim().parse::<i64>() {
            Ok(line) => (document.clamp(line), true),
            Err(_) => (0, false),
        };
    }

    let pairs = parse_pairs(token);
    if let Some(line) = pairs.get("line").and_then(|v| v.parse::<i64>().ok()) {
        return (document.clamp(line), true);
    }

    let format = pairs
        .get("fmt")
        .and_then(|fmt| fmt.parse::<Format>().ok())
        .unwrap_or(document.format);
    let number = |key: &str| pairs.get(key).and_then(|v| v.parse::<u32>().ok());
    let found = match format {
        Format::Txt => None,
        Format::Pdf => number("page").and_then(|page| find(document, |a| a.page == Some(page))),
        Format::Epub => number("spine").and_then(|spine| {
            number("offset")
                .and_then(|offset| find(document, |a| a.spine == Some(spine) && a.offset == Some(offset)))
                .or_else(|| find(document, |a| a.spine == Some(spine)))
        }),
    };
    found.map_or((0, false), |line| (line, true))
}

fn parse_pairs(token: &str) -> HashMap<String, &str> {
    token
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn find(document: &Document, predicate: impl Fn(&LineAnchor) -> bool) -> Option<usize> {
    document.anchors().iter().position(predicate)
}

/// Value of `field` at `line`, or else the closest earlier line that has one,
/// or else the closest later line.
fn nearest(document: &Document, line: usize, field: impl Fn(&LineAnchor) -> Option<u32>) -> Option<u32> {
    let anchors = document.anchors();
    let split = line.saturating_add(1).min(anchors.len());
    let (before, after) = anchors.split_at(split);
    before.iter().rev().find_map(&field).or_else(|| after.iter().find_map(&field))
}
