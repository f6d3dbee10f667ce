//! Structured records parsed from normalized document text.
//!
//! A decoded document reads, top to bottom:
//!
//! ```text
//! <title>
//! <source / feed>
//! <date line>
//! ... metadata, including an optional "Dateline: <city>, <country>, ..." line ...
//! Body
//! <body text>
//! Graphic | Load-Date ...
//! ```
//!
//! There is no formal grammar; the parser keys off line positions and a
//! handful of literal markers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::date::parse_date;

const DATELINE_PREFIX: &str = "Dateline:";
const BODY_MARKER: &str = "Body";
const END_MARKERS: [&str; 2] = ["Graphic", "Load-Date"];

/// One normalized document, as persisted under `json/{date}/`.
///
/// Field order is the JSON field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub date: NaiveDate,
    pub country: Option<String>,
    pub location: Option<String>,
    pub source: String,
    pub title: String,
    pub text: String,
}

/// Fields extracted from a document before its date has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub date: Option<NaiveDate>,
    /// The date line as it appeared, kept for reporting unresolved dates.
    pub raw_date: String,
    pub country: Option<String>,
    pub location: Option<String>,
    pub source: String,
    pub title: String,
    pub text: String,
}

/// Per-document parse failures. None of these abort a chunk.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("document has fewer than three header lines")]
    MissingHeader,
    #[error("no 'Body' marker in document")]
    MissingBody,
    #[error("unresolvable date line '{raw}' for '{title}'")]
    UnresolvedDate { raw: String, title: String },
}

impl ParsedDocument {
    /// Turn into a storable record. A document without a resolvable date
    /// cannot be keyed on disk and is rejected.
    pub fn resolve(self) -> Result<DocumentRecord, ParseError> {
        match self.date {
            Some(date) => Ok(DocumentRecord {
                date,
                country: self.country,
                location: self.location,
                source: self.source,
                title: self.title,
                text: self.text,
            }),
            None => Err(ParseError::UnresolvedDate {
                raw: self.raw_date,
                title: self.title,
            }),
        }
    }
}

/// Parse one normalized text blob into its fields.
pub fn parse_document(text: &str) -> Result<ParsedDocument, ParseError> {
    let mut header = text.splitn(4, '\n');
    let title = header.next().ok_or(ParseError::MissingHeader)?;
    let source = header.next().ok_or(ParseError::MissingHeader)?;
    let raw_date = header.next().ok_or(ParseError::MissingHeader)?;
    let rest = header.next().ok_or(ParseError::MissingHeader)?;

    let raw_date = raw_date.trim();
    let date = parse_date(raw_date);

    let (location, country) = find_line(rest, |line| line.starts_with(DATELINE_PREFIX))
        .map(|(start, end)| {
            let line = rest[start..end].trim_start();
            split_dateline(&line[DATELINE_PREFIX.len()..])
        })
        .unwrap_or((None, None));

    let body_start = match find_line(rest, |line| line.trim_end() == BODY_MARKER) {
        Some((_, end)) => end,
        None => rest.find(BODY_MARKER).ok_or(ParseError::MissingBody)? + BODY_MARKER.len(),
    };
    let body = &rest[body_start..];

    let body_end = find_line(body, |line| {
        END_MARKERS.iter().any(|marker| line.starts_with(marker))
    })
    .map(|(start, _)| start)
    .or_else(|| END_MARKERS.iter().filter_map(|m| body.find(m)).min())
    .unwrap_or(body.len());

    Ok(ParsedDocument {
        date,
        raw_date: raw_date.to_string(),
        country,
        location,
        source: source.trim().to_string(),
        title: title.trim().to_string(),
        text: body[..body_end].trim().to_string(),
    })
}

/// Byte range `(start, end)` of the first line whose left-trimmed content
/// satisfies `pred`. `end` points past the line's newline.
fn find_line(text: &str, pred: impl Fn(&str) -> bool) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        if pred(line.trim_start()) {
            return Some((start, offset));
        }
    }
    None
}

/// Split a dateline value into `(location, country)`.
///
/// Trailing comma-separated segments carrying digits (dates, years) are not
/// part of the place. What remains splits on the first `", "` into city and
/// country; with no comma the whole clause is the location.
fn split_dateline(value: &str) -> (Option<String>, Option<String>) {
    let mut parts: Vec<&str> = value.split(',').map(str::trim).collect();
    while parts.len() > 1
        && parts
            .last()
            .is_some_and(|p| p.is_empty() || p.bytes().any(|b| b.is_ascii_digit()))
    {
        parts.pop();
    }
    let clause = parts.join(", ");
    if clause.is_empty() {
        return (None, None);
    }
    match clause.split_once(", ") {
        Some((city, country)) => (Some(city.to_string()), Some(country.to_string())),
        None => (Some(clause), None),
    }
}
