//! Response Decoder.
//!
//! # Output Format
//! ```text
//! Status: 201 Created\r\n        (optional, excluded from headers)
//! Content-Type: text/plain\r\n   (zero or more Name: Value lines)
//! \r\n                           (first blank line: `\n` or `\r\n`)
//! <body bytes, passed through untouched>
//! ```
//!
//! # Design Decisions
//! - Split happens at the *first* blank line; later blank lines belong to the body
//! - Output without a blank line is malformed, even when bytes were produced
//! - Header order and duplicates (e.g. `Set-Cookie`) are preserved

use axum::http::{HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

/// Reasons handler output cannot be turned into a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The handler produced no output at all.
    #[error("handler produced no output")]
    Empty,

    /// No blank line separates the header block from the body.
    #[error("no blank line after the header block")]
    MissingSeparator,

    /// A header line is not of the form `Name: Value`.
    #[error("header line {line} is not 'Name: Value': {text:?}")]
    MalformedHeader { line: usize, text: String },

    /// The `Status` header does not start with a valid status code.
    #[error("invalid Status header: {0:?}")]
    InvalidStatus(String),
}

/// A handler response after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    pub status: StatusCode,
    /// Reason phrase from the `Status` header, if one was given.
    pub reason: Option<String>,
    /// Headers in the order the handler emitted them.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Vec<u8>,
}

impl DecodedResponse {
    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }
}

/// Decode raw handler output.
pub fn decode(raw: &[u8]) -> Result<DecodedResponse, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }

    let (head, body) = split_at_blank_line(raw).ok_or(DecodeError::MissingSeparator)?;

    let mut status: Option<(StatusCode, Option<String>)> = None;
    let mut headers = Vec::new();

    for (index, line) in head.split(|&b| b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let (name, value) = parse_header_line(line).ok_or_else(|| DecodeError::MalformedHeader {
            line: index + 1,
            text: String::from_utf8_lossy(line).into_owned(),
        })?;

        if name.as_str() == "status" {
            if status.is_none() {
                status = Some(parse_status(&value)?);
            } else {
                tracing::debug!("Ignoring repeated Status header from handler");
            }
        } else {
            headers.push((name, value));
        }
    }

    let (status, reason) = match status {
        Some(status) => status,
        None if headers.iter().any(|(n, _)| *n == axum::http::header::LOCATION) => {
            (StatusCode::FOUND, None)
        }
        None => (StatusCode::OK, None),
    };

    Ok(DecodedResponse {
        status,
        reason,
        headers,
        body: body.to_vec(),
    })
}

/// Split at the first empty line. The header block keeps its line endings;
/// the body starts right after the blank line's `\n`.
fn split_at_blank_line(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut start = 0;
    while start < raw.len() {
        let end = start + raw[start..].iter().position(|&b| b == b'\n')?;
        let line = &raw[start..end];
        if line.is_empty() || line == b"\r" {
            return Some((&raw[..start], &raw[end + 1..]));
        }
        start = end + 1;
    }
    None
}

fn parse_header_line(line: &[u8]) -> Option<(HeaderName, HeaderValue)> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = HeaderName::from_bytes(&line[..colon]).ok()?;
    let value = trim_ascii(&line[colon + 1..]);
    let value = HeaderValue::from_bytes(value).ok()?;
    Some((name, value))
}

fn parse_status(value: &HeaderValue) -> Result<(StatusCode, Option<String>), DecodeError> {
    let text = value
        .to_str()
        .map_err(|_| DecodeError::InvalidStatus(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;

    let mut parts = text.splitn(2, char::is_whitespace);
    let code = parts.next().unwrap_or_default();
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| DecodeError::InvalidStatus(text.to_string()))?;

    let reason = parts
        .next()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok((status, reason))
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &bytes[start..end]
}
