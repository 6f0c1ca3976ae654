//! Parser for the bulk header FETCH response.
//!
//! Every message arrives as three lines:
//!
//! ```text
//! 1 FETCH (UID 1 FLAGS (\Seen) BODY[HEADER.FIELDS (From To Date)] {87}
//! From: a@example.com\r\nTo: b@example.com\r\nDate: 1 Nov 2022 13:55:15 +0100\r\n\r\n
//! )
//! ```
//!
//! UID and FLAGS may sit on either side of the literal, so both the status
//! line and the terminator are searched.

use crate::error::ScanError;
use regex::bytes::Regex;
use std::sync::LazyLock;

static UID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"UID (\d+)").unwrap());
static FLAGS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"FLAGS \(([^)]*)\)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFetch {
    pub uid: u32,
    pub flags: Vec<String>,
    pub header: Vec<u8>,
}

/// Triplets of a header FETCH response, parsed one message at a time. A
/// trailing group shorter than three lines (such as a tagged completion) is
/// ignored.
#[derive(Debug)]
pub struct HeaderFetches {
    lines: std::vec::IntoIter<Vec<u8>>,
}

pub fn header_fetches(lines: Vec<Vec<u8>>) -> HeaderFetches {
    HeaderFetches {
        lines: lines.into_iter(),
    }
}

impl Iterator for HeaderFetches {
    type Item = Result<HeaderFetch, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        let status = self.lines.next()?;
        let header = self.lines.next()?;
        let terminator = self.lines.next()?;
        Some(parse_triplet(&status, header, &terminator))
    }
}

pub fn parse_triplet(
    status: &[u8],
    header: Vec<u8>,
    terminator: &[u8],
) -> Result<HeaderFetch, ScanError> {
    let mut envelope = Vec::with_capacity(status.len() + terminator.len() + 1);
    envelope.extend_from_slice(status);
    envelope.push(b' ');
    envelope.extend_from_slice(terminator);

    let uid = UID_RE
        .captures(&envelope)
        .and_then(|c| c.get(1))
        .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| {
            ScanError::Parse(format!(
                "no UID in FETCH line: {}",
                String::from_utf8_lossy(status)
            ))
        })?;

    let flags = FLAGS_RE
        .captures(&envelope)
        .and_then(|c| c.get(1))
        .map(|m| {
            String::from_utf8_lossy(m.as_bytes())
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
        .ok_or_else(|| ScanError::Parse(format!("no FLAGS for message {uid}")))?;

    Ok(HeaderFetch { uid, flags, header })
}
