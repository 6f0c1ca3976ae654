use super::response::{header_fetches, HeaderFetch, HeaderFetches};
use super::MailboxSession;
use crate::error::ScanError;
use crate::model::{Candidate, MessageHeaderRecord};
use chrono::{NaiveDate, NaiveDateTime};
use mailparse::MailHeaderMap;
use regex::Regex;
use std::sync::LazyLock;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2} \w{3} \d{4}").unwrap());

/// Pulls the `D MMM YYYY` part out of a `Date` header. Weekday, time and
/// zone around it are ignored.
pub fn parse_date(value: &str) -> Result<NaiveDate, ScanError> {
    let token = DATE_RE
        .find(value)
        .ok_or_else(|| ScanError::Parse(format!("no date in {value:?}")))?;
    NaiveDate::parse_from_str(token.as_str(), "%d %b %Y")
        .map_err(|e| ScanError::Parse(format!("bad date {:?}: {}", token.as_str(), e)))
}

pub fn parse_record(fetch: HeaderFetch) -> Result<MessageHeaderRecord, ScanError> {
    let (headers, _) =
        mailparse::parse_headers(&fetch.header).map_err(|e| ScanError::Parse(e.to_string()))?;
    let from = headers.get_first_value("From").unwrap_or_default();
    let date = headers
        .get_first_value("Date")
        .ok_or_else(|| ScanError::Parse(format!("message {} has no Date header", fetch.uid)))?;

    Ok(MessageHeaderRecord {
        uid: fetch.uid,
        flags: fetch.flags,
        from,
        date: parse_date(&date)?,
    })
}

/// First tracked sender that occurs anywhere in the `From` value.
pub fn matching_sender<'a>(from: &str, tracked: &'a [String]) -> Option<&'a str> {
    tracked
        .iter()
        .map(String::as_str)
        .find(|sender| !sender.is_empty() && from.contains(sender))
}

/// Qualifying messages of one header fetch, in server order. Parsed on
/// demand; a message whose headers cannot be parsed is logged and skipped.
#[derive(Debug)]
pub struct Candidates {
    fetches: HeaderFetches,
    tracked: Vec<String>,
    cutoff: NaiveDateTime,
}

impl Candidates {
    pub fn new(fetches: HeaderFetches, tracked: &[String], cutoff: NaiveDateTime) -> Self {
        Self {
            fetches,
            tracked: tracked.to_vec(),
            cutoff,
        }
    }

    fn qualify(&self, fetch: HeaderFetch) -> Result<Option<Candidate>, ScanError> {
        let record = parse_record(fetch)?;
        if record.is_seen() {
            return Ok(None);
        }
        let Some(sender) = matching_sender(&record.from, &self.tracked) else {
            return Ok(None);
        };
        if record.date.and_time(chrono::NaiveTime::MIN) < self.cutoff {
            tracing::debug!("Message {} from {} is older than cutoff", record.uid, sender);
            return Ok(None);
        }
        Ok(Some(Candidate {
            uid: record.uid,
            sender: sender.to_string(),
            date: record.date,
        }))
    }
}

impl Iterator for Candidates {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            let fetch = match self.fetches.next()? {
                Ok(fetch) => fetch,
                Err(e) => {
                    tracing::warn!("Skipping unparsable FETCH item: {}", e);
                    continue;
                }
            };
            let uid = fetch.uid;
            match self.qualify(fetch) {
                Ok(Some(candidate)) => return Some(candidate),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping message {}: {}", uid, e),
            }
        }
    }
}

/// Fetches the headers of the whole selected folder and returns the
/// unseen messages from tracked senders dated on or after `cutoff`.
pub async fn fetch_unseen_candidates(
    session: &mut MailboxSession,
    tracked: &[String],
    cutoff: NaiveDateTime,
) -> Result<Candidates, ScanError> {
    let lines = session.fetch_header_lines().await?;
    tracing::debug!(
        "Header fetch for {} returned {} lines",
        session.address(),
        lines.len()
    );
    Ok(Candidates::new(header_fetches(lines), tracked, cutoff))
}
