use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of the user that receives screenshots and warnings.
pub type RecipientId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

/// A tracked mailbox as handed over by the caller for one scan.
#[derive(Clone, PartialEq, Eq)]
pub struct MailboxCredential {
    pub address: String,
    /// Stored secret, only ever passed through a `CredentialCodec`.
    pub secret: String,
    pub server: ServerAddress,
}

impl fmt::Debug for MailboxCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredential")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// One message header as returned by the bulk header fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeaderRecord {
    pub uid: u32,
    pub flags: Vec<String>,
    pub from: String,
    pub date: NaiveDate,
}

impl MessageHeaderRecord {
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Seen"))
    }
}

/// An unseen message from a tracked sender, dated on or after the cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub uid: u32,
    /// The tracked sender entry that matched the `From` header.
    pub sender: String,
    pub date: NaiveDate,
}

/// Content of one qualifying message, waiting to be rendered and delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub uid: u32,
    pub html_content: String,
    /// Mailbox address the message was found in; names the folder in save mode.
    pub target_folder_name: String,
}

/// Mailbox addresses grouped by failure reason, accumulated over one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScanErrorLog(BTreeMap<String, Vec<String>>);

impl ScanErrorLog {
    pub fn record(&mut self, reason: &str, address: &str) {
        self.0
            .entry(reason.to_string())
            .or_default()
            .push(address.to_string());
    }

    pub fn get(&self, reason: &str) -> Option<&[String]> {
        self.0.get(reason).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.0.values().any(|v| v.iter().any(|a| a == address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_log_groups_addresses_by_reason() {
        let mut log = ScanErrorLog::default();
        log.record("timeout", "a@example.com");
        log.record("timeout", "b@example.com");
        log.record("connection", "c@example.com");

        assert_eq!(
            log.get("timeout"),
            Some(&["a@example.com".to_string(), "b@example.com".to_string()][..])
        );
        assert!(log.contains_address("c@example.com"));
        assert!(!log.contains_address("d@example.com"));
        assert_eq!(
            serde_json::to_string(&log).unwrap(),
            r#"{"connection":["c@example.com"],"timeout":["a@example.com","b@example.com"]}"#
        );
    }

    #[test]
    fn seen_flag_check_is_case_insensitive() {
        let record = MessageHeaderRecord {
            uid: 1,
            flags: vec!["\\Recent".into(), "\\SEEN".into()],
            from: String::new(),
            date: NaiveDate::from_ymd_opt(2022, 11, 1).unwrap(),
        };
        assert!(record.is_seen());
    }

    #[test]
    fn credential_debug_hides_secret() {
        let cred = MailboxCredential {
            address: "me@example.com".into(),
            secret: "c2VjcmV0".into(),
            server: ServerAddress {
                host: "imap.example.com".into(),
                port: 993,
            },
        };
        let out = format!("{cred:?}");
        assert!(out.contains("me@example.com"));
        assert!(!out.contains("c2VjcmV0"));
    }
}
