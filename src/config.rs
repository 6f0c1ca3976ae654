use crate::delivery::DeliveryMode;
use crate::error::ScanError;
use crate::imap::provider::ImapProvider;
use crate::model::{MailboxCredential, RecipientId, ServerAddress};
use crate::orchestrator::ScanOptions;
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the delivery bot token.
pub const BOT_TOKEN_ENV: &str = "MAILSHOT_BOT_TOKEN";

fn default_timeout_secs() -> u64 {
    10
}

fn default_lookback_hours() -> i64 {
    24
}

fn default_mail_folder() -> PathBuf {
    PathBuf::from("all_mails")
}

fn default_render_timeout_secs() -> u64 {
    60
}

#[derive(Clone, Deserialize)]
pub struct MailboxEntry {
    pub address: String,
    pub secret: String,
    #[serde(default)]
    pub server: Option<ServerAddress>,
}

impl std::fmt::Debug for MailboxEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxEntry")
            .field("address", &self.address)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// One recipient's scan, as read from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub recipient: RecipientId,
    #[serde(default)]
    pub mailboxes: Vec<MailboxEntry>,
    #[serde(default)]
    pub tracked_senders: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
    #[serde(default)]
    pub save_screenshots: bool,
    #[serde(default = "default_mail_folder")]
    pub mail_folder: PathBuf,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ScanError> {
        serde_json::from_str(raw).map_err(|e| ScanError::Config(e.to_string()))
    }

    /// Mailboxes with their IMAP endpoint resolved.
    pub fn credentials(&self) -> Vec<MailboxCredential> {
        self.mailboxes
            .iter()
            .map(|m| MailboxCredential {
                address: m.address.clone(),
                secret: m.secret.clone(),
                server: m
                    .server
                    .clone()
                    .unwrap_or_else(|| ImapProvider::from_email(&m.address).server()),
            })
            .collect()
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            connect_timeout: Duration::from_secs(self.timeout_secs),
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            mode: if self.save_screenshots {
                DeliveryMode::SaveToDisk {
                    root: self.mail_folder.clone(),
                }
            } else {
                DeliveryMode::Send
            },
        }
    }

    /// Oldest message date still considered new at `now`.
    pub fn cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - ChronoDuration::hours(self.lookback_hours)
    }
}

pub fn bot_token() -> Result<String, ScanError> {
    match std::env::var(BOT_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(ScanError::Config(format!("{BOT_TOKEN_ENV} is not set"))),
    }
}
