//! Scans tracked IMAP mailboxes for new mail from tracked senders and
//! delivers a screenshot of each message to the mailbox owner.

pub mod config;
pub mod credential;
pub mod delivery;
pub mod error;
pub mod imap;
pub mod model;
pub mod orchestrator;
pub mod render;
pub mod sink;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::ScanError;
pub use model::{MailboxCredential, RecipientId, ScanErrorLog, ServerAddress};
pub use orchestrator::{ScanOptions, ScanOrchestrator};
