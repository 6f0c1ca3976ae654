pub mod fetcher;
pub mod provider;
pub mod response;
pub mod scanner;
pub mod session;
pub mod transport;

use crate::error::ScanError;
use crate::model::ServerAddress;
use async_trait::async_trait;

pub use session::{MailboxSession, SessionState};
pub use transport::AsyncImapConnector;

/// Folder every tracked mailbox is scanned in.
pub const INBOX: &str = "INBOX";

/// Header fields requested by the bulk header fetch.
pub const HEADER_FIELDS: [&str; 3] = ["From", "To", "Date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    MarkSeen,
    UnmarkSeen,
}

impl FlagOp {
    pub fn store_query(self) -> &'static str {
        match self {
            FlagOp::MarkSeen => "+FLAGS (\\Seen)",
            FlagOp::UnmarkSeen => "-FLAGS (\\Seen)",
        }
    }
}

/// What the server made of a LOGIN attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    /// The server answered, but did not grant access.
    Rejected(String),
}

/// Opens transports to IMAP servers. The greeting has been read once
/// `connect` returns.
#[async_trait]
pub trait ImapConnector: Send + Sync {
    async fn connect(&self, server: &ServerAddress) -> Result<Box<dyn ImapTransport>, ScanError>;
}

/// Raw IMAP commands over one connection. State checks live in
/// [`MailboxSession`].
#[async_trait]
pub trait ImapTransport: Send {
    async fn login(&mut self, user: &str, password: &str) -> Result<AuthState, ScanError>;

    async fn select(&mut self, folder: &str) -> Result<(), ScanError>;

    /// `UID FETCH 1:*` of the given header fields plus UID and FLAGS, without
    /// setting `\Seen`. Each message comes back as three lines: the status
    /// line announcing the literal, the header block, and the terminator.
    async fn fetch_header_lines(&mut self, fields: &[&str]) -> Result<Vec<Vec<u8>>, ScanError>;

    /// Full RFC 822 source of one message.
    async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>, ScanError>;

    async fn store(&mut self, uid: u32, op: FlagOp) -> Result<(), ScanError>;

    async fn close(&mut self) -> Result<(), ScanError>;
}
