use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Connection timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("IMAP command timed out after {0}s")]
    CommandTimeout(u64),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication rejected: {0}")]
    SoftAuthFailure(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not decrypt stored secret: {0}")]
    Decrypt(String),

    #[error("Session is {actual}, operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Key under which a mailbox that failed with this error is recorded in
    /// the scan error log.
    pub fn reason(&self) -> &'static str {
        match self {
            ScanError::ConnectTimeout(_) | ScanError::CommandTimeout(_) => "timeout",
            ScanError::Connection(_) | ScanError::Tls(_) | ScanError::Io(_) => "connection",
            ScanError::SoftAuthFailure(_) => "auth",
            ScanError::Decrypt(_) => "decrypt",
            ScanError::Imap(_) | ScanError::InvalidState { .. } => "imap",
            ScanError::Parse(_) => "parse",
            ScanError::Render(_) => "render",
            ScanError::Delivery(_) => "delivery",
            ScanError::Config(_) => "config",
        }
    }
}

impl From<async_imap::error::Error> for ScanError {
    fn from(e: async_imap::error::Error) -> Self {
        ScanError::Imap(e.to_string())
    }
}

impl From<async_native_tls::Error> for ScanError {
    fn from(e: async_native_tls::Error) -> Self {
        ScanError::Tls(e.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScanError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ScanError::Render(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_logged_under_timeout_key() {
        assert_eq!(ScanError::ConnectTimeout(10).reason(), "timeout");
        assert_eq!(ScanError::CommandTimeout(10).reason(), "timeout");
    }

    #[test]
    fn transport_failures_share_connection_key() {
        assert_eq!(ScanError::Tls("bad cert".into()).reason(), "connection");
        assert_eq!(ScanError::Connection("refused".into()).reason(), "connection");
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(ScanError::from(io).reason(), "connection");
    }

    #[test]
    fn invalid_state_message_names_both_states() {
        let err = ScanError::InvalidState {
            expected: "folder selected",
            actual: "authenticated",
        };
        assert_eq!(
            err.to_string(),
            "Session is authenticated, operation requires folder selected"
        );
    }
}
