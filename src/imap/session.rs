use super::{AuthState, FlagOp, ImapConnector, ImapTransport, HEADER_FIELDS};
use crate::credential::Password;
use crate::error::ScanError;
use crate::model::ServerAddress;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Lifecycle of one mailbox session. A session that does not exist yet is
/// disconnected; `connect` only ever hands out a `Connected` one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticated,
    FolderSelected,
    Closed,
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Connected => "connected",
            SessionState::Authenticated => "authenticated",
            SessionState::FolderSelected => "folder selected",
            SessionState::Closed => "closed",
        }
    }
}

/// One live connection to one mailbox, refusing commands that are not valid
/// in its current state. Every command is bounded by the timeout the session
/// was opened with.
pub struct MailboxSession {
    address: String,
    transport: Box<dyn ImapTransport>,
    state: SessionState,
    timeout: Duration,
}

async fn bounded<T>(
    timeout: Duration,
    command: impl Future<Output = Result<T, ScanError>>,
) -> Result<T, ScanError> {
    async_std::future::timeout(timeout, command)
        .await
        .map_err(|_| ScanError::CommandTimeout(timeout.as_secs()))?
}

impl fmt::Debug for MailboxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSession")
            .field("address", &self.address)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MailboxSession {
    /// Opens a connection and waits for the greeting, giving up after
    /// `timeout`.
    pub async fn connect(
        connector: &dyn ImapConnector,
        address: &str,
        server: &ServerAddress,
        timeout: Duration,
    ) -> Result<Self, ScanError> {
        tracing::debug!("Connecting to {}:{} for {}", server.host, server.port, address);
        let transport = async_std::future::timeout(timeout, connector.connect(server))
            .await
            .map_err(|_| ScanError::ConnectTimeout(timeout.as_secs()))??;

        Ok(Self {
            address: address.to_string(),
            transport,
            state: SessionState::Connected,
            timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn require(&self, expected: SessionState) -> Result<(), ScanError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ScanError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    /// Logs in. A server that answers but does not grant access yields
    /// `SoftAuthFailure`; the session then stays `Connected`.
    pub async fn authenticate(&mut self, password: &Password) -> Result<(), ScanError> {
        self.require(SessionState::Connected)?;
        match bounded(self.timeout, self.transport.login(&self.address, password.expose())).await? {
            AuthState::Authenticated => {
                self.state = SessionState::Authenticated;
                Ok(())
            }
            AuthState::Rejected(reason) => Err(ScanError::SoftAuthFailure(reason)),
        }
    }

    pub async fn select_folder(&mut self, folder: &str) -> Result<(), ScanError> {
        self.require(SessionState::Authenticated)?;
        bounded(self.timeout, self.transport.select(folder)).await?;
        self.state = SessionState::FolderSelected;
        Ok(())
    }

    pub async fn fetch_header_lines(&mut self) -> Result<Vec<Vec<u8>>, ScanError> {
        self.require(SessionState::FolderSelected)?;
        bounded(self.timeout, self.transport.fetch_header_lines(&HEADER_FIELDS)).await
    }

    pub async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>, ScanError> {
        self.require(SessionState::FolderSelected)?;
        bounded(self.timeout, self.transport.fetch_message(uid)).await
    }

    pub async fn store(&mut self, uid: u32, op: FlagOp) -> Result<(), ScanError> {
        self.require(SessionState::FolderSelected)?;
        bounded(self.timeout, self.transport.store(uid, op)).await
    }

    /// Closes the folder and logs out. The session is `Closed` afterwards
    /// even if the server complained.
    pub async fn close(&mut self) -> Result<(), ScanError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        bounded(self.timeout, self.transport.close()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, FakeConnector, FakeMailbox, ImapEvent};

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn server() -> ServerAddress {
        ServerAddress {
            host: "imap.example.com".into(),
            port: 993,
        }
    }

    #[tokio::test]
    async fn walks_through_the_session_states() {
        let connector = FakeConnector::new().with_mailbox("imap.example.com", FakeMailbox::default());
        let mut session = MailboxSession::connect(&connector, "me@example.com", &server(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        session.authenticate(&Password::new("pw")).await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);

        session.select_folder("INBOX").await.unwrap();
        assert_eq!(session.state(), SessionState::FolderSelected);

        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(connector
            .timeline()
            .contains(&Event::imap("imap.example.com", ImapEvent::Select("INBOX".into()))));
    }

    #[tokio::test]
    async fn store_before_select_is_refused() {
        let connector = FakeConnector::new().with_mailbox("imap.example.com", FakeMailbox::default());
        let mut session = MailboxSession::connect(&connector, "me@example.com", &server(), TIMEOUT)
            .await
            .unwrap();
        session.authenticate(&Password::new("pw")).await.unwrap();

        let err = session.store(1, FlagOp::MarkSeen).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidState { .. }));
        assert!(connector.stores().is_empty());
    }

    #[tokio::test]
    async fn hanging_connect_is_bounded_by_timeout() {
        let connector = FakeConnector::new()
            .with_mailbox("imap.example.com", FakeMailbox::default().hanging());
        let err = MailboxSession::connect(&connector, "me@example.com", &server(), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ConnectTimeout(_)));
    }

    #[tokio::test]
    async fn stalled_login_is_bounded_by_timeout() {
        let connector = FakeConnector::new()
            .with_mailbox("imap.example.com", FakeMailbox::default().stalling_login());
        let mut session = MailboxSession::connect(&connector, "me@example.com", &server(), TIMEOUT)
            .await
            .unwrap();

        let err = session.authenticate(&Password::new("pw")).await.unwrap_err();
        assert!(matches!(err, ScanError::CommandTimeout(_)), "{err:?}");
        assert_eq!(err.reason(), "timeout");
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn rejected_login_is_a_soft_auth_failure() {
        let connector = FakeConnector::new()
            .with_mailbox("imap.example.com", FakeMailbox::default().rejecting_login());
        let mut session = MailboxSession::connect(&connector, "me@example.com", &server(), TIMEOUT)
            .await
            .unwrap();

        let err = session.authenticate(&Password::new("old")).await.unwrap_err();
        assert!(matches!(err, ScanError::SoftAuthFailure(_)));
        assert_eq!(session.state(), SessionState::Connected);
    }
}
