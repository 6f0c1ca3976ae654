use super::{AuthState, FlagOp, ImapConnector, ImapTransport};
use crate::error::ScanError;
use crate::model::ServerAddress;
use async_imap::types::{Fetch, Flag};
use async_trait::async_trait;
use futures::StreamExt;
use std::borrow::Cow;
use std::fmt;

type TlsStream = async_native_tls::TlsStream<async_std::net::TcpStream>;

/// Implicit-TLS IMAP over `async-imap`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncImapConnector;

#[async_trait]
impl ImapConnector for AsyncImapConnector {
    async fn connect(&self, server: &ServerAddress) -> Result<Box<dyn ImapTransport>, ScanError> {
        let tls = async_native_tls::TlsConnector::new();
        let tcp = async_std::net::TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(|e| ScanError::Connection(e.to_string()))?;

        let tls_stream = tls
            .connect(server.host.as_str(), tcp)
            .await
            .map_err(|e| ScanError::Tls(e.to_string()))?;

        let mut client = async_imap::Client::new(tls_stream);
        client
            .read_response()
            .await
            .ok_or_else(|| ScanError::Connection("server sent no greeting".to_string()))??;

        Ok(Box::new(AsyncImapTransport {
            inner: Inner::Client(client),
        }))
    }
}

enum Inner {
    Client(async_imap::Client<TlsStream>),
    Session(async_imap::Session<TlsStream>),
    Gone,
}

pub struct AsyncImapTransport {
    inner: Inner,
}

impl fmt::Debug for AsyncImapTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner {
            Inner::Client(_) => "client",
            Inner::Session(_) => "session",
            Inner::Gone => "gone",
        };
        f.debug_struct("AsyncImapTransport").field("inner", &state).finish()
    }
}

impl AsyncImapTransport {
    fn session(&mut self) -> Result<&mut async_imap::Session<TlsStream>, ScanError> {
        match &mut self.inner {
            Inner::Session(session) => Ok(session),
            _ => Err(ScanError::Imap("not logged in".to_string())),
        }
    }
}

#[async_trait]
impl ImapTransport for AsyncImapTransport {
    async fn login(&mut self, user: &str, password: &str) -> Result<AuthState, ScanError> {
        let Inner::Client(client) = std::mem::replace(&mut self.inner, Inner::Gone) else {
            return Err(ScanError::Imap("login on a used connection".to_string()));
        };

        match client.login(user, password).await {
            Ok(session) => {
                self.inner = Inner::Session(session);
                Ok(AuthState::Authenticated)
            }
            Err((async_imap::error::Error::No(msg) | async_imap::error::Error::Bad(msg), client)) => {
                self.inner = Inner::Client(client);
                Ok(AuthState::Rejected(msg))
            }
            Err((e, _)) => Err(e.into()),
        }
    }

    async fn select(&mut self, folder: &str) -> Result<(), ScanError> {
        self.session()?.select(folder).await?;
        Ok(())
    }

    async fn fetch_header_lines(&mut self, fields: &[&str]) -> Result<Vec<Vec<u8>>, ScanError> {
        let field_list = fields.join(" ");
        let query = format!("(UID FLAGS BODY.PEEK[HEADER.FIELDS ({field_list})])");
        let fetches: Vec<_> = self
            .session()?
            .uid_fetch("1:*", &query)
            .await?
            .collect::<Vec<_>>()
            .await;

        let mut lines = Vec::with_capacity(fetches.len() * 3);
        for fetch_result in fetches {
            match fetch_result {
                Ok(fetch) => lines.extend(fetch_lines(&fetch, &field_list)),
                Err(e) => tracing::warn!("Header fetch error: {}", e),
            }
        }
        Ok(lines)
    }

    async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>, ScanError> {
        let fetches: Vec<_> = self
            .session()?
            .uid_fetch(uid.to_string(), "BODY.PEEK[]")
            .await?
            .collect::<Vec<_>>()
            .await;

        for fetch in fetches {
            if let Some(body) = fetch?.body() {
                return Ok(body.to_vec());
            }
        }
        Err(ScanError::Imap(format!("message {uid} has no body")))
    }

    async fn store(&mut self, uid: u32, op: FlagOp) -> Result<(), ScanError> {
        let updates: Vec<_> = self
            .session()?
            .uid_store(uid.to_string(), op.store_query())
            .await?
            .collect::<Vec<_>>()
            .await;
        for update in updates {
            update?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScanError> {
        match std::mem::replace(&mut self.inner, Inner::Gone) {
            Inner::Session(mut session) => {
                session.close().await?;
                if let Err(e) = session.logout().await {
                    tracing::warn!("Failed to logout after close: {}", e);
                }
                Ok(())
            }
            Inner::Client(_) | Inner::Gone => Ok(()),
        }
    }
}

/// Lays one parsed FETCH item out the way it travels on the wire: the status
/// line announcing the header literal, the literal itself, and the closing
/// parenthesis.
fn fetch_lines(fetch: &Fetch, field_list: &str) -> Vec<Vec<u8>> {
    let Some(uid) = fetch.uid else {
        tracing::warn!("FETCH response {} carries no UID", fetch.message);
        return Vec::new();
    };
    let flags = fetch
        .flags()
        .map(|f| flag_token(&f).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let header = fetch.header().unwrap_or_default();

    let status = format!(
        "{} FETCH (UID {} FLAGS ({}) BODY[HEADER.FIELDS ({})] {{{}}}",
        fetch.message,
        uid,
        flags,
        field_list,
        header.len()
    );
    vec![status.into_bytes(), header.to_vec(), b")".to_vec()]
}

fn flag_token<'a>(flag: &'a Flag<'_>) -> Cow<'a, str> {
    match flag {
        Flag::Seen => Cow::Borrowed("\\Seen"),
        Flag::Answered => Cow::Borrowed("\\Answered"),
        Flag::Flagged => Cow::Borrowed("\\Flagged"),
        Flag::Deleted => Cow::Borrowed("\\Deleted"),
        Flag::Draft => Cow::Borrowed("\\Draft"),
        Flag::Recent => Cow::Borrowed("\\Recent"),
        Flag::MayCreate => Cow::Borrowed("\\*"),
        Flag::Custom(name) => Cow::Borrowed(name.as_ref()),
        #[allow(unreachable_patterns)]
        other => Cow::Owned(format!("{other:?}")),
    }
}
