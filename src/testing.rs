//! In-memory IMAP server, renderer and sink for exercising a whole scan.

use crate::error::ScanError;
use crate::imap::{AuthState, FlagOp, ImapConnector, ImapTransport};
use crate::model::{RecipientId, ServerAddress};
use crate::render::Renderer;
use crate::sink::DeliverySink;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImapEvent {
    Login(String),
    Select(String),
    FetchHeaders,
    FetchMessage(u32),
    Store(u32, FlagOp),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Imap { host: String, event: ImapEvent },
    Image(RecipientId),
    Warning(RecipientId, String),
}

impl Event {
    pub fn imap(host: &str, event: ImapEvent) -> Self {
        Event::Imap {
            host: host.to_string(),
            event,
        }
    }
}

/// Everything the fakes did, in order.
#[derive(Debug, Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<Event>>>);

impl Timeline {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ConnectBehavior {
    #[default]
    Accept,
    Hang,
    Refuse,
}

#[derive(Debug, Clone, Default)]
pub struct FakeMailbox {
    connect: ConnectBehavior,
    reject_login: bool,
    stall_login: bool,
    fail_mark: bool,
    header_lines: Vec<Vec<u8>>,
    messages: HashMap<u32, Vec<u8>>,
}

impl FakeMailbox {
    pub fn hanging(mut self) -> Self {
        self.connect = ConnectBehavior::Hang;
        self
    }

    pub fn refusing(mut self) -> Self {
        self.connect = ConnectBehavior::Refuse;
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Greets, then never answers LOGIN.
    pub fn stalling_login(mut self) -> Self {
        self.stall_login = true;
        self
    }

    pub fn failing_mark(mut self) -> Self {
        self.fail_mark = true;
        self
    }

    /// Adds a message with the given flags; its header shows up in the bulk
    /// fetch and its source is served by UID.
    pub fn with_message(mut self, uid: u32, flags: &str, from: &str, date: &str, html: &str) -> Self {
        let header = format!("From: {from}\r\nTo: me@example.com\r\nDate: {date}\r\n\r\n");
        self.header_lines.push(
            format!(
                "{uid} FETCH (UID {uid} FLAGS ({flags}) BODY[HEADER.FIELDS (From To Date)] {{{}}}",
                header.len()
            )
            .into_bytes(),
        );
        self.header_lines.push(header.clone().into_bytes());
        self.header_lines.push(b")".to_vec());

        let raw = format!(
            "From: {from}\r\nTo: me@example.com\r\nDate: {date}\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{html}"
        );
        self.messages.insert(uid, raw.into_bytes());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    mailboxes: HashMap<String, FakeMailbox>,
    timeline: Timeline,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn with_mailbox(mut self, host: &str, mailbox: FakeMailbox) -> Self {
        self.mailboxes.insert(host.to_string(), mailbox);
        self
    }

    pub fn timeline(&self) -> Vec<Event> {
        self.timeline.events()
    }

    pub fn stores(&self) -> Vec<(u32, FlagOp)> {
        self.timeline
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Imap {
                    event: ImapEvent::Store(uid, op),
                    ..
                } => Some((uid, op)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ImapConnector for FakeConnector {
    async fn connect(&self, server: &ServerAddress) -> Result<Box<dyn ImapTransport>, ScanError> {
        let mailbox = self
            .mailboxes
            .get(&server.host)
            .cloned()
            .ok_or_else(|| ScanError::Connection(format!("unknown host {}", server.host)))?;
        match mailbox.connect {
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::Refuse => Err(ScanError::Connection("connection refused".into())),
            ConnectBehavior::Accept => Ok(Box::new(FakeTransport {
                host: server.host.clone(),
                mailbox,
                timeline: self.timeline.clone(),
            })),
        }
    }
}

struct FakeTransport {
    host: String,
    mailbox: FakeMailbox,
    timeline: Timeline,
}

impl FakeTransport {
    fn log(&self, event: ImapEvent) {
        self.timeline.push(Event::imap(&self.host, event));
    }
}

#[async_trait]
impl ImapTransport for FakeTransport {
    async fn login(&mut self, user: &str, _password: &str) -> Result<AuthState, ScanError> {
        self.log(ImapEvent::Login(user.to_string()));
        if self.mailbox.stall_login {
            std::future::pending::<()>().await;
        }
        if self.mailbox.reject_login {
            Ok(AuthState::Rejected("[AUTHENTICATIONFAILED] Invalid credentials".into()))
        } else {
            Ok(AuthState::Authenticated)
        }
    }

    async fn select(&mut self, folder: &str) -> Result<(), ScanError> {
        self.log(ImapEvent::Select(folder.to_string()));
        Ok(())
    }

    async fn fetch_header_lines(&mut self, _fields: &[&str]) -> Result<Vec<Vec<u8>>, ScanError> {
        self.log(ImapEvent::FetchHeaders);
        Ok(self.mailbox.header_lines.clone())
    }

    async fn fetch_message(&mut self, uid: u32) -> Result<Vec<u8>, ScanError> {
        self.log(ImapEvent::FetchMessage(uid));
        self.mailbox
            .messages
            .get(&uid)
            .cloned()
            .ok_or_else(|| ScanError::Imap(format!("no message {uid}")))
    }

    async fn store(&mut self, uid: u32, op: FlagOp) -> Result<(), ScanError> {
        if self.mailbox.fail_mark && op == FlagOp::MarkSeen {
            return Err(ScanError::Imap("STORE failed".into()));
        }
        self.log(ImapEvent::Store(uid, op));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScanError> {
        self.log(ImapEvent::Close);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecordingSink {
    timeline: Timeline,
    accept_images: bool,
}

impl RecordingSink {
    pub fn new(timeline: Timeline, accept_images: bool) -> Self {
        Self {
            timeline,
            accept_images,
        }
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send_image(&self, recipient: RecipientId, _image: Vec<u8>) -> bool {
        self.timeline.push(Event::Image(recipient));
        self.accept_images
    }

    async fn send_warning(&self, recipient: RecipientId, text: &str) -> bool {
        self.timeline.push(Event::Warning(recipient, text.to_string()));
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeRenderer {
    fail: bool,
    delay: Duration,
}

impl FakeRenderer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { fail: false, delay }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, ScanError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(ScanError::Render("renderer crashed".into()));
        }
        let mut image = b"\x89PNG\r\n".to_vec();
        image.extend_from_slice(html.as_bytes());
        Ok(image)
    }
}
