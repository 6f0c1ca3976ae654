use crate::credential::{Base64Codec, CredentialCodec};
use crate::delivery::{DeliveryContext, DeliveryMode, DeliveryOutcome, RenderQueue};
use crate::error::ScanError;
use crate::imap::{fetcher, scanner, AsyncImapConnector, ImapConnector, MailboxSession, INBOX};
use crate::model::{MailboxCredential, RecipientId, ScanErrorLog};
use crate::render::{ChromiumRenderer, Renderer};
use crate::sink::DeliverySink;
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);

pub fn password_changed_warning(address: &str) -> String {
    format!("Mailbox {address} is unreachable. The password may have changed.")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Bounds the connect and every IMAP command after it.
    pub connect_timeout: Duration,
    pub render_timeout: Duration,
    pub mode: DeliveryMode,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            mode: DeliveryMode::Send,
        }
    }
}

/// Collaborators of a scan. Only the delivery sink has no default.
#[derive(Default)]
pub struct OrchestratorBuilder {
    recipient: RecipientId,
    options: ScanOptions,
    sink: Option<Arc<dyn DeliverySink>>,
    connector: Option<Arc<dyn ImapConnector>>,
    codec: Option<Arc<dyn CredentialCodec>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("recipient", &self.recipient)
            .field("options", &self.options)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn recipient(mut self, recipient: RecipientId) -> Self {
        self.recipient = recipient;
        self
    }

    #[must_use]
    pub fn options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn ImapConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn CredentialCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> Result<ScanOrchestrator, ScanError> {
        let sink = self
            .sink
            .ok_or_else(|| ScanError::Config("no delivery sink configured".to_string()))?;
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(ChromiumRenderer::new()));

        Ok(ScanOrchestrator {
            connect_timeout: self.options.connect_timeout,
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(AsyncImapConnector)),
            codec: self.codec.unwrap_or_else(|| Arc::new(Base64Codec)),
            delivery: Arc::new(DeliveryContext {
                renderer,
                sink,
                recipient: self.recipient,
                mode: self.options.mode,
                render_timeout: self.options.render_timeout,
            }),
        })
    }
}

/// Scans a recipient's tracked mailboxes and delivers new mail from tracked
/// senders as screenshots.
pub struct ScanOrchestrator {
    connect_timeout: Duration,
    connector: Arc<dyn ImapConnector>,
    codec: Arc<dyn CredentialCodec>,
    delivery: Arc<DeliveryContext>,
}

impl std::fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("connect_timeout", &self.connect_timeout)
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

impl ScanOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Blocking entry point for the scheduler. Must not be called from inside
    /// an async runtime; use [`ScanOrchestrator::scan`] there.
    pub fn run(
        &self,
        mailboxes: &[MailboxCredential],
        tracked_senders: &[String],
        cutoff: NaiveDateTime,
    ) -> Result<ScanErrorLog, ScanError> {
        let rt = tokio::runtime::Runtime::new()?;
        Ok(rt.block_on(async {
            let errors = self.scan(mailboxes, tracked_senders, cutoff).await;
            self.delivery.renderer.shutdown().await;
            errors
        }))
    }

    /// Scans every mailbox in turn. Per-mailbox failures end up in the
    /// returned log or as a warning to the recipient, never as an error.
    pub async fn scan(
        &self,
        mailboxes: &[MailboxCredential],
        tracked_senders: &[String],
        cutoff: NaiveDateTime,
    ) -> ScanErrorLog {
        let mut errors = ScanErrorLog::default();
        if mailboxes.is_empty() || tracked_senders.is_empty() {
            tracing::info!(
                "Nothing to scan: {} mailboxes, {} tracked senders",
                mailboxes.len(),
                tracked_senders.len()
            );
            return errors;
        }

        for mailbox in mailboxes {
            match self.scan_mailbox(mailbox, tracked_senders, cutoff).await {
                Ok(outcomes) => {
                    let delivered = outcomes
                        .iter()
                        .filter(|o| matches!(o, DeliveryOutcome::Delivered | DeliveryOutcome::Saved))
                        .count();
                    tracing::info!(
                        "Scanned {}: {} new messages, {} delivered",
                        mailbox.address,
                        outcomes.len(),
                        delivered
                    );
                }
                Err(ScanError::SoftAuthFailure(reason)) => {
                    tracing::warn!("Login to {} rejected: {}", mailbox.address, reason);
                    self.delivery
                        .sink
                        .send_warning(
                            self.delivery.recipient,
                            &password_changed_warning(&mailbox.address),
                        )
                        .await;
                }
                Err(e @ (ScanError::ConnectTimeout(_) | ScanError::CommandTimeout(_))) => {
                    tracing::warn!("Timeout talking to {}: {}", mailbox.server.host, e);
                    errors.record(e.reason(), &mailbox.address);
                }
                Err(e) => {
                    tracing::error!("Skipping mailbox {}: {}", mailbox.address, e);
                    errors.record(e.reason(), &mailbox.address);
                }
            }
        }
        errors
    }

    async fn scan_mailbox(
        &self,
        mailbox: &MailboxCredential,
        tracked_senders: &[String],
        cutoff: NaiveDateTime,
    ) -> Result<Vec<DeliveryOutcome>, ScanError> {
        let mut session = MailboxSession::connect(
            self.connector.as_ref(),
            &mailbox.address,
            &mailbox.server,
            self.connect_timeout,
        )
        .await?;
        {
            let password = self.codec.decrypt(&mailbox.secret)?;
            session.authenticate(&password).await?;
        }
        session.select_folder(INBOX).await?;

        let candidates =
            scanner::fetch_unseen_candidates(&mut session, tracked_senders, cutoff).await?;

        let session = Arc::new(Mutex::new(session));
        let mut queue = RenderQueue::new(self.delivery.clone(), session.clone());
        for candidate in candidates {
            if let Err(e) =
                fetcher::fetch_and_mark(&session, &candidate, &mailbox.address, &mut queue).await
            {
                tracing::warn!(
                    "Failed to process message {} in {}: {}",
                    candidate.uid, mailbox.address, e
                );
            }
        }

        let outcomes = queue.join().await;
        if let Err(e) = session.lock().await.close().await {
            tracing::warn!("Failed to close session for {}: {}", mailbox.address, e);
        }
        Ok(outcomes)
    }

    /// Whether the stored credential still opens the mailbox.
    pub async fn check_mailbox(&self, mailbox: &MailboxCredential) -> bool {
        let result = async {
            let password = self.codec.decrypt(&mailbox.secret)?;
            let mut session = MailboxSession::connect(
                self.connector.as_ref(),
                &mailbox.address,
                &mailbox.server,
                self.connect_timeout,
            )
            .await?;
            session.authenticate(&password).await?;
            session.close().await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::info!("Mailbox {} failed validation: {}", mailbox.address, e);
                false
            }
        }
    }
}
