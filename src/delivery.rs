//! Rendering and delivery of queued messages, with the compensating flag
//! update for deliveries that did not go through.
//!
//! A message is marked `\Seen` right after it is fetched. Its render task may
//! start before that STORE completes, but it only delivers once the mark is
//! confirmed. When sending then fails the mark is undone and the recipient
//! is warned, so every message ends up either delivered or unseen again.
//! Saving to disk never undoes the mark.

use crate::error::ScanError;
use crate::imap::{FlagOp, MailboxSession};
use crate::model::{RecipientId, RenderJob};
use crate::render::Renderer;
use crate::sink::DeliverySink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

pub const DELIVERY_FAILURE_TEXT: &str =
    "A screenshot of a new message could not be delivered. The message may be too large; please check the mailbox directly.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Send each screenshot through the delivery sink.
    Send,
    /// Write screenshots to `<root>/<mailbox address>/<uuid>.png`.
    SaveToDisk { root: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Saved,
    /// Delivery failed and the message was marked unseen again.
    Reverted,
    /// The `\Seen` mark never landed, so nothing was delivered.
    Dropped,
    /// Save mode could not write the screenshot. The message stays seen.
    Unsaved,
}

/// What every render task of one scan shares.
pub struct DeliveryContext {
    pub renderer: Arc<dyn Renderer>,
    pub sink: Arc<dyn DeliverySink>,
    pub recipient: RecipientId,
    pub mode: DeliveryMode,
    pub render_timeout: Duration,
}

impl std::fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryContext")
            .field("recipient", &self.recipient)
            .field("mode", &self.mode)
            .field("render_timeout", &self.render_timeout)
            .finish_non_exhaustive()
    }
}

/// Confirms (or not) that the `\Seen` mark for a queued job was stored.
#[derive(Debug)]
pub struct MarkTicket(oneshot::Sender<bool>);

impl MarkTicket {
    pub fn confirm(self, marked: bool) {
        // The task only goes away early if it panicked.
        let _ = self.0.send(marked);
    }
}

/// Render tasks of one mailbox. `join` must complete before the mailbox
/// session is closed, since the tasks issue STOREs on it.
#[derive(Debug)]
pub struct RenderQueue {
    ctx: Arc<DeliveryContext>,
    session: Arc<Mutex<MailboxSession>>,
    pending: Vec<JoinHandle<DeliveryOutcome>>,
}

impl RenderQueue {
    pub fn new(ctx: Arc<DeliveryContext>, session: Arc<Mutex<MailboxSession>>) -> Self {
        Self {
            ctx,
            session,
            pending: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, job: RenderJob) -> MarkTicket {
        let (tx, rx) = oneshot::channel();
        let ctx = self.ctx.clone();
        let session = self.session.clone();
        self.pending
            .push(tokio::spawn(process_job(ctx, session, job, rx)));
        MarkTicket(tx)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Waits for every queued job.
    pub async fn join(self) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        for handle in self.pending {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::error!("Render task panicked: {}", e),
            }
        }
        outcomes
    }
}

async fn render(ctx: &DeliveryContext, html: &str) -> Result<Vec<u8>, ScanError> {
    match tokio::time::timeout(ctx.render_timeout, ctx.renderer.render(html)).await {
        Ok(image) => image,
        Err(_) => Err(ScanError::Render(format!(
            "timed out after {}s",
            ctx.render_timeout.as_secs()
        ))),
    }
}

pub async fn save_image(root: &Path, folder: &str, image: &[u8]) -> Result<PathBuf, ScanError> {
    let dir = root.join(folder);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("{}.png", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, image).await?;
    Ok(path)
}

async fn process_job(
    ctx: Arc<DeliveryContext>,
    session: Arc<Mutex<MailboxSession>>,
    job: RenderJob,
    marked: oneshot::Receiver<bool>,
) -> DeliveryOutcome {
    let rendered = render(&ctx, &job.html_content).await;

    if !matches!(marked.await, Ok(true)) {
        tracing::warn!(
            "Message {} in {} was not marked seen, leaving it for the next scan",
            job.uid,
            job.target_folder_name
        );
        return DeliveryOutcome::Dropped;
    }

    let delivered = match (&ctx.mode, rendered) {
        (DeliveryMode::SaveToDisk { root }, rendered) => {
            let saved = match rendered {
                Ok(image) => save_image(root, &job.target_folder_name, &image).await,
                Err(e) => Err(e),
            };
            return match saved {
                Ok(path) => {
                    tracing::info!("Saved screenshot of message {} to {}", job.uid, path.display());
                    DeliveryOutcome::Saved
                }
                Err(e) => {
                    tracing::error!("Failed to save screenshot of message {}: {}", job.uid, e);
                    DeliveryOutcome::Unsaved
                }
            };
        }
        (DeliveryMode::Send, Ok(image)) => ctx.sink.send_image(ctx.recipient, image).await,
        (DeliveryMode::Send, Err(e)) => {
            tracing::error!(
                "Failed to render message {} in {}: {}",
                job.uid,
                job.target_folder_name,
                e
            );
            false
        }
    };

    if delivered {
        tracing::info!("Delivered message {} from {}", job.uid, job.target_folder_name);
        return DeliveryOutcome::Delivered;
    }

    if let Err(e) = session.lock().await.store(job.uid, FlagOp::UnmarkSeen).await {
        tracing::error!(
            "Failed to mark message {} in {} unseen again: {}",
            job.uid,
            job.target_folder_name,
            e
        );
    }
    ctx.sink.send_warning(ctx.recipient, DELIVERY_FAILURE_TEXT).await;
    DeliveryOutcome::Reverted
}
