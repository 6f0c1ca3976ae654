pub mod telegram;

use crate::model::RecipientId;
use async_trait::async_trait;

pub use telegram::TelegramSink;

/// Notification channel screenshots and warnings are delivered through.
/// Implementations never fail loudly: transport faults are logged by the
/// sink and reported as `false`.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send_image(&self, recipient: RecipientId, image: Vec<u8>) -> bool;

    async fn send_warning(&self, recipient: RecipientId, text: &str) -> bool;
}
