use super::DeliverySink;
use crate::model::RecipientId;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;

const API_BASE: &str = "https://api.telegram.org";
const SCREENSHOT_FILENAME: &str = "mail_screenshot.png";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: RecipientId,
    text: &'a str,
}

/// Delivers through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramSink {
    token: String,
    api_base: String,
    http_client: Client,
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramSink {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: API_BASE.to_string(),
            http_client: Client::new(),
        }
    }

    /// Points the sink at another Bot API server.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base.trim_end_matches('/'),
            self.token,
            method
        )
    }

    async fn post_document(&self, recipient: RecipientId, image: Vec<u8>) -> Result<(), reqwest::Error> {
        let document = Part::bytes(image)
            .file_name(SCREENSHOT_FILENAME)
            .mime_str("image/png")?;
        let form = Form::new()
            .text("chat_id", recipient.to_string())
            .part("document", document);
        self.http_client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn post_message(&self, recipient: RecipientId, text: &str) -> Result<(), reqwest::Error> {
        self.http_client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id: recipient,
                text,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    async fn send_image(&self, recipient: RecipientId, image: Vec<u8>) -> bool {
        match self.post_document(recipient, image).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to send screenshot to {}: {}", recipient, e.without_url());
                false
            }
        }
    }

    async fn send_warning(&self, recipient: RecipientId, text: &str) -> bool {
        match self.post_message(recipient, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to send warning to {}: {}", recipient, e.without_url());
                false
            }
        }
    }
}
