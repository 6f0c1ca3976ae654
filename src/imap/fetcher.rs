use super::{FlagOp, MailboxSession};
use crate::delivery::RenderQueue;
use crate::error::ScanError;
use crate::model::{Candidate, RenderJob};
use mailparse::{DispositionType, ParsedMail};
use tokio::sync::Mutex;

/// Depth-first walk over a MIME tree, the root included.
fn walk<'a, 'b>(part: &'b ParsedMail<'a>, out: &mut Vec<&'b ParsedMail<'a>>) {
    out.push(part);
    for sub in &part.subparts {
        walk(sub, out);
    }
}

fn has_filename(part: &ParsedMail<'_>) -> bool {
    let disposition = part.get_content_disposition();
    disposition.disposition == DispositionType::Attachment
        || disposition.params.contains_key("filename")
        || part.ctype.params.contains_key("name")
}

/// Body of the first inline text/plain or text/html part, decoded. Empty
/// when the message has none.
pub fn extract_body(raw: &[u8]) -> Result<String, ScanError> {
    let mail = mailparse::parse_mail(raw).map_err(|e| ScanError::Parse(e.to_string()))?;
    let mut parts = Vec::new();
    walk(&mail, &mut parts);

    let Some(part) = parts.into_iter().find(|p| {
        let mime = p.ctype.mimetype.to_ascii_lowercase();
        (mime == "text/plain" || mime == "text/html") && !has_filename(p)
    }) else {
        return Ok(String::new());
    };
    part.get_body().map_err(|e| ScanError::Parse(e.to_string()))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Prepends the sender/recipient banner to the message body.
pub fn compose_page(sender: &str, to_address: &str, body: &str) -> String {
    format!(
        "<strong>From: {}</strong><br><strong>To: {}</strong><br>{}",
        escape(sender),
        escape(to_address),
        body
    )
}

/// Downloads one qualifying message, hands its page to the render queue and
/// marks it `\Seen` before the render outcome is known. The queued job only
/// delivers once the mark has been confirmed.
pub async fn fetch_and_mark(
    session: &Mutex<MailboxSession>,
    candidate: &Candidate,
    to_address: &str,
    queue: &mut RenderQueue,
) -> Result<(), ScanError> {
    let mut session = session.lock().await;
    let raw = session.fetch_message(candidate.uid).await?;
    let body = match extract_body(&raw) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Message {} in {} has an unreadable body: {}", candidate.uid, to_address, e);
            String::new()
        }
    };

    let ticket = queue.enqueue(RenderJob {
        uid: candidate.uid,
        html_content: compose_page(&candidate.sender, to_address, &body),
        target_folder_name: to_address.to_string(),
    });

    let marked = session.store(candidate.uid, FlagOp::MarkSeen).await;
    ticket.confirm(marked.is_ok());
    marked
}
