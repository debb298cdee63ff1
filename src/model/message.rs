//! The raw message handed to the core by the mail-retrieval layer.

use chrono::{DateTime, Utc};

use super::address::EmailAddress;

/// A retrieved email message.
///
/// Read-only once built. Every core operation takes it by reference.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawMessage {
    /// Stable identifier (the `Message-ID`, or a synthesized one).
    pub id: String,

    /// Sender (`From:` header).
    pub sender: EmailAddress,

    /// Decoded subject line (may be empty).
    pub subject: String,

    /// Plain-text body (from the `text/plain` part), if present.
    pub text_body: Option<String>,

    /// HTML body (from the `text/html` part), if present.
    pub html_body: Option<String>,

    /// When the message was received (`Date:` header; Unix epoch if unknown).
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// Build a message with only an id, sender and subject. Bodies are attached
    /// with [`RawMessage::with_text`] and [`RawMessage::with_html`].
    pub fn new(id: impl Into<String>, sender: &str, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: EmailAddress::parse(sender),
            subject: subject.into(),
            text_body: None,
            html_body: None,
            received_at: DateTime::UNIX_EPOCH,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Non-empty plain-text body.
    pub fn text(&self) -> Option<&str> {
        self.text_body.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Non-empty HTML body.
    pub fn html(&self) -> Option<&str> {
        self.html_body.as_deref().filter(|h| !h.trim().is_empty())
    }

    /// `true` when the message has neither a subject nor any body.
    pub fn is_blank(&self) -> bool {
        self.subject.trim().is_empty() && self.text().is_none() && self.html().is_none()
    }
}
