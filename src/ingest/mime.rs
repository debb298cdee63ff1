//! MIME body extraction: raw message bytes → [`RawMessage`].

use chrono::DateTime;
use mail_parser::{MessageParser, PartType};
use tracing::warn;

use crate::ingest::header::{self, decode_text};
use crate::model::address::EmailAddress;
use crate::model::message::RawMessage;

/// Decode a raw RFC 5322 message (optionally prefixed with an MBOX `From `
/// line).
///
/// `fallback_id` is used when the message has no `Message-ID`. Messages
/// `mail-parser` rejects are decoded with the header fallback and their
/// body is kept as plain text.
pub fn decode_message(raw_message: &[u8], fallback_id: &str) -> RawMessage {
    let bytes = skip_from_line(raw_message);

    match MessageParser::default().parse(bytes) {
        Some(msg) => {
            let id = msg
                .message_id()
                .map(str::to_string)
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| fallback_id.to_string());

            let sender = msg
                .from()
                .and_then(|from| from.first())
                .map(|addr| EmailAddress {
                    display_name: addr.name().unwrap_or_default().to_string(),
                    address: addr.address().unwrap_or_default().to_string(),
                })
                .unwrap_or_default();

            let received_at = msg
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
                .unwrap_or(DateTime::UNIX_EPOCH);

            // mail-parser converts between text and HTML when a part is
            // missing; only keep parts that really have that type.
            let text_body = msg.text_part(0).and_then(|part| match &part.body {
                PartType::Text(text) => Some(text.to_string()),
                _ => None,
            });
            let html_body = msg.html_part(0).and_then(|part| match &part.body {
                PartType::Html(html) => Some(html.to_string()),
                _ => None,
            });

            RawMessage {
                id,
                sender,
                subject: msg.subject().unwrap_or_default().to_string(),
                text_body,
                html_body,
                received_at,
            }
        }
        None => {
            warn!(id = fallback_id, "mail-parser rejected message, using header fallback");
            let (head, body) = split_headers(bytes);
            let fields = header::parse_header_fields(head);
            let body = decode_text(body);
            RawMessage {
                id: fields.message_id.unwrap_or_else(|| fallback_id.to_string()),
                sender: fields.from,
                subject: fields.subject,
                text_body: Some(body).filter(|b| !b.trim().is_empty()),
                html_body: None,
                received_at: fields.date.unwrap_or(DateTime::UNIX_EPOCH),
            }
        }
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Split at the first blank line into `(headers, body)`.
fn split_headers(data: &[u8]) -> (&[u8], &[u8]) {
    let lf = data.windows(2).position(|w| w == b"\n\n").map(|p| (p, p + 2));
    let crlf = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, p + 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => {
            let (end, body) = if a.0 < b.0 { a } else { b };
            (&data[..end], &data[body..])
        }
        (Some((end, body)), None) | (None, Some((end, body))) => (&data[..end], &data[body..]),
        (None, None) => (data, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_from_line() {
        let data = b"From a@united.com Mon Oct 07 09:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
        let bare = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(bare), bare);
    }

    #[test]
    fn test_split_headers() {
        let (head, body) = split_headers(b"From: a@b.com\nSubject: Hi\n\nBody\n");
        assert_eq!(head, b"From: a@b.com\nSubject: Hi");
        assert_eq!(body, b"Body\n");

        let (head, body) = split_headers(b"Subject: Hi\r\n\r\nBody");
        assert_eq!(head, b"Subject: Hi");
        assert_eq!(body, b"Body");
    }

    #[test]
    fn test_decode_plain_message() {
        let raw = b"From notifications@united.com Mon Oct 07 09:00:00 2024\r\n\
Message-ID: <pnr-1@united.com>\r\n\
From: United Airlines <notifications@united.com>\r\n\
Subject: Your flight confirmation\r\n\
Date: Mon, 07 Oct 2024 09:00:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Confirmation number: ABC123\r\n";
        let msg = decode_message(raw, "offset:0");
        assert_eq!(msg.id, "pnr-1@united.com");
        assert_eq!(msg.sender.address, "notifications@united.com");
        assert_eq!(msg.sender.display_name, "United Airlines");
        assert_eq!(msg.subject, "Your flight confirmation");
        assert!(msg.text().unwrap_or_default().contains("ABC123"));
        assert!(msg.html().is_none());
        assert_eq!(msg.received_at.format("%Y-%m-%d").to_string(), "2024-10-07");
    }

    #[test]
    fn test_decode_html_only_message() {
        let raw = b"From: Delta <noreply@delta.com>\r\n\
Subject: Trip receipt\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Booking <b>ZX9Q2L</b></p></body></html>\r\n";
        let msg = decode_message(raw, "offset:42");
        assert_eq!(msg.id, "offset:42");
        assert!(msg.text().is_none());
        assert!(msg.html().unwrap_or_default().contains("ZX9Q2L"));
        assert_eq!(msg.received_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_decode_multipart_alternative() {
        let raw = b"From: a@aa.com\r\n\
Subject: Itinerary\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"XX\"\r\n\
\r\n\
--XX\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain part\r\n\
--XX\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html part</p>\r\n\
--XX--\r\n";
        let msg = decode_message(raw, "x");
        assert!(msg.text().unwrap_or_default().contains("plain part"));
        assert!(msg.html().unwrap_or_default().contains("html part"));
    }
}
