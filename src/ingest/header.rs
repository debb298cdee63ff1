//! RFC 5322 header handling for messages `mail-parser` cannot read:
//! folding, encoded words (RFC 2047), and tolerant date parsing.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use mail_parser::MessageParser;
use tracing::warn;

use crate::model::address::EmailAddress;

/// The header fields the pipeline needs.
#[derive(Debug, Clone, Default)]
pub struct HeaderFields {
    /// `Message-ID` without angle brackets.
    pub message_id: Option<String>,
    pub from: EmailAddress,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
}

/// Extract [`HeaderFields`] from a raw header block.
pub fn parse_header_fields(raw_headers: &[u8]) -> HeaderFields {
    let text = decode_text(raw_headers);
    let headers = unfold_headers(&text);

    let message_id = get_header(&headers, "message-id")
        .map(|v| strip_angle_brackets(v).to_string())
        .filter(|v| !v.is_empty());
    let from = get_header(&headers, "from")
        .map(|v| EmailAddress::parse(&decode_encoded_words(v)))
        .unwrap_or_default();
    let subject = get_header(&headers, "subject")
        .map(decode_encoded_words)
        .unwrap_or_default();
    let date = get_header(&headers, "date").and_then(parse_date);

    HeaderFields {
        message_id,
        from,
        subject,
        date,
    }
}

/// Decode bytes as UTF-8, falling back to Windows-1252 (which accepts every byte).
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Join continuation lines with the header they continue.
///
/// Returns `(lowercase_name, value)` pairs in order.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with("From ") && result.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            result.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    result
}

fn get_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn strip_angle_brackets(s: &str) -> &str {
    let s = s.trim();
    match (s.find('<'), s.rfind('>')) {
        (Some(start), Some(end)) if start < end => &s[start + 1..end],
        _ => s,
    }
}

/// Decode RFC 2047 encoded words.
///
/// `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`.
/// Charsets are resolved by `mail-parser` (backed by `encoding_rs` labels);
/// undecodable input is returned unchanged.
pub fn decode_encoded_words(input: &str) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }
    let wrapped = format!("Subject: {input}\r\n\r\n");
    MessageParser::default()
        .parse(wrapped.as_bytes())
        .and_then(|msg| msg.subject().map(str::to_string))
        .unwrap_or_else(|| input.to_string())
}

/// Parse an email date in any of the common real-world shapes.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let candidate = replace_named_tz(strip_day_of_week(trimmed));
    const FORMATS: &[&str] = &[
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// `"Thu, 04 Jan 2024"` → `"04 Jan 2024"`.
fn strip_day_of_week(s: &str) -> &str {
    const DAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim_start_matches(',').trim_start();
        }
    }
    s
}

/// Replace a trailing timezone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    const ZONES: &[(&str, &str)] = &[
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}
