//! Write each group's representative to a new MBOX.
//!
//! This is the local stand-in for forwarding: the representative's raw bytes
//! are copied verbatim from its source file.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use crate::ingest::{self, IngestedMessage, MailFormat};
use crate::pipeline::BatchReport;

/// Statistics returned by a forward operation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub messages: u64,
    pub bytes: u64,
    /// Representatives whose source could not be found or read.
    pub skipped: u64,
    pub dry_run: bool,
}

/// Copy every group representative from `messages` into `output`.
///
/// With `dry_run` nothing is written; the would-be count is returned and
/// logged. The progress callback receives `(current, total)`. Message ids
/// must be unique (see [`ingest::make_ids_unique`]); a repeated id is an
/// error.
pub fn forward_representatives(
    report: &BatchReport,
    messages: &[IngestedMessage],
    output: &Path,
    dry_run: bool,
    progress: &dyn Fn(usize, usize),
) -> anyhow::Result<ForwardStats> {
    let mut by_id: HashMap<&str, &IngestedMessage> = HashMap::new();
    for m in messages {
        if by_id.insert(m.message.id.as_str(), m).is_some() {
            anyhow::bail!(
                "Message id {} appears more than once in the batch",
                m.message.id
            );
        }
    }

    let mut stats = ForwardStats {
        dry_run,
        ..Default::default()
    };
    let mut out = if dry_run {
        None
    } else {
        Some(std::io::BufWriter::new(std::fs::File::create(output)?))
    };

    let total = report.groups.len();
    for (i, id) in report.representatives().enumerate() {
        progress(i, total);
        let Some(source) = by_id.get(id) else {
            warn!(id, "Representative not found among ingested messages");
            stats.skipped += 1;
            continue;
        };
        let raw = match ingest::read_raw(&source.location) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(id, error = %e, "Could not re-read representative");
                stats.skipped += 1;
                continue;
            }
        };
        let framed = match source.location.format {
            MailFormat::Mbox => raw,
            MailFormat::Eml => frame_eml(&raw, source),
        };

        if let Some(out) = out.as_mut() {
            out.write_all(&framed)?;
            // Ensure a blank line separates messages
            if !framed.ends_with(b"\n\n") {
                out.write_all(if framed.ends_with(b"\n") { b"\n" } else { b"\n\n" })?;
            }
        }
        stats.messages += 1;
        stats.bytes += framed.len() as u64;
    }
    progress(total, total);

    if let Some(mut out) = out {
        out.flush()?;
    }
    if dry_run {
        info!(messages = stats.messages, "Dry run: nothing forwarded");
    } else {
        info!(
            path = %output.display(),
            messages = stats.messages,
            bytes = stats.bytes,
            "Forwarded representatives"
        );
    }
    Ok(stats)
}

/// Add a `From ` separator to a bare message and escape body lines that
/// would be read as one.
fn frame_eml(raw: &[u8], source: &IngestedMessage) -> Vec<u8> {
    let date = source.message.received_at.format("%a %b %e %H:%M:%S %Y");
    let sender = Some(source.message.sender.address.as_str())
        .filter(|a| !a.is_empty())
        .unwrap_or("MAILER-DAEMON");
    let mut out = format!("From {sender} {date}\n").into_bytes();
    for line in raw.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b"From ") {
            out.push(b'>');
        }
        out.extend_from_slice(line);
    }
    out
}
