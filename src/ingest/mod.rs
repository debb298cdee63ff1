//! Local mail ingestion: MBOX mailboxes and single `.eml` files become
//! [`RawMessage`] values that remember where they came from.

pub mod header;
pub mod mbox;
pub mod mime;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{FlightError, Result};
use crate::model::message::RawMessage;

use self::mbox::MboxReader;

/// Where a message's raw bytes live on disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    /// Byte offset of the message (its `From ` line for MBOX).
    pub offset: u64,
    pub length: u64,
    pub format: MailFormat,
}

/// On-disk container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MailFormat {
    Mbox,
    Eml,
}

impl MailFormat {
    /// `.eml` files are single messages; anything else is read as MBOX.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("eml") => Self::Eml,
            _ => Self::Mbox,
        }
    }
}

/// A decoded message plus its source location.
#[derive(Debug, Clone)]
pub struct IngestedMessage {
    pub message: RawMessage,
    pub location: SourceLocation,
}

/// Read every message in `path` (MBOX or EML).
///
/// Messages without a `Message-ID` get `offset:<n>` as their id. Ids are
/// unique within the file; see [`make_ids_unique`] when combining files.
/// `on_progress` receives `(bytes_read, file_size)`.
pub fn read_path(
    path: impl AsRef<Path>,
    on_progress: Option<&dyn Fn(u64, u64)>,
) -> Result<Vec<IngestedMessage>> {
    read_path_limited(path, mbox::MAX_MESSAGE_SIZE, on_progress)
}

/// [`read_path`] with MBOX messages truncated at `max_message_size` bytes.
pub fn read_path_limited(
    path: impl AsRef<Path>,
    max_message_size: usize,
    on_progress: Option<&dyn Fn(u64, u64)>,
) -> Result<Vec<IngestedMessage>> {
    let path = path.as_ref();
    match MailFormat::detect(path) {
        MailFormat::Eml => read_eml(path).map(|m| vec![m]),
        MailFormat::Mbox => read_mbox(path, max_message_size, on_progress),
    }
}

/// Read several files into one batch with distinct message ids.
pub fn read_paths<P: AsRef<Path>>(
    paths: &[P],
    max_message_size: usize,
) -> Result<Vec<IngestedMessage>> {
    let mut messages = Vec::new();
    for path in paths {
        messages.extend(read_path_limited(path, max_message_size, None)?);
    }
    make_ids_unique(&mut messages);
    Ok(messages)
}

/// Rename repeated ids in batch order: the first keeps its id, later ones
/// get `#2`, `#3`, ... appended. Returns how many were renamed.
pub fn make_ids_unique(messages: &mut [IngestedMessage]) -> usize {
    let mut seen: HashSet<String> = HashSet::with_capacity(messages.len());
    let mut renamed = 0;

    for ingested in messages.iter_mut() {
        let base = ingested.message.id.clone();
        let mut id = base.clone();
        let mut n = 1;
        while !seen.insert(id.clone()) {
            n += 1;
            id = format!("{base}#{n}");
        }
        if id != base {
            debug!(
                from = %base,
                to = %id,
                path = %ingested.location.path.display(),
                "Renamed repeated message id"
            );
            ingested.message.id = id;
            renamed += 1;
        }
    }

    if renamed > 0 {
        warn!(renamed, "Repeated message ids in batch were disambiguated");
    }
    renamed
}

fn read_mbox(
    path: &Path,
    max_message_size: usize,
    on_progress: Option<&dyn Fn(u64, u64)>,
) -> Result<Vec<IngestedMessage>> {
    let reader = MboxReader::new(path)?.with_max_message_size(max_message_size);
    let mut messages = Vec::new();

    reader.read(
        &mut |chunk| {
            let message = mime::decode_message(chunk.bytes, &format!("offset:{}", chunk.offset));
            debug!(id = %message.id, offset = chunk.offset, "Ingested message");
            messages.push(IngestedMessage {
                message,
                location: SourceLocation {
                    path: path.to_path_buf(),
                    offset: chunk.offset,
                    length: chunk.length,
                    format: MailFormat::Mbox,
                },
            });
            true
        },
        on_progress,
    )?;
    make_ids_unique(&mut messages);

    info!(
        path = %path.display(),
        messages = messages.len(),
        size = reader.file_size(),
        "Read mailbox"
    );
    Ok(messages)
}

/// Read a single `.eml` file (a bare RFC 5322 message without MBOX framing).
pub fn read_eml(path: &Path) -> Result<IngestedMessage> {
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            FlightError::FileNotFound(path.to_path_buf())
        } else {
            FlightError::io(path, e)
        }
    })?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(FlightError::InvalidMailbox(path.to_path_buf()));
    }

    let message = mime::decode_message(&data, "offset:0");
    Ok(IngestedMessage {
        message,
        location: SourceLocation {
            path: path.to_path_buf(),
            offset: 0,
            length: data.len() as u64,
            format: MailFormat::Eml,
        },
    })
}

/// Raw bytes of a message, re-read from its source.
pub fn read_raw(location: &SourceLocation) -> Result<Vec<u8>> {
    MboxReader::read_message_at(&location.path, location.offset, location.length)
}
