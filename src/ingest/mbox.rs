//! Streaming MBOX reader.
//!
//! Reads MBOX files line-by-line through a 1 MB buffer and hands every
//! message to a callback. Never loads the whole mailbox into memory and
//! tolerates malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{FlightError, Result};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Messages larger than this are truncated (booking emails are tiny; this
/// only guards against attachments bloating memory).
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Progress is reported every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// One message as it sits in the mailbox.
#[derive(Debug, Clone, Copy)]
pub struct MboxChunk<'a> {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Length in bytes as stored in the file (before any truncation).
    pub length: u64,
    /// Separator line, headers and body.
    pub bytes: &'a [u8],
}

/// Streaming MBOX reader.
///
/// Tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - UTF-8 BOM at the start of the file
pub struct MboxReader {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxReader {
    /// Open a reader for the given MBOX file.
    ///
    /// Fails with [`FlightError::InvalidMailbox`] when a non-empty file does
    /// not start with a `From ` separator.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlightError::FileNotFound(path.clone())
            } else {
                FlightError::io(&path, e)
            }
        })?;

        if metadata.len() > 0 {
            let mut head = [0u8; 8];
            let mut file = File::open(&path).map_err(|e| FlightError::io(&path, e))?;
            let n = file.read(&mut head).map_err(|e| FlightError::io(&path, e))?;
            if !is_mbox_separator(&head[..n]) {
                return Err(FlightError::InvalidMailbox(path));
            }
        }

        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size: MAX_MESSAGE_SIZE,
        })
    }

    /// Override the per-message size cap.
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Walk the mailbox, calling `on_message` for each message.
    ///
    /// `on_message` returns `false` to stop early. `on_progress` receives
    /// `(bytes_read, file_size)`. Returns the number of messages delivered.
    pub fn read(
        &self,
        on_message: &mut dyn FnMut(MboxChunk<'_>) -> bool,
        on_progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| FlightError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut offset: u64 = 0;
        let mut message_start: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut truncated = false;
        let mut prev_line_was_blank = true;
        let mut last_progress: u64 = 0;
        let mut line: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line.clear();
            let line_len = {
                let buf = reader
                    .fill_buf()
                    .map_err(|e| FlightError::io(&self.path, e))?;
                if buf.is_empty() {
                    break;
                }
                let take = buf
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(buf.len(), |pos| pos + 1);
                line.extend_from_slice(&buf[..take]);
                reader.consume(take);
                take as u64
            };

            if is_mbox_separator(&line) {
                if offset > 0 && !prev_line_was_blank {
                    warn!(offset, "Found 'From ' separator without preceding blank line");
                }
                if !message_buf.is_empty() {
                    let chunk = MboxChunk {
                        offset: message_start,
                        length: offset - message_start,
                        bytes: &message_buf,
                    };
                    if !on_message(chunk) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = offset;
                message_buf.clear();
                truncated = false;
                message_buf.extend_from_slice(&line);
            } else if message_buf.len() + line.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line);
            } else if !truncated {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }

            prev_line_was_blank = is_blank_line(&line);
            offset += line_len;

            if let Some(cb) = on_progress {
                if offset - last_progress >= PROGRESS_INTERVAL {
                    cb(offset, self.file_size);
                    last_progress = offset;
                }
            }
        }

        if !message_buf.is_empty() {
            let chunk = MboxChunk {
                offset: message_start,
                length: offset - message_start,
                bytes: &message_buf,
            };
            if on_message(chunk) {
                count += 1;
            }
        }

        if let Some(cb) = on_progress {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }

    /// Read `length` bytes at `offset`, seeking straight to the message.
    pub fn read_message_at(path: impl AsRef<Path>, offset: u64, length: u64) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| FlightError::io(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| FlightError::io(path, e))?;
        let mut buffer = vec![0u8; length as usize];
        file.read_exact(&mut buffer).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FlightError::ParseError {
                    offset,
                    reason: format!("message of {length} bytes runs past end of file"),
                }
            } else {
                FlightError::io(path, e)
            }
        })?;
        Ok(buffer)
    }
}

/// `From ` at the start of a line (after an optional BOM).
pub(crate) fn is_mbox_separator(line: &[u8]) -> bool {
    line.strip_prefix(UTF8_BOM).unwrap_or(line).starts_with(b"From ")
}

fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_mbox(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From notifications@united.com Mon Oct 07 09:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from someone@example.com\n"));
        assert!(!is_mbox_separator(b">From escaped@example.com\n"));
        assert!(!is_mbox_separator(b"Subject: From SFO to JFK\n"));
    }

    #[test]
    fn test_is_mbox_separator_with_bom() {
        let mut line = UTF8_BOM.to_vec();
        line.extend_from_slice(b"From a@b.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&line));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"ABC123\n"));
    }

    #[test]
    fn test_read_offsets_and_lengths() {
        let first = "From a@b.com Mon Oct 07 09:00:00 2024\nSubject: one\n\nbody\n\n";
        let second = "From c@d.com Mon Oct 07 10:00:00 2024\nSubject: two\n\n>From quoted\n";
        let file = write_mbox(&format!("{first}{second}"));

        let reader = MboxReader::new(file.path()).unwrap();
        let mut chunks = Vec::new();
        let count = reader
            .read(
                &mut |chunk| {
                    chunks.push((chunk.offset, chunk.length, chunk.bytes.to_vec()));
                    true
                },
                None,
            )
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(chunks[0].0, 0);
        assert_eq!(chunks[0].1, first.len() as u64);
        assert_eq!(chunks[1].0, first.len() as u64);
        assert_eq!(chunks[1].1, second.len() as u64);

        let raw = MboxReader::read_message_at(file.path(), chunks[1].0, chunks[1].1).unwrap();
        assert_eq!(raw, second.as_bytes());
    }

    #[test]
    fn test_read_stops_when_callback_declines() {
        let file = write_mbox(
            "From a@b.com x\nSubject: 1\n\n\nFrom a@b.com x\nSubject: 2\n\n\nFrom a@b.com x\nSubject: 3\n",
        );
        let reader = MboxReader::new(file.path()).unwrap();
        let mut seen = 0;
        let count = reader
            .read(
                &mut |_| {
                    seen += 1;
                    seen < 2
                },
                None,
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_oversized_message_is_truncated() {
        let body = "x".repeat(200);
        let file = write_mbox(&format!("From a@b.com x\nSubject: big\n\n{body}\n"));
        let reader = MboxReader::new(file.path())
            .unwrap()
            .with_max_message_size(64);
        let mut sizes = Vec::new();
        reader
            .read(
                &mut |chunk| {
                    sizes.push((chunk.bytes.len(), chunk.length));
                    true
                },
                None,
            )
            .unwrap();
        assert!(sizes[0].0 <= 64);
        assert!(sizes[0].1 > 200);
    }

    #[test]
    fn test_non_mbox_file_is_rejected() {
        let file = write_mbox("Subject: not a mailbox\n\nhello\n");
        assert!(matches!(
            MboxReader::new(file.path()),
            Err(FlightError::InvalidMailbox(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MboxReader::new("/nonexistent/bookings.mbox"),
            Err(FlightError::FileNotFound(_))
        ));
    }
}
