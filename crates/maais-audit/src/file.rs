//! Append-only JSONL audit store.
//!
//! One audit record per line. The format is append-friendly and readable
//! with standard tools (`jq`, `grep`).
//!
//! Each append goes straight to the file; with `with_fsync(true)` it is
//! also synced to disk. A write that fails part-way is truncated back to
//! the last committed byte, so a failed append leaves nothing behind for a
//! later one to collide with. If that truncation fails too, the store
//! refuses further appends.
//!
//! The byte span of every line is indexed on open and on append, so reads
//! seek to just the requested records.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use maais_contracts::error::{GateError, GateResult};

use crate::store::AuditStore;

/// An `AuditStore` backed by a JSONL file.
#[derive(Debug)]
pub struct JsonlStore {
    file: File,
    path: PathBuf,
    /// `[start, end)` byte offsets of each record, newline excluded.
    spans: Vec<(u64, u64)>,
    /// File length covering every committed record.
    committed: u64,
    fsync: bool,
    /// Set when a failed write could not be rolled back.
    wedged: Option<String>,
    /// Bytes to write before failing the next append.
    #[cfg(test)]
    pub(crate) fail_next_write: Option<usize>,
}

impl JsonlStore {
    /// Open (or create) the log at `path`.
    ///
    /// Existing lines are indexed so positions continue where the file left
    /// off. The file is only ever opened in append mode.
    pub fn open(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref().to_path_buf();

        let (spans, committed) = if path.exists() {
            index_lines(&path)?
        } else {
            (Vec::new(), 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GateError::AuditWriteFailed {
                reason: format!("failed to open audit log '{}': {e}", path.display()),
            })?;

        if !spans.is_empty() {
            info!(path = %path.display(), records = spans.len(), "audit log reopened");
        }

        Ok(Self {
            file,
            path,
            spans,
            committed,
            fsync: false,
            wedged: None,
            #[cfg(test)]
            fail_next_write: None,
        })
    }

    /// Also `fsync` after every append.
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every non-blank line of the log at `path`, oldest first.
    pub fn read_entries(path: impl AsRef<Path>) -> GateResult<Vec<Vec<u8>>> {
        read_lines(path.as_ref())
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(n) = self.fail_next_write.take() {
            self.file.write_all(&line[..n.min(line.len())])?;
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        self.file.write_all(line)?;
        if self.fsync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn write_failed(&self, e: io::Error) -> GateError {
        GateError::AuditWriteFailed {
            reason: format!("failed to write audit log '{}': {e}", self.path.display()),
        }
    }
}

impl AuditStore for JsonlStore {
    fn append(&mut self, entry: &[u8]) -> GateResult<u64> {
        if let Some(reason) = &self.wedged {
            return Err(GateError::AuditWriteFailed {
                reason: reason.clone(),
            });
        }
        if entry.contains(&b'\n') {
            return Err(GateError::AuditWriteFailed {
                reason: "audit entry contains a newline".to_string(),
            });
        }

        let mut line = Vec::with_capacity(entry.len() + 1);
        line.extend_from_slice(entry);
        line.push(b'\n');

        if let Err(e) = self.write_line(&line) {
            if let Err(rollback) = self.file.set_len(self.committed) {
                let reason = format!(
                    "audit log '{}' holds a partial record and could not be truncated: {rollback}",
                    self.path.display()
                );
                error!(path = %self.path.display(), error = %rollback, "audit log wedged");
                self.wedged = Some(reason);
            }
            return Err(self.write_failed(e));
        }

        let start = self.committed;
        self.committed += line.len() as u64;
        self.spans.push((start, start + entry.len() as u64));
        Ok(self.spans.len() as u64 - 1)
    }

    fn read(&self, range: Range<u64>) -> GateResult<Vec<Vec<u8>>> {
        let len = self.spans.len();
        let start = usize::try_from(range.start).unwrap_or(len).min(len);
        let end = usize::try_from(range.end).unwrap_or(len).min(len);
        let spans = &self.spans[start.min(end)..end];
        let (Some(&(first, _)), Some(&(_, last))) = (spans.first(), spans.last()) else {
            return Ok(Vec::new());
        };

        let read_failed = |e: io::Error| GateError::AuditReadFailed {
            reason: format!("failed to read audit log '{}': {e}", self.path.display()),
        };
        let mut file = File::open(&self.path).map_err(read_failed)?;
        file.seek(SeekFrom::Start(first)).map_err(read_failed)?;
        let mut buf = vec![0; (last - first) as usize];
        file.read_exact(&mut buf).map_err(read_failed)?;

        Ok(spans
            .iter()
            .map(|&(s, e)| buf[(s - first) as usize..(e - first) as usize].to_vec())
            .collect())
    }

    fn len(&self) -> u64 {
        self.spans.len() as u64
    }
}

/// Byte spans of the non-blank lines in `path`, and the file length.
fn index_lines(path: &Path) -> GateResult<(Vec<(u64, u64)>, u64)> {
    let read_failed = |e: io::Error| GateError::AuditReadFailed {
        reason: format!("failed to index audit log '{}': {e}", path.display()),
    };
    let mut reader = BufReader::new(File::open(path).map_err(read_failed)?);
    let mut spans = Vec::new();
    let mut offset = 0u64;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).map_err(read_failed)?;
        if n == 0 {
            break;
        }
        let content = line.strip_suffix(b"\n").unwrap_or(&line);
        if !content.iter().all(u8::is_ascii_whitespace) {
            spans.push((offset, offset + content.len() as u64));
        }
        offset += n as u64;
    }

    Ok((spans, offset))
}

fn read_lines(path: &Path) -> GateResult<Vec<Vec<u8>>> {
    let file = File::open(path).map_err(|e| GateError::AuditReadFailed {
        reason: format!("failed to open audit log '{}': {e}", path.display()),
    })?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(|e| GateError::AuditReadFailed {
            reason: format!("failed to read audit log '{}': {e}", path.display()),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push(line.into_bytes());
    }

    Ok(lines)
}
