//! Append-only file dedup store.
//!
//! Record format: one identifier per line, newline-terminated, never
//! rewritten. On open the whole file is read back into memory; lines that do
//! not decode to a valid identifier are skipped and logged.
//!
//! A crash mid-append can leave an unterminated last line. It is treated as
//! corrupt and truncated away before the file is reopened for appending.

use crate::error::{StoreError, StoreResult};
use crate::repository::DedupStore;
use async_trait::async_trait;
use relay_domain::MessageId;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Summary of a startup rehydration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RehydrateReport {
    /// Distinct identifiers loaded
    pub loaded: usize,
    /// Lines skipped as corrupt
    pub skipped: usize,
    /// Whether the file ended in an unterminated line
    pub torn_tail: bool,
}

/// File-backed dedup store.
pub struct FileDedupStore {
    path: PathBuf,
    seen: RwLock<HashSet<MessageId>>,
    /// Serializes appends; held across the write and the in-memory insert.
    file: Mutex<File>,
    report: RehydrateReport,
}

impl FileDedupStore {
    /// Open (or create) the dedup file and rehydrate the in-memory set.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let (seen, report) = rehydrate(&bytes);

        if report.torn_tail {
            let complete = bytes
                .iter()
                .rposition(|b| *b == b'\n')
                .map_or(0, |i| i + 1);
            truncate(&path, complete as u64).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        info!(
            path = %path.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            "Rehydrated dedup store"
        );

        Ok(Self {
            path,
            seen: RwLock::new(seen),
            file: Mutex::new(file),
            report,
        })
    }

    /// Path of the dedup record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What the startup read found
    pub fn rehydrate_report(&self) -> &RehydrateReport {
        &self.report
    }

    fn contains(&self, id: &MessageId) -> StoreResult<bool> {
        Ok(self
            .seen
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .contains(id))
    }
}

async fn truncate(path: &Path, len: u64) -> StoreResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.set_len(len).await.map_err(|e| StoreError::io(path, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Decode the record into a set. Never fails; bad lines are counted.
fn rehydrate(bytes: &[u8]) -> (HashSet<MessageId>, RehydrateReport) {
    let mut seen = HashSet::new();
    let mut report = RehydrateReport::default();

    let mut lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();

    // split() yields a trailing empty slice for a terminated file
    if let Some(tail) = lines.pop() {
        if !tail.is_empty() {
            report.torn_tail = true;
            report.skipped += 1;
            warn!(
                bytes = tail.len(),
                "Skipping unterminated trailing dedup record"
            );
        }
    }

    for (index, raw) in lines.into_iter().enumerate() {
        let line_no = index + 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => {
                report.skipped += 1;
                warn!(line = line_no, error = %e, "Skipping non-UTF-8 dedup record");
                continue;
            }
        };

        if text.trim().is_empty() {
            debug!(line = line_no, "Skipping blank dedup record");
            continue;
        }

        match MessageId::new(text) {
            Ok(id) => {
                seen.insert(id);
            }
            Err(e) => {
                report.skipped += 1;
                warn!(line = line_no, error = %e, "Skipping corrupt dedup record");
            }
        }
    }

    report.loaded = seen.len();
    (seen, report)
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn has_seen(&self, id: &MessageId) -> Result<bool, StoreError> {
        self.contains(id)
    }

    async fn mark_seen(&self, id: &MessageId) -> Result<(), StoreError> {
        let mut file = self.file.lock().await;

        if self.contains(id)? {
            return Ok(());
        }

        // Durable first, then visible
        let record = format!("{}\n", id);
        file.write_all(record.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&self.path, e))?;
        file.sync_data().await.map_err(|e| StoreError::io(&self.path, e))?;

        self.seen
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .insert(id.clone());

        debug!(message_id = %id, "Marked message as processed");
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .seen
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .len())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(value: &str) -> MessageId {
        MessageId::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");

        let store = FileDedupStore::open(&path).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.len().await.unwrap(), 0);
        assert_eq!(store.rehydrate_report(), &RehydrateReport::default());
    }

    #[tokio::test]
    async fn test_round_trip_across_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");

        {
            let store = FileDedupStore::open(&path).await.unwrap();
            for value in ["tg:-100:3", "tg:-100:1", "tg:-100:2"] {
                store.mark_seen(&id(value)).await.unwrap();
            }
            store.mark_seen(&id("tg:-100:1")).await.unwrap();
        }

        let reopened = FileDedupStore::open(&path).await.unwrap();

        assert_eq!(reopened.len().await.unwrap(), 3);
        for value in ["tg:-100:1", "tg:-100:2", "tg:-100:3"] {
            assert!(reopened.has_seen(&id(value)).await.unwrap());
        }
        assert!(!reopened.has_seen(&id("tg:-100:4")).await.unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "tg:-100:3\ntg:-100:1\ntg:-100:2\n");
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");

        let mut bytes = b"good-1\n\n   \nbad\x07id\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"good-2\r\ngood-1\n");
        std::fs::write(&path, bytes).unwrap();

        let store = FileDedupStore::open(&path).await.unwrap();
        let report = store.rehydrate_report().clone();

        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped, 2);
        assert!(!report.torn_tail);
        assert!(store.has_seen(&id("good-1")).await.unwrap());
        assert!(store.has_seen(&id("good-2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");
        std::fs::write(&path, "first\nsec").unwrap();

        {
            let store = FileDedupStore::open(&path).await.unwrap();
            assert!(store.rehydrate_report().torn_tail);
            assert!(!store.has_seen(&id("sec")).await.unwrap());

            store.mark_seen(&id("second")).await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");

        let reopened = FileDedupStore::open(&path).await.unwrap();
        assert!(reopened.has_seen(&id("second")).await.unwrap());
        assert!(!reopened.has_seen(&id("sec")).await.unwrap());
        assert!(!reopened.rehydrate_report().torn_tail);
    }

    #[tokio::test]
    async fn test_concurrent_marks_append_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.txt");
        let store = std::sync::Arc::new(FileDedupStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.mark_seen(&id("same")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "same\n");
    }
}
