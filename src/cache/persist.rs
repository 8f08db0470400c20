//! On-disk cache records.
//!
//! One JSON file per exact key: `{result, timestamp, ttl}`, both times in
//! milliseconds. Expired records are deleted when a lookup finds them;
//! [`RecordStore::clear`] drops everything at once.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const RECORD_EXTENSION: &str = "json";

/// Persisted cache record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Cached value.
    pub result: Value,
    /// Unix milliseconds when written.
    pub timestamp: u64,
    /// Lifetime in milliseconds.
    pub ttl: u64,
}

impl PersistedRecord {
    /// Whether the record has expired at `now` (Unix milliseconds).
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.timestamp) >= self.ttl
    }

    /// Time since the record was written.
    #[must_use]
    pub const fn age(&self, now: u64) -> Duration {
        Duration::from_millis(now.saturating_sub(self.timestamp))
    }

    /// Lifetime left at `now`, or `None` once expired.
    #[must_use]
    pub fn remaining(&self, now: u64) -> Option<Duration> {
        (!self.is_expired(now)).then(|| self.ttl().saturating_sub(self.age(now)))
    }

    /// Full lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }
}

/// Current Unix time in milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Directory of persisted records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXTENSION}"))
    }

    /// Writes a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheIo`] if the directory or file cannot be written.
    pub fn write(&self, key: &str, result: &Value, ttl: Duration) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::CacheIo(format!("{}: {e}", self.dir.display())))?;
        let record = PersistedRecord {
            result: result.clone(),
            timestamp: now_millis(),
            ttl: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1),
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| Error::CacheIo(e.to_string()))?;
        let path = self.path_for(key);
        std::fs::write(&path, bytes).map_err(|e| Error::CacheIo(format!("{}: {e}", path.display())))
    }

    /// Reads a live record. Expired records are deleted and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheIo`] if an existing file cannot be read or parsed.
    pub fn read(&self, key: &str) -> Result<Option<PersistedRecord>> {
        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::CacheIo(format!("{}: {e}", path.display()))),
        };
        let record: PersistedRecord = serde_json::from_slice(&bytes)
            .map_err(|e| Error::CacheIo(format!("{}: {e}", path.display())))?;

        if record.is_expired(now_millis()) {
            remove_record(&path);
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Deletes a record if present.
    pub fn remove(&self, key: &str) {
        remove_record(&self.path_for(key));
    }

    /// Deletes every record and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheIo`] if the directory exists but cannot be listed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::CacheIo(format!("{}: {e}", self.dir.display()))),
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) && remove_record(&path) {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Removes one record file. A missing file is not an error.
fn remove_record(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove cache record");
            false
        },
    }
}
