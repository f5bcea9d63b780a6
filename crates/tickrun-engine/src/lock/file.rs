//! Lock provider backed by one file per lock in a shared directory.
//!
//! A lock file is published by hard-linking a fully written temporary file
//! to `<stem>-<digest>.lock`, so readers never observe a half-written record and only
//! one contender can win the link. The record carries the holder's token and
//! expiry; an expired or undecodable record is removed and acquisition is
//! retried once.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::{LockError, LockProvider, LockToken, MAX_TTL};

/// Digest bytes appended to a lock file stem.
const STEM_DIGEST_BYTES: usize = 8;
/// Longest readable prefix kept from a lock name.
const MAX_READABLE_STEM: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    name: String,
    token: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// File-based provider; excludes runs across processes sharing `dir`.
#[derive(Debug)]
pub struct FileLockProvider {
    dir: PathBuf,
}

impl FileLockProvider {
    /// Create a new FileLockProvider. The directory is created on first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the lock file for `name`.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", file_stem(name)))
    }

    /// Publish `record` at `path`; false if the file already exists.
    async fn publish(&self, path: &Path, record: &LockRecord) -> Result<bool, LockError> {
        let bytes = serde_json::to_vec(record).map_err(|e| LockError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let temp = self
            .dir
            .join(format!(".{}.{}.tmp", file_stem(&record.name), record.token));
        fs::write(&temp, &bytes).await?;

        let linked = fs::hard_link(&temp, path).await;
        if let Err(e) = fs::remove_file(&temp).await {
            debug!(path = %temp.display(), error = %e, "Failed to remove temporary lock file");
        }
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the lock file if it is expired or undecodable. True if it is gone.
    async fn clear_if_stale(&self, path: &Path) -> Result<bool, LockError> {
        let record = match read_record(path).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(true),
            Err(LockError::Corrupt { reason, .. }) => {
                warn!(path = %path.display(), reason = %reason, "Removing corrupt lock file");
                remove_if_present(path).await?;
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        if record.expires_at > Utc::now() {
            return Ok(false);
        }
        warn!(
            lock = %record.name,
            holder_pid = record.pid,
            expired_at = %record.expires_at,
            "Removing expired lock"
        );
        remove_if_present(path).await?;
        Ok(true)
    }
}

#[async_trait]
impl LockProvider for FileLockProvider {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.lock_path(name);
        let now = Utc::now();
        let ttl_ms = i64::try_from(ttl.min(MAX_TTL).as_millis()).unwrap_or(i64::MAX);
        let token = LockToken::generate();
        let record = LockRecord {
            name: name.to_string(),
            token: token.as_str().to_string(),
            pid: std::process::id(),
            acquired_at: now,
            expires_at: now + chrono::Duration::milliseconds(ttl_ms),
        };

        for attempt in 0..2 {
            if self.publish(&path, &record).await? {
                return Ok(Some(token));
            }
            if attempt > 0 || !self.clear_if_stale(&path).await? {
                break;
            }
        }
        Ok(None)
    }

    async fn check(&self) -> Result<(), LockError> {
        fs::create_dir_all(&self.dir).await?;
        let metadata = fs::metadata(&self.dir).await?;
        if metadata.permissions().readonly() {
            return Err(LockError::Unavailable(format!(
                "lock directory {} is read-only",
                self.dir.display()
            )));
        }
        Ok(())
    }

    async fn release(&self, name: &str, token: &LockToken) -> Result<(), LockError> {
        let path = self.lock_path(name);
        match read_record(&path).await? {
            Some(record) if record.token == token.as_str() => remove_if_present(&path).await,
            Some(record) => {
                // Our lock expired and was taken over.
                debug!(lock = %name, holder_pid = record.pid, "Lock no longer ours, leaving it");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

async fn read_record(path: &Path) -> Result<Option<LockRecord>, LockError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| LockError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

async fn remove_if_present(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Lock names are task ids. The readable part is filesystem-safe but lossy,
/// so a digest of the full name keeps distinct names on distinct files.
fn file_stem(name: &str) -> String {
    let mut stem: String = name
        .chars()
        .take(MAX_READABLE_STEM)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem.push('-');
    let digest = Sha256::digest(name.as_bytes());
    for byte in &digest[..STEM_DIGEST_BYTES] {
        let _ = write!(stem, "{:02x}", byte);
    }
    stem
}
