//! Overlap locks: at most one concurrent run per task name.
//!
//! Providers are non-blocking: `acquire` answers immediately with
//! `Ok(Some(token))` (acquired), `Ok(None)` (held by someone else) or `Err`
//! (backend down). Every lock carries a TTL so a crashed holder cannot block a
//! task forever, and `release` only frees the lock the token was issued for.

mod file;
mod memory;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use file::FileLockProvider;
pub use memory::InMemoryLockProvider;

/// Errors from a lock backend.
#[derive(Debug, Error)]
pub enum LockError {
    /// The backend could not be read or written.
    #[error("Lock I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock record exists but cannot be decoded.
    #[error("Corrupt lock record at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The backend is not usable at all.
    #[error("Lock backend unavailable: {0}")]
    Unavailable(String),
}

/// TTLs are capped to keep expiry arithmetic in range.
pub(crate) const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Identifies one acquisition of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A keyed, TTL-bounded mutual exclusion backend.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take the lock `name` for at most `ttl`. Never waits for a holder.
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    /// Release the lock `name` if it is still held under `token`.
    ///
    /// A lock that expired and was taken over is left to its new holder.
    async fn release(&self, name: &str, token: &LockToken) -> Result<(), LockError>;

    /// Probe the backend before a tick that needs locks.
    async fn check(&self) -> Result<(), LockError> {
        Ok(())
    }
}

/// A held lock that is released exactly once.
///
/// Call [`LockGuard::release`] on the normal path. A guard dropped without it
/// (early return, panic unwinding) spawns the release on the current tokio
/// runtime instead.
pub struct LockGuard {
    provider: Arc<dyn LockProvider>,
    name: String,
    token: LockToken,
    released: bool,
}

impl LockGuard {
    /// Try to acquire `name`; `Ok(None)` means someone else holds it.
    pub async fn try_acquire(
        provider: Arc<dyn LockProvider>,
        name: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<Self>, LockError> {
        let name = name.into();
        let Some(token) = provider.acquire(&name, ttl).await? else {
            debug!(lock = %name, "Lock held elsewhere");
            return Ok(None);
        };
        debug!(lock = %name, ttl = ?ttl, "Lock acquired");
        Ok(Some(Self {
            provider,
            name,
            token,
            released: false,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock now.
    pub async fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        let result = self.provider.release(&self.name, &self.token).await;
        debug!(lock = %self.name, ok = result.is_ok(), "Lock released");
        result
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let provider = Arc::clone(&self.provider);
        let name = std::mem::take(&mut self.name);
        let token = self.token.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = provider.release(&name, &token).await {
                        warn!(lock = %name, error = %e, "Failed to release dropped lock");
                    }
                });
            }
            Err(_) => {
                warn!(lock = %name, "Lock dropped outside a runtime, left to expire");
            }
        }
    }
}
