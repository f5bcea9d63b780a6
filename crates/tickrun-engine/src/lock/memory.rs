//! Process-local lock provider.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{LockError, LockProvider, LockToken, MAX_TTL};

#[derive(Debug)]
struct Held {
    token: LockToken,
    expires_at: Instant,
}

/// Locks held in a map of name to holder and expiry; an expired entry counts
/// as free.
///
/// Only excludes runs within one process, which is enough for a single
/// long-lived host or for tests.
#[derive(Debug, Default)]
pub struct InMemoryLockProvider {
    held: Mutex<HashMap<String, Held>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held.
    pub fn is_held(&self, name: &str) -> bool {
        self.held
            .lock()
            .map(|map| map.get(name).is_some_and(|h| h.expires_at > Instant::now()))
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: T) -> LockError {
    LockError::Unavailable("in-memory lock table poisoned".to_string())
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let mut held = self.held.lock().map_err(poisoned)?;
        let now = Instant::now();
        if held.get(name).is_some_and(|h| h.expires_at > now) {
            return Ok(None);
        }
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .ok_or_else(|| LockError::Unavailable(format!("lock TTL {:?} out of range", ttl)))?;
        let token = LockToken::generate();
        held.insert(
            name.to_string(),
            Held {
                token: token.clone(),
                expires_at,
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, name: &str, token: &LockToken) -> Result<(), LockError> {
        let mut held = self.held.lock().map_err(poisoned)?;
        if held.get(name).is_some_and(|h| &h.token == token) {
            held.remove(name);
        }
        Ok(())
    }

    async fn check(&self) -> Result<(), LockError> {
        self.held.lock().map(|_| ()).map_err(poisoned)
    }
}
