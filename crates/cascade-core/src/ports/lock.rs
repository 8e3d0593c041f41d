use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Named, TTL-bounded mutual exclusion port.
///
/// Keys are workflow ids. The adapter must guarantee a lock is released
/// exactly once: by the holder, by TTL expiry, or by transfer through
/// `extend`. The TTL guards against crashed holders; the repository's
/// version check guards against stale reads racing an expiry.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Attempt to acquire; `false` when another holder is live.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Release a held lock. Releasing an unheld key is a no-op.
    async fn release(&self, key: &str) -> Result<()>;

    /// Extend a held lock's TTL; `false` when the lock is no longer held.
    async fn extend(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Whether the key is currently held.
    async fn is_held(&self, key: &str) -> Result<bool>;

    /// Remaining TTL, or `None` when the key is not held.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>>;
}
