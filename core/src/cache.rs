//! Short-TTL cache of the active-sales storefront snapshot.
//!
//! The cache absorbs read-heavy storefront traffic; it is purely an
//! optimization. Correctness never depends on it: the reserve path always
//! reads the authoritative repository. Mutations invalidate proactively
//! rather than waiting for TTL expiry, because stock-level accuracy
//! materially affects buyer trust ("3 left!" displays).
//!
//! The cache is an explicitly injected dependency, never a hidden
//! singleton.

use crate::types::ActiveSaleSummary;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache key under which the active-sales snapshot is stored by keyed
/// backends (Redis). Single key: the snapshot is one list.
pub const ACTIVE_SALES_KEY: &str = "flash-sale:active";

/// Read cache for the active-sales snapshot.
///
/// Best-effort by contract: implementations log infrastructure failures and
/// degrade to a miss rather than surfacing errors to the read path.
#[async_trait]
pub trait ActiveSalesCache: Send + Sync {
    /// Fetch the cached snapshot, if present and fresh.
    async fn get(&self) -> Option<Vec<ActiveSaleSummary>>;

    /// Store a fresh snapshot.
    async fn put(&self, snapshot: &[ActiveSaleSummary]);

    /// Drop the snapshot. Called on every state or inventory mutation.
    async fn invalidate(&self);
}

/// In-process TTL cache, the default for single-node deployments and tests.
pub struct InMemoryActiveSalesCache {
    ttl: Duration,
    slot: RwLock<Option<CachedSnapshot>>,
}

struct CachedSnapshot {
    stored_at: Instant,
    snapshot: Vec<ActiveSaleSummary>,
}

impl InMemoryActiveSalesCache {
    /// Create a cache with the given TTL (typically tens of seconds).
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::const_new(None),
        }
    }
}

impl std::fmt::Debug for InMemoryActiveSalesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryActiveSalesCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ActiveSalesCache for InMemoryActiveSalesCache {
    async fn get(&self) -> Option<Vec<ActiveSaleSummary>> {
        let slot = self.slot.read().await;
        match slot.as_ref() {
            Some(cached) if cached.stored_at.elapsed() < self.ttl => {
                Some(cached.snapshot.clone())
            }
            _ => None,
        }
    }

    async fn put(&self, snapshot: &[ActiveSaleSummary]) {
        let mut slot = self.slot.write().await;
        *slot = Some(CachedSnapshot {
            stored_at: Instant::now(),
            snapshot: snapshot.to_vec(),
        });
    }

    async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }
}

/// Cache that never hits, for callers that want the repository on every
/// read.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl ActiveSalesCache for NoopCache {
    async fn get(&self) -> Option<Vec<ActiveSaleSummary>> {
        None
    }

    async fn put(&self, _snapshot: &[ActiveSaleSummary]) {}

    async fn invalidate(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SaleId;
    use chrono::Utc;

    fn snapshot() -> Vec<ActiveSaleSummary> {
        vec![ActiveSaleSummary {
            sale_id: SaleId::new(),
            title: "Midnight Madness".to_string(),
            description: String::new(),
            discount_percent: 30,
            starts_at: Utc::now(),
            ends_at: Utc::now(),
            allocations: Vec::new(),
        }]
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let cache = InMemoryActiveSalesCache::new(Duration::from_secs(30));
        assert!(cache.get().await.is_none());

        let snap = snapshot();
        cache.put(&snap).await;
        assert_eq!(cache.get().await.as_deref(), Some(snap.as_slice()));
    }

    #[tokio::test]
    async fn test_expires_after_ttl() {
        let cache = InMemoryActiveSalesCache::new(Duration::from_millis(10));
        cache.put(&snapshot()).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_drops_entry_before_ttl() {
        let cache = InMemoryActiveSalesCache::new(Duration::from_secs(300));
        cache.put(&snapshot()).await;
        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }
}
