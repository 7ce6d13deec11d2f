//! # Flash Sale Redis
//!
//! Redis-backed [`ActiveSalesCache`] for multi-node deployments, where the
//! active-sales snapshot must be shared across web instances.
//!
//! The snapshot lives under a single key with a short server-side TTL
//! (`SET EX`), so even a missed invalidation self-heals within seconds.
//! Every operation is best-effort: Redis failures are logged and degrade to
//! a cache miss, never an error on the storefront read path.

use async_trait::async_trait;
use flash_sale_core::cache::{ACTIVE_SALES_KEY, ActiveSalesCache};
use flash_sale_core::types::ActiveSaleSummary;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Redis implementation of the active-sales cache.
///
/// Connection pooling via `ConnectionManager`, which reconnects
/// transparently after network failures.
#[derive(Clone)]
pub struct RedisActiveSalesCache {
    conn_manager: ConnectionManager,
    ttl: Duration,
}

impl std::fmt::Debug for RedisActiveSalesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisActiveSalesCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RedisActiveSalesCache {
    /// Connect to Redis and build the cache.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `ttl` - server-side expiry for the snapshot, typically tens of
    ///   seconds
    ///
    /// # Errors
    ///
    /// Returns the underlying `redis` error if the connection cannot be
    /// established.
    pub async fn new(redis_url: &str, ttl: Duration) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self { conn_manager, ttl })
    }
}

#[async_trait]
impl ActiveSalesCache for RedisActiveSalesCache {
    async fn get(&self) -> Option<Vec<ActiveSaleSummary>> {
        let mut conn = self.conn_manager.clone();

        let payload: Option<String> = match conn.get(ACTIVE_SALES_KEY).await {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "Redis GET failed, treating as cache miss");
                return None;
            }
        };

        let payload = payload?;
        match serde_json::from_str(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                // A stale or foreign payload under our key reads as a miss;
                // the next put overwrites it.
                tracing::warn!(%error, "Discarding undecodable cached snapshot");
                None
            }
        }
    }

    async fn put(&self, snapshot: &[ActiveSaleSummary]) {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, "Failed to serialize active-sales snapshot");
                return;
            }
        };

        let mut conn = self.conn_manager.clone();
        let ttl_seconds = self.ttl.as_secs().max(1);
        let outcome: redis::RedisResult<()> =
            conn.set_ex(ACTIVE_SALES_KEY, payload, ttl_seconds).await;
        if let Err(error) = outcome {
            tracing::warn!(%error, "Redis SET failed, snapshot not cached");
        } else {
            tracing::debug!(ttl_seconds, sales = snapshot.len(), "Cached active-sales snapshot");
        }
    }

    async fn invalidate(&self) {
        let mut conn = self.conn_manager.clone();
        let outcome: redis::RedisResult<()> = conn.del(ACTIVE_SALES_KEY).await;
        if let Err(error) = outcome {
            // TTL still bounds staleness if the delete is lost.
            tracing::warn!(%error, "Redis DEL failed, relying on TTL expiry");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flash_sale_core::types::{AllocationSummary, Money, ProductId, SaleId};

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    fn snapshot() -> Vec<ActiveSaleSummary> {
        vec![ActiveSaleSummary {
            sale_id: SaleId::new(),
            title: "Lightning Deals".to_string(),
            description: "hourly drops".to_string(),
            discount_percent: 40,
            starts_at: Utc::now(),
            ends_at: Utc::now() + chrono::Duration::hours(1),
            allocations: vec![AllocationSummary {
                allocation_id: flash_sale_core::types::AllocationId::new(),
                product_id: ProductId::new(),
                product_name: Some("Desk lamp".to_string()),
                product_image: None,
                original_price: Money::from_minor_units(4_000),
                sale_price: Money::from_minor_units(2_400),
                max_quantity: 50,
                quantity_sold: 12,
                remaining: 38,
            }],
        }]
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_round_trip_and_invalidate() {
        let cache = RedisActiveSalesCache::new("redis://127.0.0.1:6379", Duration::from_secs(30))
            .await
            .unwrap();
        cache.invalidate().await;
        assert!(cache.get().await.is_none());

        let snap = snapshot();
        cache.put(&snap).await;
        assert_eq!(cache.get().await.as_deref(), Some(snap.as_slice()));

        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_snapshot_expires_server_side() {
        let cache = RedisActiveSalesCache::new("redis://127.0.0.1:6379", Duration::from_secs(1))
            .await
            .unwrap();
        cache.put(&snapshot()).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_undecodable_payload_reads_as_miss() {
        let cache = RedisActiveSalesCache::new("redis://127.0.0.1:6379", Duration::from_secs(30))
            .await
            .unwrap();

        let mut conn = cache.conn_manager.clone();
        let _: () = conn.set_ex(ACTIVE_SALES_KEY, "not json", 30).await.unwrap();
        assert!(cache.get().await.is_none());
    }
}
