//! Seams to external collaborators.
//!
//! Notification delivery and the product catalog are consumed as black
//! boxes: the engine calls "notify interested buyers" and "give me product
//! metadata" without knowing their internals. Production wiring plugs real
//! services in behind these traits; the implementations here are the
//! defaults for development and tests.

use crate::error::EngineResult;
use crate::types::{AllocationId, ProductId, ProductInfo};
use async_trait::async_trait;
use std::collections::HashMap;

/// Dispatcher that informs interested buyers when a sale activates.
///
/// Fire-and-forget from the engine's perspective: the engine spawns the
/// call and never consumes a result, so a delivery failure cannot roll back
/// or block an activation.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Notify everyone who expressed interest in any of the allocated
    /// products (e.g. via a saved-for-later list).
    async fn notify_interested_buyers(
        &self,
        allocation_ids: Vec<AllocationId>,
        sale_title: String,
        message: String,
    );
}

/// Dispatcher that only logs. Default for development.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyDispatcher;

#[async_trait]
impl NotificationDispatcher for LogOnlyDispatcher {
    async fn notify_interested_buyers(
        &self,
        allocation_ids: Vec<AllocationId>,
        sale_title: String,
        message: String,
    ) {
        tracing::info!(
            allocations = allocation_ids.len(),
            sale_title = %sale_title,
            message = %message,
            "notification dispatch (log only)"
        );
    }
}

/// Read-only product metadata for storefront display. Never mutated by the
/// engine.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Metadata for the given products. Unknown ids are simply absent from
    /// the result; the storefront renders without decoration.
    ///
    /// # Errors
    ///
    /// `Storage` when the catalog is unreachable. The read path treats this
    /// as "no metadata", not as a failure.
    async fn products(&self, ids: &[ProductId]) -> EngineResult<HashMap<ProductId, ProductInfo>>;
}

/// Catalog that knows nothing. Default for development and tests that do
/// not care about display metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCatalog;

#[async_trait]
impl Catalog for EmptyCatalog {
    async fn products(
        &self,
        _ids: &[ProductId],
    ) -> EngineResult<HashMap<ProductId, ProductInfo>> {
        Ok(HashMap::new())
    }
}
