//! The allocation engine: purchase reservation and operator actions.
//!
//! Orchestrates the repository (authoritative, transactional), the
//! active-sales cache (advisory), the catalog (display metadata) and the
//! notification dispatcher. The atomic check-and-increment itself lives in
//! the repository behind [`SaleRepository::reserve`]; the engine owns
//! request validation, cache invalidation and observability.

use crate::cache::ActiveSalesCache;
use crate::collaborators::{Catalog, NotificationDispatcher};
use crate::environment::Clock;
use crate::error::{EngineError, EngineResult};
use crate::repository::SaleRepository;
use crate::reservation::ReservePolicy;
use crate::types::{
    ActiveSaleSummary, Allocation, AllocationId, AllocationSummary, BuyerId, NewSale,
    ReservationReceipt, ReserveRequest, Sale, SaleId, SaleStatus,
};
use std::cmp::Ordering;
use std::sync::Arc;

/// The time-windowed promotional inventory engine.
///
/// Cloning is cheap; all dependencies are shared behind `Arc`.
#[derive(Clone)]
pub struct AllocationEngine {
    pub(crate) repository: Arc<dyn SaleRepository>,
    pub(crate) cache: Arc<dyn ActiveSalesCache>,
    pub(crate) notifier: Arc<dyn NotificationDispatcher>,
    catalog: Arc<dyn Catalog>,
    pub(crate) clock: Arc<dyn Clock>,
    policy: ReservePolicy,
}

impl std::fmt::Debug for AllocationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AllocationEngine {
    /// Assemble an engine from its injected dependencies.
    #[must_use]
    pub fn new(
        repository: Arc<dyn SaleRepository>,
        cache: Arc<dyn ActiveSalesCache>,
        notifier: Arc<dyn NotificationDispatcher>,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        policy: ReservePolicy,
    ) -> Self {
        Self {
            repository,
            cache,
            notifier,
            catalog,
            clock,
            policy,
        }
    }

    /// The reservation policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &ReservePolicy {
        &self.policy
    }

    /// Reserve discounted units for a buyer.
    ///
    /// The stock check and increment execute as one serializable unit per
    /// allocation inside the repository. On success the active-sales cache
    /// is invalidated so storefront counts refresh promptly, and the
    /// returned price is frozen: later edits to the allocation's sale
    /// price never affect this reservation.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a zero quantity, `NotFound` for an unknown
    /// allocation, `SaleNotActive` outside the live window,
    /// `InsufficientStock` (with the remaining count),
    /// `PurchaseLimitExceeded` (with the claimed count and cap), `Busy` on
    /// lock-wait timeout, `Storage` on infrastructure failure.
    #[tracing::instrument(
        skip(self),
        fields(
            allocation_id = %request.allocation_id,
            buyer_id = %request.buyer_id,
            quantity = request.quantity,
        )
    )]
    pub async fn reserve(&self, request: ReserveRequest) -> EngineResult<ReservationReceipt> {
        // Reject malformed requests before touching storage.
        if request.quantity == 0 {
            metrics::counter!("flash_sale_reserve_rejected_total", "kind" => "INVALID_REQUEST")
                .increment(1);
            return Err(EngineError::invalid("quantity must be greater than zero"));
        }

        let now = self.clock.now();
        let outcome = self.repository.reserve(&request, &self.policy, now).await;

        match &outcome {
            Ok(receipt) => {
                metrics::counter!("flash_sale_reserved_units_total")
                    .increment(u64::from(receipt.reserved_quantity));
                tracing::info!(
                    reserved_price = %receipt.reserved_price,
                    remaining = receipt.remaining,
                    "reservation succeeded"
                );
                self.cache.invalidate().await;
            }
            Err(err) => {
                metrics::counter!("flash_sale_reserve_rejected_total", "kind" => err.code())
                    .increment(1);
                tracing::debug!(kind = err.code(), "reservation rejected");
            }
        }

        outcome
    }

    /// Create a scheduled sale from an operator draft.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the window is inverted, the window has already
    /// closed, the discount is over 100, the draft has no allocations, or
    /// an allocation offers zero units; `Storage` on infrastructure
    /// failure.
    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create_sale(&self, draft: NewSale) -> EngineResult<(Sale, Vec<Allocation>)> {
        if draft.starts_at >= draft.ends_at {
            return Err(EngineError::invalid("start time must be before end time"));
        }
        let now = self.clock.now();
        if draft.ends_at <= now {
            return Err(EngineError::invalid("sale window has already closed"));
        }
        if draft.discount_percent > 100 {
            return Err(EngineError::invalid("discount percent cannot exceed 100"));
        }
        if draft.allocations.is_empty() {
            return Err(EngineError::invalid("a sale needs at least one allocation"));
        }
        if draft.allocations.iter().any(|a| a.max_quantity == 0) {
            return Err(EngineError::invalid("allocations must offer at least one unit"));
        }

        let created = self.repository.create_sale(&draft, now).await?;
        tracing::info!(sale_id = %created.0.id, allocations = created.1.len(), "sale created");
        Ok(created)
    }

    /// Cancel a sale that has not started.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown sale, `Conflict` once the sale has started
    /// or left the scheduled state, `Storage` on infrastructure failure.
    #[tracing::instrument(skip(self), fields(sale_id = %id))]
    pub async fn cancel_sale(&self, id: SaleId) -> EngineResult<Sale> {
        let now = self.clock.now();
        let sale = self.repository.cancel_sale(id, now).await?;
        tracing::info!("sale cancelled");
        self.cache.invalidate().await;
        Ok(sale)
    }

    /// Load a sale with its allocations (operator/detail view). Reads the
    /// repository directly, never the cache.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown sale, `Storage` on infrastructure failure.
    pub async fn sale(&self, id: SaleId) -> EngineResult<(Sale, Vec<Allocation>)> {
        let sale = self
            .repository
            .sale(id)
            .await?
            .ok_or(EngineError::NotFound {
                resource: "sale",
                id: *id.as_uuid(),
            })?;
        let allocations = self.repository.allocations_by_sale(id).await?;
        Ok((sale, allocations))
    }

    /// The storefront list of currently active sales with per-allocation
    /// sold/remaining counts. Served from the short-TTL cache when fresh;
    /// rebuilt from the repository (and decorated with catalog metadata)
    /// on a miss.
    ///
    /// # Errors
    ///
    /// `Storage` when the repository is unreachable on a cache miss.
    pub async fn active_sales(&self) -> EngineResult<Vec<ActiveSaleSummary>> {
        if let Some(snapshot) = self.cache.get().await {
            metrics::counter!("flash_sale_active_cache_hits_total").increment(1);
            return Ok(snapshot);
        }
        metrics::counter!("flash_sale_active_cache_misses_total").increment(1);

        let snapshot = self.build_active_snapshot().await?;
        self.cache.put(&snapshot).await;
        Ok(snapshot)
    }

    /// How many units of an allocation a buyer has already claimed, for
    /// storefront display next to the cap.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    pub async fn buyer_claimed(
        &self,
        allocation_id: AllocationId,
        buyer_id: BuyerId,
    ) -> EngineResult<u32> {
        self.repository.buyer_claimed(allocation_id, buyer_id).await
    }

    async fn build_active_snapshot(&self) -> EngineResult<Vec<ActiveSaleSummary>> {
        let sales = self.repository.sales_with_status(SaleStatus::Active).await?;

        let mut summaries = Vec::with_capacity(sales.len());
        for sale in sales {
            let allocations = self.repository.allocations_by_sale(sale.id).await?;

            let product_ids: Vec<_> = allocations.iter().map(|a| a.product_id).collect();
            // Catalog is decoration only: an unreachable catalog degrades to
            // an undecorated listing, it does not fail the read.
            let products = match self.catalog.products(&product_ids).await {
                Ok(products) => products,
                Err(err) => {
                    tracing::warn!(error = %err, "catalog lookup failed, serving undecorated");
                    std::collections::HashMap::new()
                }
            };

            let mut entries: Vec<AllocationSummary> = allocations
                .into_iter()
                .map(|a| {
                    let info = products.get(&a.product_id);
                    AllocationSummary {
                        allocation_id: a.id,
                        product_id: a.product_id,
                        product_name: info.map(|p| p.name.clone()),
                        product_image: info.and_then(|p| p.image_url.clone()),
                        original_price: a.original_price,
                        sale_price: a.sale_price,
                        max_quantity: a.max_quantity,
                        quantity_sold: a.quantity_sold,
                        remaining: a.remaining(),
                    }
                })
                .collect();
            // Scarcest first, matching the repository's display ordering.
            entries.sort_by(|a, b| percent_sold(b).partial_cmp(&percent_sold(a)).unwrap_or(Ordering::Equal));

            summaries.push(ActiveSaleSummary {
                sale_id: sale.id,
                title: sale.title,
                description: sale.description,
                discount_percent: sale.discount_percent,
                starts_at: sale.starts_at,
                ends_at: sale.ends_at,
                allocations: entries,
            });
        }

        Ok(summaries)
    }
}

fn percent_sold(summary: &AllocationSummary) -> f64 {
    if summary.max_quantity == 0 {
        return 0.0;
    }
    f64::from(summary.quantity_sold) / f64::from(summary.max_quantity)
}
