//! Mock implementations of the engine's environment traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flash_sale_core::error::{EngineError, EngineResult};
use flash_sale_core::repository::SaleRepository;
use flash_sale_core::reservation::{self, ReservePolicy};
use flash_sale_core::types::{
    Allocation, AllocationId, BuyerId, Money, NewSale, ProductId, ProductInfo, ReservationReceipt,
    ReserveRequest, Sale, SaleId, SaleStatus,
};
use flash_sale_core::{Catalog, Clock, NotificationDispatcher};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, RwLock};

// ============================================================================
// Clock
// ============================================================================

/// Settable clock for deterministic lifecycle tests.
#[derive(Debug, Clone)]
pub struct TestClock {
    now: Arc<StdMutex<DateTime<Utc>>>,
}

impl TestClock {
    /// Create a clock frozen at the given instant.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(StdMutex::new(now)),
        }
    }

    /// Jump to a new instant.
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Move forward by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map_or_else(|p| *p.into_inner(), |g| *g)
    }
}

// ============================================================================
// Notification dispatcher
// ============================================================================

/// A single captured dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedNotification {
    /// Allocations whose products were advertised
    pub allocation_ids: Vec<AllocationId>,
    /// Sale title as dispatched
    pub sale_title: String,
    /// Message body as dispatched
    pub message: String,
}

/// Dispatcher that records every call for assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingDispatcher {
    dispatched: Arc<StdMutex<Vec<DispatchedNotification>>>,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> Vec<DispatchedNotification> {
        self.dispatched.lock().map_or_else(|_| Vec::new(), |g| g.clone())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify_interested_buyers(
        &self,
        allocation_ids: Vec<AllocationId>,
        sale_title: String,
        message: String,
    ) {
        if let Ok(mut dispatched) = self.dispatched.lock() {
            dispatched.push(DispatchedNotification {
                allocation_ids,
                sale_title,
                message,
            });
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog backed by a fixed map.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    products: HashMap<ProductId, ProductInfo>,
}

impl StaticCatalog {
    /// Create a catalog with the given metadata.
    #[must_use]
    pub const fn new(products: HashMap<ProductId, ProductInfo>) -> Self {
        Self { products }
    }

    /// Add a product.
    #[must_use]
    pub fn with_product(mut self, id: ProductId, name: &str) -> Self {
        self.products.insert(
            id,
            ProductInfo {
                name: name.to_string(),
                image_url: None,
            },
        );
        self
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn products(&self, ids: &[ProductId]) -> EngineResult<HashMap<ProductId, ProductInfo>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|info| (*id, info.clone())))
            .collect())
    }
}

// ============================================================================
// In-memory repository
// ============================================================================

/// A recorded claim, frozen at reservation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    /// Buyer who reserved
    pub buyer_id: BuyerId,
    /// Units reserved
    pub quantity: u32,
    /// Per-unit price frozen when the claim was recorded
    pub unit_price: Money,
}

#[derive(Debug)]
struct AllocationState {
    allocation: Allocation,
    claimed_by: HashMap<BuyerId, u32>,
    claims: Vec<ClaimRecord>,
}

/// Per-allocation cell. The mutex is the in-memory analogue of the Postgres
/// row lock: one allocation, one lock, acquired for the whole
/// read-validate-write sequence. Because same-buyer claims live inside the
/// cell, the same lock also serializes same-buyer cap checks.
#[derive(Debug)]
struct AllocationCell {
    state: Mutex<AllocationState>,
}

/// In-memory `SaleRepository` with per-allocation keyed locking.
///
/// Lock acquisition is bounded by the policy's lock timeout and fails
/// `Busy` on expiry, mirroring the Postgres backend's `lock_timeout`.
#[derive(Debug, Default)]
pub struct InMemorySaleRepository {
    sales: RwLock<HashMap<SaleId, Sale>>,
    allocations: RwLock<HashMap<AllocationId, Arc<AllocationCell>>>,
    by_sale: RwLock<HashMap<SaleId, Vec<AllocationId>>>,
}

impl InMemorySaleRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the allocation's lock for the given duration. Test hook for
    /// exercising the bounded-wait `Busy` path deterministically; returns
    /// once the lock has been acquired, and releases it after `hold` from a
    /// background task.
    pub async fn hold_allocation_lock(&self, allocation_id: AllocationId, hold: std::time::Duration) {
        if let Some(cell) = self.cell(allocation_id).await {
            let acquired = Arc::new(tokio::sync::Notify::new());
            let started = acquired.clone();
            tokio::spawn(async move {
                let guard = cell.state.lock().await;
                started.notify_one();
                tokio::time::sleep(hold).await;
                drop(guard);
            });
            acquired.notified().await;
        }
    }

    /// All claims recorded against an allocation, in reservation order.
    /// Test hook for price-freezing assertions.
    pub async fn claims(&self, allocation_id: AllocationId) -> Vec<ClaimRecord> {
        let Some(cell) = self.cell(allocation_id).await else {
            return Vec::new();
        };
        let state = cell.state.lock().await;
        state.claims.clone()
    }

    async fn cell(&self, allocation_id: AllocationId) -> Option<Arc<AllocationCell>> {
        let allocations = self.allocations.read().await;
        allocations.get(&allocation_id).cloned()
    }
}

#[async_trait]
impl SaleRepository for InMemorySaleRepository {
    async fn create_sale(
        &self,
        draft: &NewSale,
        now: DateTime<Utc>,
    ) -> EngineResult<(Sale, Vec<Allocation>)> {
        let sale = Sale {
            id: SaleId::new(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
            discount_percent: draft.discount_percent,
            status: SaleStatus::Scheduled,
            created_at: now,
        };

        let allocations: Vec<Allocation> = draft
            .allocations
            .iter()
            .map(|a| Allocation {
                id: AllocationId::new(),
                sale_id: sale.id,
                product_id: a.product_id,
                original_price: a.original_price,
                sale_price: a.sale_price,
                max_quantity: a.max_quantity,
                quantity_sold: 0,
            })
            .collect();

        {
            let mut sales = self.sales.write().await;
            sales.insert(sale.id, sale.clone());
        }
        {
            let mut cells = self.allocations.write().await;
            let mut by_sale = self.by_sale.write().await;
            let ids = allocations.iter().map(|a| a.id).collect();
            for allocation in &allocations {
                cells.insert(
                    allocation.id,
                    Arc::new(AllocationCell {
                        state: Mutex::new(AllocationState {
                            allocation: allocation.clone(),
                            claimed_by: HashMap::new(),
                            claims: Vec::new(),
                        }),
                    }),
                );
            }
            by_sale.insert(sale.id, ids);
        }

        Ok((sale, allocations))
    }

    async fn sale(&self, id: SaleId) -> EngineResult<Option<Sale>> {
        let sales = self.sales.read().await;
        Ok(sales.get(&id).cloned())
    }

    async fn allocation(&self, id: AllocationId) -> EngineResult<Option<Allocation>> {
        let Some(cell) = self.cell(id).await else {
            return Ok(None);
        };
        let state = cell.state.lock().await;
        Ok(Some(state.allocation.clone()))
    }

    async fn allocations_by_sale(&self, sale_id: SaleId) -> EngineResult<Vec<Allocation>> {
        let ids = {
            let by_sale = self.by_sale.read().await;
            by_sale.get(&sale_id).cloned().unwrap_or_default()
        };

        let mut allocations = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(cell) = self.cell(id).await {
                let state = cell.state.lock().await;
                allocations.push(state.allocation.clone());
            }
        }
        allocations.sort_by(|a, b| {
            b.percent_sold()
                .partial_cmp(&a.percent_sold())
                .unwrap_or(Ordering::Equal)
        });
        Ok(allocations)
    }

    async fn sales_with_status(&self, status: SaleStatus) -> EngineResult<Vec<Sale>> {
        let sales = self.sales.read().await;
        Ok(sales.values().filter(|s| s.status == status).cloned().collect())
    }

    async fn buyer_claimed(
        &self,
        allocation_id: AllocationId,
        buyer_id: BuyerId,
    ) -> EngineResult<u32> {
        let cell = self.cell(allocation_id).await.ok_or(EngineError::NotFound {
            resource: "allocation",
            id: *allocation_id.as_uuid(),
        })?;
        let state = cell.state.lock().await;
        Ok(state.claimed_by.get(&buyer_id).copied().unwrap_or(0))
    }

    async fn reserve(
        &self,
        request: &ReserveRequest,
        policy: &ReservePolicy,
        now: DateTime<Utc>,
    ) -> EngineResult<ReservationReceipt> {
        let cell = self
            .cell(request.allocation_id)
            .await
            .ok_or(EngineError::NotFound {
                resource: "allocation",
                id: *request.allocation_id.as_uuid(),
            })?;

        // Bounded lock wait, like the Postgres backend's lock_timeout.
        let Ok(mut state) = tokio::time::timeout(policy.lock_timeout, cell.state.lock()).await
        else {
            return Err(EngineError::Busy);
        };

        // Re-read the sale under the allocation lock so the status check and
        // the increment see a consistent world.
        let sale = {
            let sales = self.sales.read().await;
            sales
                .get(&state.allocation.sale_id)
                .cloned()
                .ok_or_else(|| EngineError::storage("allocation references missing sale"))?
        };

        let already_claimed = state.claimed_by.get(&request.buyer_id).copied().unwrap_or(0);
        reservation::evaluate(
            &sale,
            &state.allocation,
            already_claimed,
            request.quantity,
            now,
            policy.per_buyer_cap,
        )?;

        let frozen_price = state.allocation.sale_price;
        state.allocation.quantity_sold += request.quantity;
        *state.claimed_by.entry(request.buyer_id).or_insert(0) += request.quantity;
        state.claims.push(ClaimRecord {
            buyer_id: request.buyer_id,
            quantity: request.quantity,
            unit_price: frozen_price,
        });

        Ok(ReservationReceipt {
            allocation_id: request.allocation_id,
            reserved_price: frozen_price,
            reserved_quantity: request.quantity,
            remaining: state.allocation.remaining(),
        })
    }

    async fn cancel_sale(&self, id: SaleId, now: DateTime<Utc>) -> EngineResult<Sale> {
        let mut sales = self.sales.write().await;
        let sale = sales.get_mut(&id).ok_or(EngineError::NotFound {
            resource: "sale",
            id: *id.as_uuid(),
        })?;

        if !sale.can_cancel(now) {
            let reason = if sale.status == SaleStatus::Scheduled {
                "sale has already started"
            } else {
                "only scheduled sales can be cancelled"
            };
            return Err(EngineError::conflict(reason));
        }

        sale.status = SaleStatus::Cancelled;
        Ok(sale.clone())
    }

    async fn promote_due_sales(&self, now: DateTime<Utc>) -> EngineResult<Vec<Sale>> {
        let mut sales = self.sales.write().await;
        let mut promoted = Vec::new();
        for sale in sales.values_mut() {
            if sale.status == SaleStatus::Scheduled && now >= sale.starts_at {
                sale.status = SaleStatus::Active;
                promoted.push(sale.clone());
            }
        }
        Ok(promoted)
    }

    async fn close_expired_sales(&self, now: DateTime<Utc>) -> EngineResult<Vec<Sale>> {
        let mut sales = self.sales.write().await;
        let mut ended = Vec::new();
        for sale in sales.values_mut() {
            if sale.status == SaleStatus::Active && now >= sale.ends_at {
                sale.status = SaleStatus::Ended;
                ended.push(sale.clone());
            }
        }
        Ok(ended)
    }

    async fn set_sale_price(&self, allocation_id: AllocationId, price: Money) -> EngineResult<()> {
        let cell = self.cell(allocation_id).await.ok_or(EngineError::NotFound {
            resource: "allocation",
            id: *allocation_id.as_uuid(),
        })?;
        let mut state = cell.state.lock().await;
        state.allocation.sale_price = price;
        Ok(())
    }
}
