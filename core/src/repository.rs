//! Durable storage seam for sales and allocations.
//!
//! The repository is a dumb, transactional data-access layer: it exposes
//! CRUD, the two read queries the engine depends on, and the one atomic
//! primitive at the heart of the system ([`SaleRepository::reserve`]). All
//! business rules live in [`crate::reservation`]; implementations only
//! supply atomicity, by whatever locking mechanism fits the backend (row
//! locks in Postgres, a keyed mutex in the in-memory test store).

use crate::error::EngineResult;
use crate::reservation::ReservePolicy;
use crate::types::{
    Allocation, AllocationId, BuyerId, NewSale, ReservationReceipt, ReserveRequest, Sale, SaleId,
    SaleStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable store of sale definitions and sale-product allocation records.
#[async_trait]
pub trait SaleRepository: Send + Sync {
    /// Persist a new scheduled sale with its allocations.
    ///
    /// The draft has already been validated by the engine; the repository
    /// assigns identifiers and stores the rows.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn create_sale(&self, draft: &NewSale, now: DateTime<Utc>)
    -> EngineResult<(Sale, Vec<Allocation>)>;

    /// Load a sale by id.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn sale(&self, id: SaleId) -> EngineResult<Option<Sale>>;

    /// Load an allocation by id.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn allocation(&self, id: AllocationId) -> EngineResult<Option<Allocation>>;

    /// All allocations of a sale, ordered by percent sold descending
    /// (display order: scarcest first).
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn allocations_by_sale(&self, sale_id: SaleId) -> EngineResult<Vec<Allocation>>;

    /// All sales currently in the given persisted status.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn sales_with_status(&self, status: SaleStatus) -> EngineResult<Vec<Sale>>;

    /// Sum of a buyer's prior claims for an allocation across all
    /// non-cancelled, non-refunded order lines. The cap-enforcement
    /// cross-reference; the order subsystem is the system of record.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn buyer_claimed(
        &self,
        allocation_id: AllocationId,
        buyer_id: BuyerId,
    ) -> EngineResult<u32>;

    /// Atomically reserve units against the shared stock counter.
    ///
    /// Implementations must execute the whole sequence as one serializable
    /// unit per allocation: acquire the allocation's exclusive lock (bounded
    /// by `policy.lock_timeout`, failing `Busy`), serialize same-buyer
    /// requests, re-read sale and claims under lock, run
    /// [`crate::reservation::evaluate`], increment `quantity_sold`, record
    /// the claim with the price frozen at reservation time, commit. Any
    /// failure leaves `quantity_sold` unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound`, `SaleNotActive`, `InsufficientStock`,
    /// `PurchaseLimitExceeded`, `Busy` as expected outcomes; `Storage` on
    /// infrastructure failure.
    async fn reserve(
        &self,
        request: &ReserveRequest,
        policy: &ReservePolicy,
        now: DateTime<Utc>,
    ) -> EngineResult<ReservationReceipt>;

    /// Cancel a sale that is still scheduled and has not started.
    ///
    /// Implementations take the sale's lock before checking, so cancellation
    /// serializes against a racing promotion.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown sale, `Conflict` if the sale has started or
    /// left the scheduled state, `Storage` on infrastructure failure.
    async fn cancel_sale(&self, id: SaleId, now: DateTime<Utc>) -> EngineResult<Sale>;

    /// Promote every scheduled sale whose window has opened. Idempotent:
    /// re-running with nothing due is a no-op. Returns the promoted sales.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn promote_due_sales(&self, now: DateTime<Utc>) -> EngineResult<Vec<Sale>>;

    /// End every active sale whose window has closed. Idempotent. The status
    /// write takes the same locks as the reserve path so a purchase cannot
    /// sneak in against a sale being closed out. Returns the ended sales.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    async fn close_expired_sales(&self, now: DateTime<Utc>) -> EngineResult<Vec<Sale>>;

    /// Operator edit of an allocation's sale price. Never touches recorded
    /// claims: prices already reserved stay frozen.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown allocation, `Storage` on infrastructure
    /// failure.
    async fn set_sale_price(
        &self,
        allocation_id: AllocationId,
        price: crate::types::Money,
    ) -> EngineResult<()>;
}
