//! # Flash Sale Core
//!
//! Domain core of the time-windowed promotional inventory engine: the
//! subsystem that allocates a limited, shared stock of discounted units to
//! many concurrently-competing buyers inside a strict activation/expiry
//! window, guaranteeing no unit is oversold and no buyer exceeds the
//! per-sale purchase cap.
//!
//! ## Components
//!
//! - [`types`]: sales, allocations, receipts and storefront summaries
//! - [`reservation`]: the pure, ordered purchase-precondition rules shared
//!   by every storage backend
//! - [`repository`]: the transactional storage seam, including the atomic
//!   reserve primitive
//! - [`engine`]: orchestration of reserve, operator actions and cache
//!   read-through
//! - [`lifecycle`]: the scheduler-driven `scheduled → active → ended`
//!   state machine
//! - [`cache`]: the short-TTL active-sales read cache
//! - [`collaborators`]: notification and catalog seams (external systems)
//!
//! ## Concurrency contract
//!
//! `quantity_sold` is the single shared mutable counter at the heart of
//! this system. It is only mutated inside a transaction that validated the
//! sale's live window and read the pre-mutation value under the
//! allocation's exclusive lock. Lock acquisition is bounded: contention
//! past the timeout surfaces as a retryable [`error::EngineError::Busy`],
//! never as an unbounded queue.

pub mod cache;
pub mod collaborators;
pub mod engine;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod repository;
pub mod reservation;
pub mod types;

pub use cache::{ActiveSalesCache, InMemoryActiveSalesCache, NoopCache, ACTIVE_SALES_KEY};
pub use collaborators::{Catalog, EmptyCatalog, LogOnlyDispatcher, NotificationDispatcher};
pub use engine::AllocationEngine;
pub use environment::{Clock, SystemClock};
pub use error::{EngineError, EngineResult};
pub use lifecycle::LifecycleScheduler;
pub use repository::SaleRepository;
pub use reservation::ReservePolicy;
pub use types::{
    ActiveSaleSummary, Allocation, AllocationId, AllocationSummary, BuyerId, Money, NewAllocation,
    NewSale, ProductId, ProductInfo, ReservationReceipt, ReserveRequest, Sale, SaleId, SaleStatus,
};
