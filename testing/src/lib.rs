//! # Flash Sale Testing
//!
//! Testing utilities for the flash-sale workspace:
//!
//! - [`mocks::InMemorySaleRepository`]: a full `SaleRepository` backed by a
//!   per-allocation `tokio` mutex, the keyed-lock realization of the same
//!   locking discipline the Postgres backend achieves with row locks. Used
//!   by the engine's property tests (no-oversell, per-buyer cap) so they
//!   run without a database.
//! - [`mocks::TestClock`]: settable time, for driving the lifecycle state
//!   machine deterministically.
//! - [`mocks::RecordingDispatcher`]: captures notification dispatches.
//! - [`mocks::StaticCatalog`]: fixed product metadata.

pub mod mocks;

pub use mocks::{InMemorySaleRepository, RecordingDispatcher, StaticCatalog, TestClock};
