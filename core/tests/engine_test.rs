//! Engine behavior tests against the in-memory repository.
//!
//! Covers the reservation error taxonomy, lifecycle transitions, cache
//! invalidation, notification dispatch and price freezing.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use flash_sale_core::{
    ActiveSalesCache, AllocationEngine, EngineError, InMemoryActiveSalesCache, Money,
    NewAllocation, NewSale, ProductId, ReservePolicy, ReserveRequest, SaleRepository, SaleStatus,
};
use flash_sale_testing::{InMemorySaleRepository, RecordingDispatcher, StaticCatalog, TestClock};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    engine: AllocationEngine,
    repository: Arc<InMemorySaleRepository>,
    cache: Arc<InMemoryActiveSalesCache>,
    dispatcher: RecordingDispatcher,
    clock: TestClock,
}

fn harness() -> Harness {
    let repository = Arc::new(InMemorySaleRepository::new());
    let cache = Arc::new(InMemoryActiveSalesCache::new(Duration::from_secs(300)));
    let dispatcher = RecordingDispatcher::new();
    let clock = TestClock::new(Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap());

    let engine = AllocationEngine::new(
        repository.clone(),
        cache.clone(),
        Arc::new(dispatcher.clone()),
        Arc::new(StaticCatalog::default()),
        Arc::new(clock.clone()),
        ReservePolicy {
            per_buyer_cap: 2,
            lock_timeout: Duration::from_secs(1),
        },
    );

    Harness {
        engine,
        repository,
        cache,
        dispatcher,
        clock,
    }
}

/// Sale scheduled 10:00-12:00 on 2026-07-01 with one allocation.
fn draft(max_quantity: u32) -> NewSale {
    NewSale {
        title: "Summer Flash".to_string(),
        description: "Two hours only".to_string(),
        starts_at: Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap(),
        ends_at: Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
        discount_percent: 40,
        allocations: vec![NewAllocation {
            product_id: ProductId::new(),
            original_price: Money::from_minor_units(10_000),
            sale_price: Money::from_minor_units(6_000),
            max_quantity,
        }],
    }
}

#[tokio::test]
async fn test_reserve_succeeds_during_active_window() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(10)).await.unwrap();
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 10, 30, 0).unwrap());
    assert_eq!(h.engine.promote_scheduled_sales().await.unwrap(), 1);

    let receipt = h
        .engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 2,
        })
        .await
        .unwrap();

    assert_eq!(receipt.reserved_quantity, 2);
    assert_eq!(receipt.reserved_price, Money::from_minor_units(6_000));
    assert_eq!(receipt.remaining, 8);
}

#[tokio::test]
async fn test_reserve_zero_quantity_is_invalid_request() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(10)).await.unwrap();

    let err = h
        .engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 0,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_reserve_unknown_allocation_is_not_found() {
    let h = harness();
    let err = h
        .engine
        .reserve(ReserveRequest {
            allocation_id: flash_sale_core::AllocationId::new(),
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { resource: "allocation", .. }));
}

#[tokio::test]
async fn test_time_window_enforcement() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(10)).await.unwrap();
    let buyer = flash_sale_core::BuyerId::new();
    let request = ReserveRequest {
        allocation_id: allocations[0].id,
        buyer_id: buyer,
        quantity: 1,
    };

    // Before the window, still scheduled: rejected with the window attached.
    let err = h.engine.reserve(request).await.unwrap_err();
    assert!(matches!(err, EngineError::SaleNotActive { .. }));

    // Scheduler promotes once the window opens; the same call now succeeds.
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap());
    assert_eq!(h.engine.promote_scheduled_sales().await.unwrap(), 1);
    h.engine.reserve(request).await.unwrap();

    // Past the end time the sale rejects even though its status is still
    // Active (the scheduler has not run): live time check, not stored status.
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap());
    let err = h.engine.reserve(request).await.unwrap_err();
    assert!(matches!(err, EngineError::SaleNotActive { .. }));
}

#[tokio::test]
async fn test_per_buyer_cap_enforced_sequentially() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(10)).await.unwrap();
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap());
    h.engine.promote_scheduled_sales().await.unwrap();

    let buyer = flash_sale_core::BuyerId::new();
    let request = ReserveRequest {
        allocation_id: allocations[0].id,
        buyer_id: buyer,
        quantity: 1,
    };

    h.engine.reserve(request).await.unwrap();
    h.engine.reserve(request).await.unwrap();
    let err = h.engine.reserve(request).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::PurchaseLimitExceeded {
            already_claimed: 2,
            cap: 2,
        }
    );

    // A different buyer is unaffected.
    let other = flash_sale_core::BuyerId::new();
    h.engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: other,
            quantity: 2,
        })
        .await
        .unwrap();

    assert_eq!(h.engine.buyer_claimed(allocations[0].id, buyer).await.unwrap(), 2);
}

#[tokio::test]
async fn test_insufficient_stock_reports_remaining() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(3)).await.unwrap();
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap());
    h.engine.promote_scheduled_sales().await.unwrap();

    h.engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 2,
        })
        .await
        .unwrap();

    let err = h
        .engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 2,
        })
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InsufficientStock { remaining: 1 });
}

#[tokio::test]
async fn test_price_freezing() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(10)).await.unwrap();
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap());
    h.engine.promote_scheduled_sales().await.unwrap();

    let receipt = h
        .engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 1,
        })
        .await
        .unwrap();
    assert_eq!(receipt.reserved_price, Money::from_minor_units(6_000));

    // Operator reprices after the reservation.
    h.repository
        .set_sale_price(allocations[0].id, Money::from_minor_units(9_000))
        .await
        .unwrap();

    // The recorded claim keeps the price frozen at reservation time.
    let claims = h.repository.claims(allocations[0].id).await;
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].unit_price, Money::from_minor_units(6_000));

    // The next reservation sees the new price.
    let receipt = h
        .engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 1,
        })
        .await
        .unwrap();
    assert_eq!(receipt.reserved_price, Money::from_minor_units(9_000));
}

#[tokio::test]
async fn test_cancellation_guard() {
    let h = harness();

    // Cancelling a future scheduled sale succeeds and kills reservations.
    let (sale, allocations) = h.engine.create_sale(draft(10)).await.unwrap();
    let cancelled = h.engine.cancel_sale(sale.id).await.unwrap();
    assert_eq!(cancelled.status, SaleStatus::Cancelled);

    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap());
    assert_eq!(h.engine.promote_scheduled_sales().await.unwrap(), 0);
    let err = h
        .engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SaleNotActive { .. }));

    // A sale whose start time has passed can no longer be cancelled, even
    // if the scheduler has not flipped it yet.
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap());
    let (sale, _) = h.engine.create_sale(draft(10)).await.unwrap();
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 10, 30, 0).unwrap());
    let err = h.engine.cancel_sale(sale.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    // An active sale can't be cancelled either.
    h.engine.promote_scheduled_sales().await.unwrap();
    let err = h.engine.cancel_sale(sale.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));
}

#[tokio::test]
async fn test_lifecycle_ticks_are_idempotent() {
    let h = harness();
    let (sale, _) = h.engine.create_sale(draft(10)).await.unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap());
    assert_eq!(h.engine.promote_scheduled_sales().await.unwrap(), 1);
    assert_eq!(h.engine.promote_scheduled_sales().await.unwrap(), 0);

    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap());
    assert_eq!(h.engine.close_expired_sales().await.unwrap(), 1);
    // Re-running with nothing newly expired: no state change, no error.
    assert_eq!(h.engine.close_expired_sales().await.unwrap(), 0);

    let (sale, _) = h.engine.sale(sale.id).await.unwrap();
    assert_eq!(sale.status, SaleStatus::Ended);
}

#[tokio::test]
async fn test_promotion_notifies_interested_buyers_once() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(10)).await.unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap());
    h.engine.promote_scheduled_sales().await.unwrap();
    // Dispatch is fire-and-forget on a spawned task; give it a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let dispatched = h.dispatcher.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].sale_title, "Summer Flash");
    assert_eq!(dispatched[0].allocation_ids, vec![allocations[0].id]);

    // An idempotent re-tick does not re-notify.
    h.engine.promote_scheduled_sales().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.dispatcher.dispatched().len(), 1);
}

#[tokio::test]
async fn test_active_sales_cache_read_through_and_invalidation() {
    let h = harness();
    let (_, allocations) = h.engine.create_sale(draft(10)).await.unwrap();
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 10, 30, 0).unwrap());
    h.engine.promote_scheduled_sales().await.unwrap();

    let listing = h.engine.active_sales().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].allocations[0].remaining, 10);
    // The snapshot is now cached.
    assert!(h.cache.get().await.is_some());

    // A reservation invalidates the cache so counts refresh promptly.
    h.engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 2,
        })
        .await
        .unwrap();
    assert!(h.cache.get().await.is_none());

    let listing = h.engine.active_sales().await.unwrap();
    assert_eq!(listing[0].allocations[0].remaining, 8);
    assert_eq!(listing[0].allocations[0].quantity_sold, 2);

    // Closing the sale empties the active list.
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap());
    h.engine.close_expired_sales().await.unwrap();
    assert!(h.cache.get().await.is_none());
    assert!(h.engine.active_sales().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_active_listing_orders_allocations_by_percent_sold() {
    let h = harness();
    let mut sale_draft = draft(10);
    sale_draft.allocations.push(NewAllocation {
        product_id: ProductId::new(),
        original_price: Money::from_minor_units(5_000),
        sale_price: Money::from_minor_units(2_500),
        max_quantity: 4,
    });
    let (_, allocations) = h.engine.create_sale(sale_draft).await.unwrap();
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 1, 10, 30, 0).unwrap());
    h.engine.promote_scheduled_sales().await.unwrap();

    // Sell 3 of 4 from the second allocation (75%), 1 of 10 from the first.
    for _ in 0..3 {
        h.engine
            .reserve(ReserveRequest {
                allocation_id: allocations[1].id,
                buyer_id: flash_sale_core::BuyerId::new(),
                quantity: 1,
            })
            .await
            .unwrap();
    }
    h.engine
        .reserve(ReserveRequest {
            allocation_id: allocations[0].id,
            buyer_id: flash_sale_core::BuyerId::new(),
            quantity: 1,
        })
        .await
        .unwrap();

    let listing = h.engine.active_sales().await.unwrap();
    let entries = &listing[0].allocations;
    assert_eq!(entries[0].allocation_id, allocations[1].id);
    assert_eq!(entries[1].allocation_id, allocations[0].id);
}

#[tokio::test]
async fn test_create_sale_rejects_inverted_window() {
    let h = harness();
    let mut bad = draft(10);
    std::mem::swap(&mut bad.starts_at, &mut bad.ends_at);
    let err = h.engine.create_sale(bad).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");

    let mut past = draft(10);
    past.starts_at = h.clock_now() - ChronoDuration::hours(3);
    past.ends_at = h.clock_now() - ChronoDuration::hours(1);
    let err = h.engine.create_sale(past).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_REQUEST");
}

impl Harness {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use flash_sale_core::Clock;
        self.clock.now()
    }
}
