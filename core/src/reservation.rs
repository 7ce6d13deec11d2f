//! Pure reservation rules.
//!
//! The ordered precondition checks of a purchase attempt, factored out of
//! any particular storage backend. Every repository implementation runs
//! [`evaluate`] while holding its allocation lock, so the rules are written
//! once and the backends differ only in how they achieve atomicity.

use crate::error::{EngineError, EngineResult};
use crate::types::{Allocation, Sale};
use chrono::{DateTime, Utc};

/// Policy knobs for the reservation path.
#[derive(Clone, Copy, Debug)]
pub struct ReservePolicy {
    /// Maximum units a single buyer may claim per allocation across all
    /// non-cancelled orders.
    pub per_buyer_cap: u32,
    /// Bounded wait for the allocation row lock before failing `Busy`.
    pub lock_timeout: std::time::Duration,
}

impl Default for ReservePolicy {
    fn default() -> Self {
        Self {
            per_buyer_cap: 2,
            lock_timeout: std::time::Duration::from_secs(3),
        }
    }
}

/// Validate a reservation attempt against a sale and its allocation.
///
/// Checks run in order, each producing a distinct rejection:
///
/// 1. `quantity > 0`, else `InvalidRequest`
/// 2. the owning sale is live (persisted status `Active` **and**
///    `starts_at <= now < ends_at`), else `SaleNotActive`
/// 3. sufficient remaining stock, else `InsufficientStock` with the actual
///    remaining count
/// 4. the buyer's prior claims plus this request fit under the per-buyer
///    cap, else `PurchaseLimitExceeded` with the claimed count and cap
///
/// Existence checks (`NotFound`) happen before this function is reached,
/// when the caller loads the rows. The caller must hold the allocation's
/// exclusive lock so the stock check and the subsequent increment form one
/// serializable unit, and must read `already_claimed` under a lock that
/// serializes same-buyer requests so the cap is exact.
///
/// # Errors
///
/// One of the rejection kinds above, in precedence order.
pub fn evaluate(
    sale: &Sale,
    allocation: &Allocation,
    already_claimed: u32,
    quantity: u32,
    now: DateTime<Utc>,
    per_buyer_cap: u32,
) -> EngineResult<()> {
    if quantity == 0 {
        return Err(EngineError::invalid("quantity must be greater than zero"));
    }

    if !sale.is_live(now) {
        return Err(EngineError::SaleNotActive {
            starts_at: sale.starts_at,
            ends_at: sale.ends_at,
        });
    }

    let remaining = allocation.remaining();
    if remaining < quantity {
        return Err(EngineError::InsufficientStock { remaining });
    }

    if already_claimed.saturating_add(quantity) > per_buyer_cap {
        return Err(EngineError::PurchaseLimitExceeded {
            already_claimed,
            cap: per_buyer_cap,
        });
    }

    Ok(())
}
