//! Domain types for the flash-sale allocation engine.
//!
//! This module contains the value objects and entities at the heart of the
//! system: sales (time-windowed promotional campaigns), allocations (the
//! contested units of discounted stock) and the summary types served to
//! read-heavy storefront traffic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a sale
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaleId(Uuid);

impl SaleId {
    /// Creates a new random `SaleId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SaleId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SaleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a sale-product allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllocationId(Uuid);

impl AllocationId {
    /// Creates a new random `AllocationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `AllocationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AllocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a buyer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuyerId(Uuid);

impl BuyerId {
    /// Creates a new random `BuyerId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BuyerId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BuyerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuyerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a catalog product
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(Uuid);

impl ProductId {
    /// Creates a new random `ProductId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ProductId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (minor-units based to avoid floating point errors)
// ============================================================================

/// Represents a price in minor currency units (cents, kobo, ...) to avoid
/// floating-point arithmetic errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor_units(units: u64) -> Self {
        Self(units)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor_units(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Sale lifecycle status
// ============================================================================

/// Lifecycle status of a sale.
///
/// Transitions are one-way: `Scheduled → Active → Ended`, with
/// `Scheduled → Cancelled` as the only other legal transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Created by an operator, waiting for its start time
    Scheduled,
    /// Within its time window, accepting reservations
    Active,
    /// Past its end time; no further reservations succeed
    Ended,
    /// Cancelled by an operator before it started
    Cancelled,
}

impl SaleStatus {
    /// Stable database/API representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the stable representation produced by [`Self::as_str`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a transition to `next` is legal. No transition is reversible.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Active | Self::Cancelled) | (Self::Active, Self::Ended)
        )
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sale
// ============================================================================

/// A time-windowed promotional campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Sale identifier
    pub id: SaleId,
    /// Display title
    pub title: String,
    /// Display description
    pub description: String,
    /// When the sale opens (inclusive)
    pub starts_at: DateTime<Utc>,
    /// When the sale closes (exclusive)
    pub ends_at: DateTime<Utc>,
    /// Informational discount percentage; actual prices live on allocations
    pub discount_percent: u8,
    /// Persisted lifecycle status
    pub status: SaleStatus,
    /// When the sale record was created
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// Whether `now` falls inside the sale's time window.
    #[must_use]
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    /// Whether reservations may succeed right now.
    ///
    /// The persisted status may lag wall-clock by up to one scheduler tick,
    /// so both the status and the live window are consulted: a sale whose
    /// `Active` status has not yet been flipped past its end time still
    /// rejects purchases, and a still-`Scheduled` sale rejects purchases
    /// before its start even if a tick is overdue.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == SaleStatus::Active && self.window_contains(now)
    }

    /// Whether an operator may still cancel this sale.
    ///
    /// Cancellation is only legal while the sale is `Scheduled` and its
    /// window has not opened, so in-flight reservations can never be
    /// invalidated by a cancellation.
    #[must_use]
    pub fn can_cancel(&self, now: DateTime<Utc>) -> bool {
        self.status == SaleStatus::Scheduled && now < self.starts_at
    }
}

// ============================================================================
// Allocation
// ============================================================================

/// A sale-product entry: the unit of contested inventory.
///
/// The central correctness property of the whole system lives here:
/// `0 <= quantity_sold <= max_quantity` at all times, even under unbounded
/// concurrent purchase attempts. `quantity_sold` only ever increases, and
/// only inside a reservation transaction that holds this row's lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Allocation identifier
    pub id: AllocationId,
    /// Owning sale
    pub sale_id: SaleId,
    /// Catalog product on offer
    pub product_id: ProductId,
    /// Price before the promotion
    pub original_price: Money,
    /// Discounted price; frozen into claims at reservation time
    pub sale_price: Money,
    /// Maximum number of discounted units offered
    pub max_quantity: u32,
    /// Units reserved so far; monotonically increasing
    pub quantity_sold: u32,
}

impl Allocation {
    /// Units still available for reservation.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.max_quantity.saturating_sub(self.quantity_sold)
    }

    /// Fraction of stock sold, in percent. Used to order storefront display
    /// ("almost gone" first).
    #[must_use]
    pub fn percent_sold(&self) -> f64 {
        if self.max_quantity == 0 {
            return 0.0;
        }
        f64::from(self.quantity_sold) / f64::from(self.max_quantity) * 100.0
    }
}

// ============================================================================
// Operator drafts
// ============================================================================

/// Draft for a new sale, assembled by an operator before the sale opens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewSale {
    /// Display title
    pub title: String,
    /// Display description
    pub description: String,
    /// When the sale opens
    pub starts_at: DateTime<Utc>,
    /// When the sale closes
    pub ends_at: DateTime<Utc>,
    /// Informational discount percentage
    pub discount_percent: u8,
    /// Stock allocations offered in this sale
    pub allocations: Vec<NewAllocation>,
}

/// Draft for a single allocation inside a [`NewSale`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewAllocation {
    /// Catalog product on offer
    pub product_id: ProductId,
    /// Price before the promotion
    pub original_price: Money,
    /// Discounted price
    pub sale_price: Money,
    /// Maximum number of discounted units offered
    pub max_quantity: u32,
}

// ============================================================================
// Reservation
// ============================================================================

/// A buyer's request to reserve discounted units.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// Allocation to draw stock from
    pub allocation_id: AllocationId,
    /// Buyer making the purchase
    pub buyer_id: BuyerId,
    /// Units requested
    pub quantity: u32,
}

/// Result of a successful reservation.
///
/// `reserved_price` is the allocation's sale price frozen at reservation
/// time; later price edits never retroactively affect it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReceipt {
    /// Allocation the units were drawn from
    pub allocation_id: AllocationId,
    /// Per-unit price frozen at reservation time
    pub reserved_price: Money,
    /// Units reserved
    pub reserved_quantity: u32,
    /// Units still available after this reservation
    pub remaining: u32,
}

// ============================================================================
// Storefront summaries (cache payload)
// ============================================================================

/// Product metadata pulled from the read-only catalog for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Product display name
    pub name: String,
    /// Product image URL, if any
    pub image_url: Option<String>,
}

/// Per-allocation view served to the storefront.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationSummary {
    /// Allocation identifier
    pub allocation_id: AllocationId,
    /// Catalog product
    pub product_id: ProductId,
    /// Product name, when the catalog had it
    pub product_name: Option<String>,
    /// Product image URL, when the catalog had it
    pub product_image: Option<String>,
    /// Price before the promotion
    pub original_price: Money,
    /// Discounted price
    pub sale_price: Money,
    /// Maximum units offered
    pub max_quantity: u32,
    /// Units reserved so far
    pub quantity_sold: u32,
    /// Units remaining ("3 left!")
    pub remaining: u32,
}

/// An active sale with its allocations, as served to read-heavy storefront
/// traffic. This is the value cached by the active-sales cache; brief
/// staleness is acceptable, correctness never depends on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveSaleSummary {
    /// Sale identifier
    pub sale_id: SaleId,
    /// Display title
    pub title: String,
    /// Display description
    pub description: String,
    /// Informational discount percentage
    pub discount_percent: u8,
    /// When the sale opened
    pub starts_at: DateTime<Utc>,
    /// When the sale closes (for countdown display)
    pub ends_at: DateTime<Utc>,
    /// Allocations ordered by percent sold, descending
    pub allocations: Vec<AllocationSummary>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sale_at(status: SaleStatus, start_h: u32, end_h: u32) -> Sale {
        Sale {
            id: SaleId::new(),
            title: "Summer Flash".to_string(),
            description: "test".to_string(),
            starts_at: Utc.with_ymd_and_hms(2026, 7, 1, start_h, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 7, 1, end_h, 0, 0).unwrap(),
            discount_percent: 20,
            status,
            created_at: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_status_transitions() {
        use SaleStatus::{Active, Cancelled, Ended, Scheduled};
        assert!(Scheduled.can_transition_to(Active));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Ended));

        // No transition is reversible
        assert!(!Active.can_transition_to(Scheduled));
        assert!(!Ended.can_transition_to(Active));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Active.can_transition_to(Cancelled));
        assert!(!Ended.can_transition_to(Scheduled));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SaleStatus::Scheduled,
            SaleStatus::Active,
            SaleStatus::Ended,
            SaleStatus::Cancelled,
        ] {
            assert_eq!(SaleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SaleStatus::parse("bogus"), None);
    }

    #[test]
    fn test_is_live_requires_status_and_window() {
        let sale = sale_at(SaleStatus::Active, 10, 12);
        let inside = Utc.with_ymd_and_hms(2026, 7, 1, 11, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        assert!(sale.is_live(inside));
        // End boundary is exclusive: a lagging scheduler must not admit
        // purchases past the end time.
        assert!(!sale.is_live(after));

        let scheduled = sale_at(SaleStatus::Scheduled, 10, 12);
        assert!(!scheduled.is_live(inside));
    }

    #[test]
    fn test_can_cancel_only_before_start() {
        let sale = sale_at(SaleStatus::Scheduled, 10, 12);
        let before = Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap();
        let at_start = Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap();
        assert!(sale.can_cancel(before));
        assert!(!sale.can_cancel(at_start));
        assert!(!sale_at(SaleStatus::Active, 10, 12).can_cancel(before));
    }

    #[test]
    fn test_allocation_remaining_and_percent() {
        let allocation = Allocation {
            id: AllocationId::new(),
            sale_id: SaleId::new(),
            product_id: ProductId::new(),
            original_price: Money::from_minor_units(10_000),
            sale_price: Money::from_minor_units(7_500),
            max_quantity: 40,
            quantity_sold: 10,
        };
        assert_eq!(allocation.remaining(), 30);
        assert!((allocation.percent_sold() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_minor_units(7_550).to_string(), "75.50");
        assert!(Money::from_minor_units(0).is_zero());
    }
}
