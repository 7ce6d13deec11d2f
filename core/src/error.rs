//! Error taxonomy for the allocation engine.
//!
//! Every buyer-facing rejection is a distinct, machine-distinguishable kind
//! with the payload the storefront needs to render it ("sold out" shows the
//! remaining count, "limit reached" shows the cap). Only infrastructure
//! failures are opaque.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// All expected, recoverable outcomes of engine operations, plus the one
/// unexpected kind (`Storage`).
///
/// The five buyer-facing kinds (`InvalidRequest`, `NotFound`,
/// `SaleNotActive`, `InsufficientStock`, `PurchaseLimitExceeded`) plus
/// `Busy` are returned to callers as structured results, never raised as
/// faults. Ambiguous states fail closed: the engine never allows a
/// reservation it could not fully validate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed input; the client must fix the request.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request
        reason: String,
    },

    /// Unknown sale or allocation.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of entity that was missing ("sale", "allocation")
        resource: &'static str,
        /// Identifier that was looked up
        id: Uuid,
    },

    /// The sale is outside its active window or its status is not active.
    /// Carries the window so the client can display a countdown.
    #[error("sale is not active (window {starts_at} to {ends_at})")]
    SaleNotActive {
        /// When the sale opens
        starts_at: DateTime<Utc>,
        /// When the sale closes
        ends_at: DateTime<Utc>,
    },

    /// Fewer units remain than were requested. Carries the actual remaining
    /// count so the caller can offer a reduced quantity.
    #[error("insufficient stock: {remaining} unit(s) remaining")]
    InsufficientStock {
        /// Units still available
        remaining: u32,
    },

    /// The buyer's cumulative claims plus this request would exceed the
    /// per-buyer cap.
    #[error("purchase limit exceeded: {already_claimed} of {cap} unit(s) already claimed")]
    PurchaseLimitExceeded {
        /// Units this buyer has already claimed
        already_claimed: u32,
        /// Per-buyer cap for this sale
        cap: u32,
    },

    /// The allocation row lock could not be acquired within the bounded
    /// wait. Retryable by the client with backoff.
    #[error("allocation is busy, retry shortly")]
    Busy,

    /// Operator action rejected, e.g. cancelling a sale that already started.
    #[error("conflict: {reason}")]
    Conflict {
        /// Why the action was rejected
        reason: String,
    },

    /// Infrastructure failure (storage unreachable, corrupt row). Logged for
    /// operational alerting; never produced by business-rule rejections.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Stable string code surfaced to API clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::SaleNotActive { .. } => "SALE_NOT_ACTIVE",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::PurchaseLimitExceeded { .. } => "PURCHASE_LIMIT_EXCEEDED",
            Self::Busy => "BUSY",
            Self::Conflict { .. } => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Whether the client may retry the same request unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Convenience constructor for [`EngineError::InvalidRequest`].
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`EngineError::Conflict`].
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`EngineError::Storage`].
    #[must_use]
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            EngineError::invalid("q"),
            EngineError::NotFound {
                resource: "sale",
                id: Uuid::nil(),
            },
            EngineError::SaleNotActive {
                starts_at: Utc::now(),
                ends_at: Utc::now(),
            },
            EngineError::InsufficientStock { remaining: 0 },
            EngineError::PurchaseLimitExceeded {
                already_claimed: 2,
                cap: 2,
            },
            EngineError::Busy,
            EngineError::conflict("started"),
            EngineError::storage("down"),
        ];
        let mut codes: Vec<&str> = errors.iter().map(EngineError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_busy_is_retryable() {
        assert!(EngineError::Busy.is_retryable());
        assert!(!EngineError::InsufficientStock { remaining: 3 }.is_retryable());
        assert!(!EngineError::storage("down").is_retryable());
    }
}
