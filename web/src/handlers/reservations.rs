//! Reservation endpoint: the contended path of the whole system.
//!
//! `POST /api/sales/:sale_id/allocations/:allocation_id/reserve`

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use flash_sale_core::{AllocationId, BuyerId, ReservationReceipt, ReserveRequest};
use serde::Deserialize;
use uuid::Uuid;

/// Request to reserve discounted units.
#[derive(Debug, Deserialize)]
pub struct ReserveBody {
    /// The buyer claiming the units
    pub buyer_id: Uuid,
    /// Units requested
    pub quantity: u32,
}

/// Reserve units from an allocation for a buyer.
///
/// Returns 200 with a receipt carrying the frozen price, the reserved
/// quantity and the remaining stock. Rejections: 404 unknown allocation,
/// 409 `SALE_NOT_ACTIVE` / `INSUFFICIENT_STOCK` / `PURCHASE_LIMIT_EXCEEDED`,
/// 422 zero quantity, 503 `BUSY` when the lock wait budget is exhausted.
pub async fn reserve(
    State(state): State<AppState>,
    Path((sale_id, allocation_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ReserveBody>,
) -> Result<Json<ReservationReceipt>, ApiError> {
    // A mismatched path must not reserve from an unrelated sale.
    let allocation_id = AllocationId::from_uuid(allocation_id);
    let (sale, allocations) = state
        .engine
        .sale(flash_sale_core::SaleId::from_uuid(sale_id))
        .await?;
    if !allocations.iter().any(|a| a.id == allocation_id) {
        return Err(ApiError::not_found("allocation", allocation_id));
    }

    let receipt = state
        .engine
        .reserve(ReserveRequest {
            allocation_id,
            buyer_id: BuyerId::from_uuid(body.buyer_id),
            quantity: body.quantity,
        })
        .await?;

    tracing::debug!(sale_id = %sale.id, allocation_id = %allocation_id, "reservation served");
    Ok(Json(receipt))
}
