//! Sale management endpoints.
//!
//! - `POST /api/sales` - create a scheduled sale (operator)
//! - `PATCH /api/sales/:id/status` - cancel before start (operator)
//! - `GET /api/sales/:id` - sale detail with allocations
//! - `GET /api/sales/active` - cache-backed storefront listing

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use flash_sale_core::{
    ActiveSaleSummary, Allocation, Money, NewAllocation, NewSale, ProductId, Sale, SaleId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// One allocation in a sale creation request. Prices are minor currency
/// units (cents).
#[derive(Debug, Deserialize)]
pub struct CreateAllocationRequest {
    /// Catalog product to discount
    pub product_id: Uuid,
    /// Regular price, minor units
    pub original_price: u64,
    /// Discounted price, minor units
    pub sale_price: u64,
    /// Maximum units sellable at the discounted price
    pub max_quantity: u32,
}

/// Request to create a new sale.
#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    /// Display title
    pub title: String,
    /// Display description
    #[serde(default)]
    pub description: String,
    /// When the sale opens
    pub starts_at: DateTime<Utc>,
    /// When the sale closes
    pub ends_at: DateTime<Utc>,
    /// Informational discount percentage (0..=100)
    pub discount_percent: u8,
    /// Product allocations offered in the sale
    pub allocations: Vec<CreateAllocationRequest>,
}

/// A sale with its allocations, as returned by create and detail reads.
#[derive(Debug, Serialize)]
pub struct SaleResponse {
    /// The sale
    pub sale: Sale,
    /// Its allocations, scarcest first
    pub allocations: Vec<Allocation>,
}

/// Request to change a sale's status. Cancellation is the only
/// operator-initiated transition; activation and expiry belong to the
/// scheduler.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// Requested status; must be `"cancelled"`
    pub status: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a scheduled sale.
///
/// Returns 201 with the persisted sale and its allocations, or 422 when
/// the draft fails validation (inverted window, past window, discount over
/// 100, no allocations, zero-unit allocation).
pub async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<SaleResponse>), ApiError> {
    let draft = NewSale {
        title: request.title,
        description: request.description,
        starts_at: request.starts_at,
        ends_at: request.ends_at,
        discount_percent: request.discount_percent,
        allocations: request
            .allocations
            .into_iter()
            .map(|a| NewAllocation {
                product_id: ProductId::from_uuid(a.product_id),
                original_price: Money::from_minor_units(a.original_price),
                sale_price: Money::from_minor_units(a.sale_price),
                max_quantity: a.max_quantity,
            })
            .collect(),
    };

    let (sale, allocations) = state.engine.create_sale(draft).await?;
    Ok((StatusCode::CREATED, Json(SaleResponse { sale, allocations })))
}

/// Cancel a sale that has not started.
///
/// Returns 200 with the cancelled sale, 404 for an unknown sale, 409 once
/// the sale has started or left the scheduled state, 422 for a status
/// other than `"cancelled"`.
pub async fn update_sale_status(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<SaleResponse>, ApiError> {
    if request.status != "cancelled" {
        return Err(ApiError::invalid(
            "only the 'cancelled' status can be requested; activation and expiry are automatic",
        ));
    }

    let sale = state.engine.cancel_sale(SaleId::from_uuid(sale_id)).await?;
    Ok(Json(SaleResponse {
        sale,
        allocations: Vec::new(),
    }))
}

/// Sale detail with allocations, read from the repository (never the
/// cache).
pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> Result<Json<SaleResponse>, ApiError> {
    let (sale, allocations) = state.engine.sale(SaleId::from_uuid(sale_id)).await?;
    Ok(Json(SaleResponse { sale, allocations }))
}

/// The storefront listing of currently active sales, served from the
/// short-TTL cache when fresh.
pub async fn active_sales(
    State(state): State<AppState>,
) -> Result<Json<Vec<ActiveSaleSummary>>, ApiError> {
    let snapshot = state.engine.active_sales().await?;
    Ok(Json(snapshot))
}
