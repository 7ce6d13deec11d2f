//! Router assembly.

use crate::handlers::{health, reservations, sales};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

/// Build the application router over the given state.
///
/// Route order matters for `/api/sales/active` vs `/api/sales/:id`: axum
/// matches the literal segment first, so both can coexist.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/api/sales", post(sales::create_sale))
        .route("/api/sales/active", get(sales::active_sales))
        .route("/api/sales/:id", get(sales::get_sale))
        .route("/api/sales/:id/status", patch(sales::update_sale_status))
        .route(
            "/api/sales/:sale_id/allocations/:allocation_id/reserve",
            post(reservations::reserve),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
