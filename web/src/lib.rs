//! # Flash Sale Web
//!
//! The HTTP surface of the flash-sale engine: an axum API for operators
//! (create/cancel sales) and buyers (browse active sales, reserve units),
//! plus the server binary that wires the engine, the Postgres repository,
//! the Redis cache and the lifecycle scheduler together.
//!
//! # Endpoints
//!
//! - `POST /api/sales` - create a scheduled sale with its allocations
//! - `PATCH /api/sales/:id/status` - cancel a sale before it starts
//! - `GET /api/sales/:id` - sale detail with allocations
//! - `GET /api/sales/active` - cache-backed storefront listing
//! - `POST /api/sales/:sale_id/allocations/:allocation_id/reserve` -
//!   reserve discounted units for a buyer
//! - `GET /health`, `GET /ready` - probes
//!
//! Domain rejections map to stable error codes and statuses; see
//! [`error::ApiError`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
