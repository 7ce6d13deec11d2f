//! Shared application state for the HTTP handlers.

use flash_sale_core::AllocationEngine;

/// State injected into every handler via axum's `State` extractor.
///
/// The engine is internally `Arc`-backed, so cloning per request is cheap.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The allocation engine all handlers delegate to.
    pub engine: AllocationEngine,
}

impl AppState {
    /// Build state around an assembled engine.
    #[must_use]
    pub const fn new(engine: AllocationEngine) -> Self {
        Self { engine }
    }
}
