//! HTTP handlers, grouped by resource.

pub mod health;
pub mod reservations;
pub mod sales;
