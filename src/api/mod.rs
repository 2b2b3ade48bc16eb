//! Axum HTTP handlers.

pub mod repos;
pub mod search;
