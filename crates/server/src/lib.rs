//! HTTP presentation surface for the curator engine.

pub mod api;
pub mod metrics;
pub mod state;
