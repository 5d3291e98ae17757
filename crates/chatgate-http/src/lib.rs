//! HTTP adapter (axum).
//!
//! Exposes the gateway's JSON API over the `chatgate-core` stores and
//! orchestrator.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use router::{build, serve, AppState};
