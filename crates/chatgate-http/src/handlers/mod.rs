//! HTTP handlers.
//!
//! Each handler is a thin adapter: extract + validate the request, call into
//! `chatgate-core`, shape the JSON reply. Failures go through [`ApiError`].
//!
//! [`ApiError`]: crate::error::ApiError

pub mod auth;
pub mod chat;
pub mod health;
pub mod sessions;
pub mod tokens;
