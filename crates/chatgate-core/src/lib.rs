//! Core domain + application logic for the chat gateway.
//!
//! This crate is framework-agnostic. The HTTP surface and the upstream model
//! provider live behind ports (traits) implemented in adapter crates.

pub mod auth;
pub mod chat;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod model;
pub mod quota;
pub mod session;

pub use errors::{Error, Result};
