//! Provider-agnostic chat model port.

pub mod client;
pub mod types;
