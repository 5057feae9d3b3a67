//! # scry-host
//!
//! Binary wrapper around `scry-core`: TOML configuration, tracing setup,
//! and a console consumer that drains and acknowledges screen updates.

pub mod config;
pub mod sink;
