//! `GuildBridge` Core Library
//!
//! Shared functionality for `GuildBridge` components:
//! - Configuration defaults and tunables
//! - Common error types
//! - Tracing/logging initialization

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::BridgeConfig;
pub use error::{Error, Result};
