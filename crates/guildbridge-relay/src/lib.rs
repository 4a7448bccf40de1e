//! GuildBridge Relay Server Library
//!
//! Core functionality for the bridge relay:
//! - Bridge-key credential store and administrative key lifecycle
//! - Connection registry with guild-scoped fan-out
//! - Message deduplication over a bounded recency window
//! - Rate-limited membership synchronization
//! - Flat-file membership snapshot storage
//! - WebSocket server tying the pieces together

pub mod auth;
pub mod dedup;
pub mod registry;
pub mod server;
pub mod storage;
pub mod sync;
