//! In-memory connection registry and guild-scoped fan-out.

mod connection;

pub use connection::{BridgeConnection, ConnectionRegistry, Outbound};
