//! Bridge relay server: accept loop, handshake gating, frame dispatch.

mod bridge;
mod events;


pub use bridge::BridgeServer;
pub use events::{BridgeEvent, event_channel};
