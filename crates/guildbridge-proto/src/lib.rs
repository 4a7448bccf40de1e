//! GuildBridge Wire Protocol
//!
//! JSON frame types exchanged over the relay transport:
//! - [`ClientFrame`] for inbound game-client frames (handshake, chat, queries)
//! - [`ServerFrame`] for outbound relay frames (auth replies, routed payloads)
//! - [`CloseReason`] for the protocol-level close codes

pub mod frame;

pub use frame::{ClientFrame, CloseReason, FrameError, RelayPayload, ServerFrame};
