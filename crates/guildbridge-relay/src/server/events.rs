//! Event boundary between the relay core and the chat-platform adapter.
//!
//! The adapter (posting to human-readable channels, slash commands, embeds)
//! lives outside this crate; it consumes these events and calls back in via
//! `ConnectionRegistry::publish`, `disconnect_player`, and the access/sync
//! operations.

use tokio::sync::mpsc;

/// Events the relay emits toward the human-chat adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// An accepted, deduplicated member chat line.
    MemberMessage {
        message: String,
        player: String,
        organization: String,
        combined: bool,
    },
    /// Combined-channel echo, so the adapter can mirror the message without
    /// re-deriving the combined-delivery decision.
    BounceMessage {
        message: String,
        player: String,
        organization: String,
    },
    /// A connection authenticated.
    ClientConnected { total: usize },
    /// An authenticated connection went away.
    ClientDisconnected { total: usize },
}

/// Create the event channel handed to the adapter.
pub fn event_channel() -> (
    mpsc::UnboundedSender<BridgeEvent>,
    mpsc::UnboundedReceiver<BridgeEvent>,
) {
    mpsc::unbounded_channel()
}
