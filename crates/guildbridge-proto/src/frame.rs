//! Frame types for the relay transport.
//!
//! The wire format is one JSON object per WebSocket text message. Historically
//! the fields `from`, `key`, `msg`, `combinedbridge` and `request` were
//! overloaded in a single object; here the shape is decoded exactly once at
//! the connection boundary into [`ClientFrame`].

use serde::{Deserialize, Serialize};

/// Sender tag carried by every game-client frame.
pub const CLIENT_SENDER: &str = "mc";
/// Sender tag on frames the relay itself originates.
pub const SERVER_SENDER: &str = "server";

/// A decoded inbound frame from a game client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// First frame on a connection: `{from:"mc", key:"<bridge key>"}`.
    Handshake { key: String },
    /// Ordinary guild chat line: `{from:"mc", msg:"..."}`.
    Chat { msg: String },
    /// Cross-organization broadcast: `{from:"mc", msg:"...", combinedbridge:true}`.
    CombinedChat { msg: String },
    /// Synchronous query, e.g. `{request:"getOnlinePlayers"}`.
    Query { request: String },
}

/// Frame decoding failures, distinguished so the connection can be closed
/// with the matching protocol close code.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unrecognized frame shape")]
    InvalidFormat,
}

/// The raw overloaded object as it appears on the wire.
#[derive(Debug, Deserialize)]
struct RawFrame {
    from: Option<String>,
    key: Option<String>,
    msg: Option<String>,
    #[serde(default)]
    combinedbridge: bool,
    request: Option<String>,
}

impl ClientFrame {
    /// Decode a text frame.
    ///
    /// Dispatch order matches the relay's routing precedence: queries first,
    /// then combined-channel chat, then handshake, then plain chat.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        if let Some(request) = raw.request {
            return Ok(Self::Query { request });
        }

        let from_client = raw.from.as_deref() == Some(CLIENT_SENDER);

        if raw.combinedbridge {
            if let Some(msg) = raw.msg {
                return Ok(Self::CombinedChat { msg });
            }
            return Err(FrameError::InvalidFormat);
        }

        if from_client {
            if let Some(key) = raw.key {
                return Ok(Self::Handshake { key });
            }
            if let Some(msg) = raw.msg {
                return Ok(Self::Chat { msg });
            }
        }

        Err(FrameError::InvalidFormat)
    }
}

/// A routed payload fanned out to game clients.
///
/// Field names mirror what clients already parse; absent options are omitted
/// from the JSON entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayPayload {
    /// Originating side, e.g. `"discord"` or `"mc"`.
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Organization the message is scoped to, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combinedbridge: Option<bool>,
}

/// An outbound frame from the relay to a game client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Handshake accepted: `{from:"server", type:"auth_success"}`.
    AuthSuccess,
    /// Handshake rejected: `{from:"server", type:"auth_failed"}`.
    AuthFailed,
    /// A routed chat payload.
    Relay(RelayPayload),
    /// Reply to a [`ClientFrame::Query`].
    QueryResponse {
        request: String,
        response: serde_json::Value,
    },
}

impl ServerFrame {
    /// Encode the frame as a JSON text message.
    pub fn encode(&self) -> String {
        let value = match self {
            Self::AuthSuccess => serde_json::json!({
                "from": SERVER_SENDER,
                "type": "auth_success",
                "message": "Authentication successful",
            }),
            Self::AuthFailed => serde_json::json!({
                "from": SERVER_SENDER,
                "type": "auth_failed",
                "message": "Invalid bridge key",
            }),
            Self::Relay(payload) => {
                return serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
            }
            Self::QueryResponse { request, response } => serde_json::json!({
                "request": request,
                "response": response,
            }),
        };
        value.to_string()
    }
}

/// Why the relay closed a connection at the protocol level.
///
/// Each reason maps to a distinct application close code; none of them are
/// retryable on the same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// First frame was not parseable JSON.
    InvalidJson,
    /// First frame parsed but was not a handshake.
    InvalidFormat,
    /// Handshake key did not resolve to any identity.
    InvalidKey,
    /// No valid handshake arrived before the timer fired.
    AuthTimeout,
    /// Access revoked by an administrator or a membership sync.
    Revoked,
}

impl CloseReason {
    /// Application close code (4000-4999 range is reserved for applications).
    pub fn code(self) -> u16 {
        match self {
            Self::InvalidJson => 4000,
            Self::InvalidFormat => 4001,
            Self::InvalidKey => 4002,
            Self::AuthTimeout => 4003,
            Self::Revoked => 4004,
        }
    }

    /// Human-readable close reason sent alongside the code.
    pub fn reason(self) -> &'static str {
        match self {
            Self::InvalidJson => "Invalid JSON",
            Self::InvalidFormat => "Invalid authentication format",
            Self::InvalidKey => "Invalid bridge key",
            Self::AuthTimeout => "Authentication timeout",
            Self::Revoked => "Access revoked by administrator",
        }
    }
}
