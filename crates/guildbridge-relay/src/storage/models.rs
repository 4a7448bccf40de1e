//! Data models for GuildBridge storage.

use serde::{Deserialize, Serialize};

/// One member in the membership snapshot.
///
/// `bridge_key` is absent while the member's access is revoked; at most one
/// key is active per `player_id` at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    pub player_name: String,
    /// Stable game-account id, the reconciliation key across sync passes.
    pub player_id: String,
    /// Chat-platform account linked to this member, or `"Not linked"`.
    pub linked_contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_key: Option<String>,
    pub organization: String,
}
