//! Membership directory HTTP client.
//!
//! The directory is the authoritative source of current organization rosters
//! and member profiles. Every outbound call passes through the shared
//! [`CallBudget`] before it leaves the process.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::rate_limit::CallBudget;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Transport-level failure reaching the directory.
    #[error("Directory request error: {0}")]
    Request(String),

    /// The directory answered but reported a non-success result.
    #[error("Directory API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

/// A member profile as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub player_name: String,
    pub linked_contact: String,
}

/// Authoritative membership source, abstracted so the synchronizer can be
/// exercised against a fake directory in tests.
#[allow(async_fn_in_trait)]
pub trait MembershipDirectory: Send + Sync {
    /// Stable member ids for everyone currently in `organization`.
    async fn fetch_roster(&self, organization: &str) -> Result<Vec<String>, DirectoryError>;

    /// Profile lookup for one member; `None` when the directory has no data
    /// for the id.
    async fn fetch_profile(&self, member_id: &str) -> Result<Option<MemberProfile>, DirectoryError>;
}

/// Placeholder contact value when a member has not linked an account.
const NOT_LINKED: &str = "Not linked";

/// HTTP client for the real membership directory API.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    budget: Arc<CallBudget>,
}

impl DirectoryClient {
    pub fn new(base_url: String, api_key: String, budget: Arc<CallBudget>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            budget,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RosterResponse {
    success: bool,
    cause: Option<String>,
    guild: Option<RosterBody>,
}

#[derive(Debug, Deserialize)]
struct RosterBody {
    members: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    success: bool,
    player: Option<ProfileBody>,
}

#[derive(Debug, Deserialize, Default)]
struct ProfileBody {
    displayname: Option<String>,
    #[serde(rename = "socialMedia", default)]
    social_media: SocialMedia,
}

#[derive(Debug, Deserialize, Default)]
struct SocialMedia {
    #[serde(default)]
    links: HashMap<String, String>,
}

impl MembershipDirectory for DirectoryClient {
    async fn fetch_roster(&self, organization: &str) -> Result<Vec<String>, DirectoryError> {
        self.budget.acquire().await;

        let response: RosterResponse = self
            .http
            .get(format!("{}/guild", self.base_url))
            .query(&[("key", self.api_key.as_str()), ("name", organization)])
            .send()
            .await?
            .json()
            .await?;

        if !response.success {
            return Err(DirectoryError::Api(format!(
                "Failed to fetch organization {organization}: {}",
                response.cause.unwrap_or_else(|| "unknown cause".to_string())
            )));
        }

        let members = response
            .guild
            .map(|g| g.members.into_iter().map(|m| m.uuid).collect::<Vec<_>>())
            .unwrap_or_default();
        debug!(organization = %organization, count = members.len(), "Fetched roster");
        Ok(members)
    }

    async fn fetch_profile(&self, member_id: &str) -> Result<Option<MemberProfile>, DirectoryError> {
        self.budget.acquire().await;

        let response: ProfileResponse = self
            .http
            .get(format!("{}/player", self.base_url))
            .query(&[("key", self.api_key.as_str()), ("uuid", member_id)])
            .send()
            .await?
            .json()
            .await?;

        if !response.success {
            return Ok(None);
        }

        Ok(response.player.map(|player| MemberProfile {
            player_name: player
                .displayname
                .unwrap_or_else(|| member_id.to_string()),
            linked_contact: player
                .social_media
                .links
                .get("DISCORD")
                .cloned()
                .unwrap_or_else(|| NOT_LINKED.to_string()),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roster_response_parses_member_ids() {
        let json = r#"{"success":true,"guild":{"members":[{"uuid":"u1"},{"uuid":"u2"}]}}"#;
        let response: RosterResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.guild.unwrap().members.len(), 2);
    }

    #[test]
    fn failed_roster_response_carries_cause() {
        let json = r#"{"success":false,"cause":"Invalid API key"}"#;
        let response: RosterResponse = serde_json::from_str(json).unwrap();
        assert!(!response.success);
        assert_eq!(response.cause.as_deref(), Some("Invalid API key"));
    }

    #[test]
    fn profile_response_extracts_linked_contact() {
        let json = r#"{
            "success": true,
            "player": {
                "displayname": "PlayerX",
                "socialMedia": {"links": {"DISCORD": "playerx#0"}}
            }
        }"#;
        let response: ProfileResponse = serde_json::from_str(json).unwrap();
        let player = response.player.unwrap();
        assert_eq!(player.displayname.as_deref(), Some("PlayerX"));
        assert_eq!(
            player.social_media.links.get("DISCORD").map(String::as_str),
            Some("playerx#0")
        );
    }

    #[test]
    fn profile_without_links_defaults_empty() {
        let json = r#"{"success":true,"player":{"displayname":"PlayerX"}}"#;
        let response: ProfileResponse = serde_json::from_str(json).unwrap();
        assert!(response.player.unwrap().social_media.links.is_empty());
    }
}
