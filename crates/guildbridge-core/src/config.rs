//! Configuration for the GuildBridge relay.
//!
//! Defaults live here; the relay binary overrides them from CLI arguments and
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// The statically configured set of organizations the bridge serves.
    #[serde(default)]
    pub organizations: Vec<String>,
}

/// Relay transport tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// WebSocket listen port.
    pub port: u16,
    /// How long an accepted connection may stay unauthenticated.
    pub auth_timeout_secs: u64,
    /// Size of the message-deduplication recency window.
    pub dedup_window: usize,
    /// Per-connection outbound queue depth; a full queue means the transport
    /// is not currently writable and the payload is skipped.
    pub outbound_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            auth_timeout_secs: 10,
            dedup_window: 100,
            outbound_queue: 64,
        }
    }
}

impl RelayConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

/// Membership synchronizer tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between automatic synchronization passes.
    pub interval_secs: u64,
    /// Hard cap on directory calls within one rate window.
    pub max_calls: usize,
    /// Rate window length in seconds.
    pub window_secs: u64,
    /// Calls held back from the cap as a safety margin.
    pub safety_buffer: usize,
    /// Path of the membership snapshot file.
    pub snapshot_path: PathBuf,
    /// Base URL of the membership directory API.
    pub directory_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            max_calls: 300,
            window_secs: 300, // 5 minutes
            safety_buffer: 10,
            snapshot_path: PathBuf::from("guild_members.json"),
            directory_url: "https://api.hypixel.net".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_limits() {
        let config = BridgeConfig::default();
        assert_eq!(config.relay.auth_timeout(), Duration::from_secs(10));
        assert_eq!(config.relay.dedup_window, 100);
        assert_eq!(config.sync.max_calls, 300);
        assert_eq!(config.sync.safety_buffer, 10);
        assert_eq!(config.sync.window(), Duration::from_secs(300));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = BridgeConfig {
            organizations: vec!["Sweats".into(), "Casuals".into()],
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.organizations, config.organizations);
        assert_eq!(back.relay.port, config.relay.port);
    }
}
