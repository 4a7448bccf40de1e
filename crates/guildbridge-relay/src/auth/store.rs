//! In-memory bridge-key credential store.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;

use crate::storage::MemberRecord;

/// Who a connection claims to be. Bound once at handshake time and never
/// patched in place; a resync replaces the whole store instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub player_name: String,
    pub organization: String,
}

/// Maps opaque bridge keys to the identities they were issued to.
///
/// The map is only ever replaced wholesale inside a single write critical
/// section, so concurrent readers observe either the fully-old or fully-new
/// mapping, never a partial one.
pub struct CredentialStore {
    keys: RwLock<HashMap<String, Identity>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a bridge key to the identity it was issued to.
    pub async fn resolve(&self, key: &str) -> Option<Identity> {
        self.keys.read().await.get(key).cloned()
    }

    /// Replace the whole mapping from a membership snapshot.
    ///
    /// Records without an active bridge key (revoked members) are skipped.
    pub async fn reload(&self, records: &[MemberRecord]) {
        let mut next = HashMap::with_capacity(records.len());
        for record in records {
            if let Some(key) = &record.bridge_key {
                next.insert(
                    key.clone(),
                    Identity {
                        player_name: record.player_name.clone(),
                        organization: record.organization.clone(),
                    },
                );
            }
        }
        let count = next.len();
        *self.keys.write().await = next;
        info!(count, "Loaded valid bridge keys");
    }

    /// Number of currently-valid keys.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
