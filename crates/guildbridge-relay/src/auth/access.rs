//! Administrative bridge-key lifecycle operations.
//!
//! These back the operator workflows (revoke, restore, reset, self-service
//! lookup). Every mutating operation rewrites the membership snapshot first,
//! then reloads the credential store, so a racing handshake can never observe
//! a key the snapshot no longer carries.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::registry::ConnectionRegistry;
use crate::storage::{MemberRecord, SnapshotStore, StorageError};

use super::store::CredentialStore;

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Member not found: {0}")]
    NotFound(String),

    #[error("Member {0} already has an active bridge key")]
    KeyAlreadyActive(String),

    #[error("Member {0} has no active bridge key")]
    NoActiveKey(String),

    /// A failed snapshot write leaves stale keys live, so it is surfaced to
    /// the operator rather than swallowed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result of a revocation, reported back to the operator.
#[derive(Debug)]
pub struct RevokeOutcome {
    pub member: MemberRecord,
    /// Whether a live connection was dropped along with the key.
    pub disconnected: bool,
}

/// Result of a key issuance (restore or reset).
#[derive(Debug)]
pub struct KeyIssued {
    pub member: MemberRecord,
    pub key: String,
}

/// Administrative entry point for the bridge-key lifecycle.
pub struct AccessManager {
    snapshot: SnapshotStore,
    store: Arc<CredentialStore>,
    registry: Arc<ConnectionRegistry>,
}

impl AccessManager {
    pub fn new(
        snapshot: SnapshotStore,
        store: Arc<CredentialStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            snapshot,
            store,
            registry,
        }
    }

    /// Clear a member's bridge key and drop any live session.
    ///
    /// The snapshot is rewritten and the credential store reloaded before the
    /// forced disconnect, so a concurrent handshake cannot resurrect the key.
    pub async fn revoke_access(&self, player_name: &str) -> Result<RevokeOutcome, AccessError> {
        let mut records = self.snapshot.load()?;
        let idx = find_by_player(&records, player_name)
            .ok_or_else(|| AccessError::NotFound(player_name.to_string()))?;
        if records[idx].bridge_key.is_none() {
            return Err(AccessError::NoActiveKey(records[idx].player_name.clone()));
        }

        records[idx].bridge_key = None;
        self.snapshot.save(&records)?;
        self.store.reload(&records).await;

        let member = records[idx].clone();
        let disconnected = self.registry.disconnect_player(&member.player_name).await;
        info!(player = %member.player_name, disconnected, "Bridge access revoked");

        Ok(RevokeOutcome {
            member,
            disconnected,
        })
    }

    /// Issue a fresh key for a member whose access was previously revoked.
    pub async fn restore_access(&self, player_name: &str) -> Result<KeyIssued, AccessError> {
        let mut records = self.snapshot.load()?;
        let idx = find_by_player(&records, player_name)
            .ok_or_else(|| AccessError::NotFound(player_name.to_string()))?;
        if records[idx].bridge_key.is_some() {
            return Err(AccessError::KeyAlreadyActive(
                records[idx].player_name.clone(),
            ));
        }

        let key = Uuid::new_v4().to_string();
        records[idx].bridge_key = Some(key.clone());
        self.snapshot.save(&records)?;
        self.store.reload(&records).await;

        let member = records[idx].clone();
        info!(player = %member.player_name, "Bridge access restored");

        Ok(KeyIssued { member, key })
    }

    /// Replace a member's key with a fresh one (self-service reset, looked up
    /// by the member's linked chat-platform account).
    ///
    /// The old key stops resolving for new handshakes immediately; an already
    /// open session is tolerated until the next enforcement pass.
    pub async fn reset_key(&self, linked_contact: &str) -> Result<KeyIssued, AccessError> {
        let mut records = self.snapshot.load()?;
        let idx = find_by_contact(&records, linked_contact)
            .ok_or_else(|| AccessError::NotFound(linked_contact.to_string()))?;
        if records[idx].bridge_key.is_none() {
            return Err(AccessError::NoActiveKey(records[idx].player_name.clone()));
        }

        let key = Uuid::new_v4().to_string();
        records[idx].bridge_key = Some(key.clone());
        self.snapshot.save(&records)?;
        self.store.reload(&records).await;

        let member = records[idx].clone();
        info!(player = %member.player_name, "Bridge key reset");

        Ok(KeyIssued { member, key })
    }

    /// Self-service key retrieval by linked chat-platform account.
    pub fn lookup_key(&self, linked_contact: &str) -> Result<Option<String>, AccessError> {
        let records = self.snapshot.load()?;
        let idx = find_by_contact(&records, linked_contact)
            .ok_or_else(|| AccessError::NotFound(linked_contact.to_string()))?;
        Ok(records[idx].bridge_key.clone())
    }
}

fn find_by_player(records: &[MemberRecord], player_name: &str) -> Option<usize> {
    records
        .iter()
        .position(|r| r.player_name.eq_ignore_ascii_case(player_name))
}

fn find_by_contact(records: &[MemberRecord], linked_contact: &str) -> Option<usize> {
    records
        .iter()
        .position(|r| r.linked_contact.eq_ignore_ascii_case(linked_contact))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seeded_manager(records: &[MemberRecord]) -> (AccessManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotStore::new(dir.path().join("members.json"));
        snapshot.save(records).unwrap();
        let manager = AccessManager::new(
            snapshot,
            Arc::new(CredentialStore::new()),
            Arc::new(ConnectionRegistry::new()),
        );
        (manager, dir)
    }

    fn member(player: &str, contact: &str, key: Option<&str>) -> MemberRecord {
        MemberRecord {
            player_name: player.to_string(),
            player_id: format!("id-{player}"),
            linked_contact: contact.to_string(),
            bridge_key: key.map(str::to_string),
            organization: "Sweats".to_string(),
        }
    }

    #[tokio::test]
    async fn revoke_clears_key_and_persists() {
        let (manager, _dir) = seeded_manager(&[member("Alice", "alice#0", Some("key-a"))]);

        let outcome = manager.revoke_access("alice").await.unwrap();
        assert_eq!(outcome.member.player_name, "Alice");
        assert!(!outcome.disconnected);

        // The persisted snapshot no longer carries the key.
        let records = manager.snapshot.load().unwrap();
        assert!(records[0].bridge_key.is_none());
        // And the store no longer resolves it.
        assert!(manager.store.resolve("key-a").await.is_none());
    }

    #[tokio::test]
    async fn revoke_without_active_key_is_rejected() {
        let (manager, _dir) = seeded_manager(&[member("Alice", "alice#0", None)]);

        assert!(matches!(
            manager.revoke_access("Alice").await,
            Err(AccessError::NoActiveKey(_))
        ));
    }

    #[tokio::test]
    async fn restore_issues_fresh_key() {
        let (manager, _dir) = seeded_manager(&[member("Alice", "alice#0", None)]);

        let issued = manager.restore_access("Alice").await.unwrap();
        assert_eq!(manager.store.resolve(&issued.key).await.unwrap().player_name, "Alice");
    }

    #[tokio::test]
    async fn restore_with_active_key_is_rejected() {
        let (manager, _dir) = seeded_manager(&[member("Alice", "alice#0", Some("key-a"))]);

        assert!(matches!(
            manager.restore_access("Alice").await,
            Err(AccessError::KeyAlreadyActive(_))
        ));
    }

    #[tokio::test]
    async fn reset_invalidates_prior_key() {
        let (manager, _dir) = seeded_manager(&[member("Alice", "alice#0", Some("key-a"))]);

        let issued = manager.reset_key("alice#0").await.unwrap();
        assert_ne!(issued.key, "key-a");
        assert!(manager.store.resolve("key-a").await.is_none());
        assert!(manager.store.resolve(&issued.key).await.is_some());
    }

    #[tokio::test]
    async fn lookup_returns_current_key() {
        let (manager, _dir) = seeded_manager(&[member("Alice", "alice#0", Some("key-a"))]);

        assert_eq!(manager.lookup_key("Alice#0").unwrap().as_deref(), Some("key-a"));
        assert!(matches!(
            manager.lookup_key("nobody"),
            Err(AccessError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_member_is_not_found() {
        let (manager, _dir) = seeded_manager(&[]);

        assert!(matches!(
            manager.revoke_access("Ghost").await,
            Err(AccessError::NotFound(_))
        ));
    }
}
