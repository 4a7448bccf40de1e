//! Membership reconciliation against the external directory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::CredentialStore;
use crate::registry::ConnectionRegistry;
use crate::storage::{MemberRecord, SnapshotStore, StorageError};

use super::directory::{DirectoryError, MembershipDirectory};

/// Operator-facing result of one synchronization pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Roster entries seen across all successfully processed organizations.
    pub total_processed: usize,
    pub new_members_added: usize,
    pub members_who_left: usize,
    pub final_member_count: usize,
    pub log: Vec<String>,
}

/// Reconciles the membership snapshot and credential store against the
/// directory, one organization at a time.
pub struct MembershipSynchronizer<D> {
    directory: D,
    snapshot: SnapshotStore,
    store: Arc<CredentialStore>,
    registry: Arc<ConnectionRegistry>,
    organizations: Vec<String>,
}

impl<D: MembershipDirectory> MembershipSynchronizer<D> {
    pub fn new(
        directory: D,
        snapshot: SnapshotStore,
        store: Arc<CredentialStore>,
        registry: Arc<ConnectionRegistry>,
        organizations: Vec<String>,
    ) -> Self {
        Self {
            directory,
            snapshot,
            store,
            registry,
            organizations,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Members present in both snapshots keep their bridge key; new members
    /// get a fresh key and a best-effort profile lookup; members absent from
    /// every successfully fetched roster are removed and their live sessions
    /// dropped. An organization whose roster fetch fails keeps its previous
    /// records untouched and contributes no departures this pass.
    pub async fn synchronize(&self) -> Result<SyncSummary, StorageError> {
        let previous = self.snapshot.load()?;
        let existing: HashMap<&str, &MemberRecord> = previous
            .iter()
            .map(|record| (record.player_id.as_str(), record))
            .collect();

        let mut summary = SyncSummary::default();
        let mut next: Vec<MemberRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut processed: HashSet<&str> = HashSet::new();

        for organization in &self.organizations {
            info!(organization = %organization, "Processing organization");
            match self
                .process_organization(organization, &existing, &mut next, &mut seen, &mut summary)
                .await
            {
                Ok(count) => {
                    processed.insert(organization.as_str());
                    summary.total_processed += count;
                    summary
                        .log
                        .push(format!("Completed {organization}: {count} members processed"));
                }
                Err(e) => {
                    error!(
                        organization = %organization,
                        error = %e,
                        "Roster fetch failed, keeping previous records"
                    );
                    summary
                        .log
                        .push(format!("Error processing {organization}: {e}"));
                    for record in previous.iter().filter(|r| &r.organization == organization) {
                        if seen.insert(record.player_id.clone()) {
                            next.push(record.clone());
                        }
                    }
                }
            }
        }

        let departed: Vec<&MemberRecord> = previous
            .iter()
            .filter(|record| {
                processed.contains(record.organization.as_str())
                    && !seen.contains(&record.player_id)
            })
            .collect();
        summary.members_who_left = departed.len();
        summary.final_member_count = next.len();

        self.snapshot.save(&next)?;
        // Credentials are rewritten before eviction so a handshake racing the
        // reconciliation cannot authenticate with a removed key.
        self.store.reload(&next).await;
        for member in departed {
            summary.log.push(format!(
                "Removed member: {} ({})",
                member.player_name, member.organization
            ));
            if self.registry.disconnect_player(&member.player_name).await {
                info!(player = %member.player_name, "Disconnected departed member");
            }
        }

        info!(
            total_processed = summary.total_processed,
            new_members = summary.new_members_added,
            departed = summary.members_who_left,
            final_count = summary.final_member_count,
            "Membership sync complete"
        );
        Ok(summary)
    }

    async fn process_organization(
        &self,
        organization: &str,
        existing: &HashMap<&str, &MemberRecord>,
        next: &mut Vec<MemberRecord>,
        seen: &mut HashSet<String>,
        summary: &mut SyncSummary,
    ) -> Result<usize, DirectoryError> {
        let roster = self.directory.fetch_roster(organization).await?;
        let count = roster.len();

        for member_id in roster {
            if !seen.insert(member_id.clone()) {
                continue;
            }
            if let Some(prior) = existing.get(member_id.as_str()) {
                // Key continuity: a routine sync must not invalidate the
                // member's active sessions.
                let mut record = (*prior).clone();
                record.organization = organization.to_string();
                next.push(record);
            } else if let Some(record) = self.discover_member(&member_id, organization).await {
                info!(player = %record.player_name, organization = %organization, "Added new member");
                summary
                    .log
                    .push(format!("Added new member: {} ({organization})", record.player_name));
                summary.new_members_added += 1;
                next.push(record);
            } else {
                summary
                    .log
                    .push(format!("Could not fetch info for member {member_id}"));
            }
        }

        Ok(count)
    }

    /// Best-effort lookup for a newly seen member. Failures skip the member
    /// for this pass only; it will be retried on the next one.
    async fn discover_member(&self, member_id: &str, organization: &str) -> Option<MemberRecord> {
        match self.directory.fetch_profile(member_id).await {
            Ok(Some(profile)) => Some(MemberRecord {
                player_name: profile.player_name,
                player_id: member_id.to_string(),
                linked_contact: profile.linked_contact,
                bridge_key: Some(Uuid::new_v4().to_string()),
                organization: organization.to_string(),
            }),
            Ok(None) => {
                warn!(member_id = %member_id, "Directory has no profile for member");
                None
            }
            Err(e) => {
                warn!(member_id = %member_id, error = %e, "Profile fetch failed, skipping member this pass");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::sync::directory::MemberProfile;
    use tokio::sync::mpsc;

    /// In-memory directory double.
    #[derive(Default)]
    struct FakeDirectory {
        rosters: HashMap<String, Result<Vec<String>, String>>,
        profiles: HashMap<String, MemberProfile>,
    }

    impl MembershipDirectory for FakeDirectory {
        async fn fetch_roster(&self, organization: &str) -> Result<Vec<String>, DirectoryError> {
            match self.rosters.get(organization) {
                Some(Ok(ids)) => Ok(ids.clone()),
                Some(Err(cause)) => Err(DirectoryError::Api(cause.clone())),
                None => Ok(Vec::new()),
            }
        }

        async fn fetch_profile(
            &self,
            member_id: &str,
        ) -> Result<Option<MemberProfile>, DirectoryError> {
            Ok(self.profiles.get(member_id).cloned())
        }
    }

    fn member(player: &str, id: &str, organization: &str, key: &str) -> MemberRecord {
        MemberRecord {
            player_name: player.to_string(),
            player_id: id.to_string(),
            linked_contact: "Not linked".to_string(),
            bridge_key: Some(key.to_string()),
            organization: organization.to_string(),
        }
    }

    fn synchronizer(
        directory: FakeDirectory,
        previous: &[MemberRecord],
        organizations: &[&str],
    ) -> (MembershipSynchronizer<FakeDirectory>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotStore::new(dir.path().join("members.json"));
        snapshot.save(previous).unwrap();
        let sync = MembershipSynchronizer::new(
            directory,
            snapshot,
            Arc::new(CredentialStore::new()),
            Arc::new(ConnectionRegistry::new()),
            organizations.iter().map(ToString::to_string).collect(),
        );
        (sync, dir)
    }

    #[tokio::test]
    async fn retained_member_keeps_its_key() {
        let mut directory = FakeDirectory::default();
        directory
            .rosters
            .insert("Sweats".into(), Ok(vec!["id-alice".into()]));

        let previous = vec![member("Alice", "id-alice", "Sweats", "key-a")];
        let (sync, _dir) = synchronizer(directory, &previous, &["Sweats"]);

        let summary = sync.synchronize().await.unwrap();

        assert_eq!(summary.new_members_added, 0);
        assert_eq!(summary.members_who_left, 0);
        let records = sync.snapshot.load().unwrap();
        assert_eq!(records[0].bridge_key.as_deref(), Some("key-a"));
        assert!(sync.store.resolve("key-a").await.is_some());
    }

    #[tokio::test]
    async fn new_member_gets_fresh_key_and_profile() {
        let mut directory = FakeDirectory::default();
        directory
            .rosters
            .insert("Sweats".into(), Ok(vec!["id-bob".into()]));
        directory.profiles.insert(
            "id-bob".into(),
            MemberProfile {
                player_name: "Bob".into(),
                linked_contact: "bob#0".into(),
            },
        );

        let (sync, _dir) = synchronizer(directory, &[], &["Sweats"]);

        let summary = sync.synchronize().await.unwrap();

        assert_eq!(summary.new_members_added, 1);
        assert_eq!(summary.final_member_count, 1);
        let records = sync.snapshot.load().unwrap();
        assert_eq!(records[0].player_name, "Bob");
        assert_eq!(records[0].linked_contact, "bob#0");
        let key = records[0].bridge_key.clone().unwrap();
        assert!(sync.store.resolve(&key).await.is_some());
    }

    #[tokio::test]
    async fn member_without_profile_is_skipped_this_pass() {
        let mut directory = FakeDirectory::default();
        directory
            .rosters
            .insert("Sweats".into(), Ok(vec!["id-ghost".into()]));

        let (sync, _dir) = synchronizer(directory, &[], &["Sweats"]);

        let summary = sync.synchronize().await.unwrap();

        assert_eq!(summary.new_members_added, 0);
        assert_eq!(summary.final_member_count, 0);
        assert!(summary
            .log
            .iter()
            .any(|line| line.contains("Could not fetch info")));
    }

    #[tokio::test]
    async fn departed_member_is_removed_and_disconnected() {
        let mut directory = FakeDirectory::default();
        directory.rosters.insert("Sweats".into(), Ok(Vec::new()));

        let previous = vec![member("Alice", "id-alice", "Sweats", "key-a")];
        let (sync, _dir) = synchronizer(directory, &previous, &["Sweats"]);

        // Alice currently holds a live connection.
        let (tx, mut rx) = mpsc::channel(16);
        sync.registry
            .register(
                Identity {
                    player_name: "Alice".into(),
                    organization: "Sweats".into(),
                },
                tx,
            )
            .await;

        let summary = sync.synchronize().await.unwrap();

        assert_eq!(summary.members_who_left, 1);
        assert_eq!(summary.final_member_count, 0);
        assert!(sync.snapshot.load().unwrap().is_empty());
        assert!(sync.store.resolve("key-a").await.is_none());
        assert_eq!(sync.registry.count().await, 0);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn failed_organization_keeps_previous_records() {
        let mut directory = FakeDirectory::default();
        directory
            .rosters
            .insert("Sweats".into(), Ok(vec!["id-alice".into()]));
        directory
            .rosters
            .insert("Casuals".into(), Err("directory unavailable".into()));

        let previous = vec![
            member("Alice", "id-alice", "Sweats", "key-a"),
            member("Bob", "id-bob", "Casuals", "key-b"),
        ];
        let (sync, _dir) = synchronizer(directory, &previous, &["Sweats", "Casuals"]);

        let summary = sync.synchronize().await.unwrap();

        // Bob's organization failed: he is neither removed nor counted as
        // departed, and his key still resolves.
        assert_eq!(summary.members_who_left, 0);
        assert_eq!(summary.final_member_count, 2);
        assert!(sync.store.resolve("key-b").await.is_some());
        assert!(summary
            .log
            .iter()
            .any(|line| line.contains("Error processing Casuals")));
    }

    #[tokio::test]
    async fn departure_in_processed_organization_survives_other_failure() {
        let mut directory = FakeDirectory::default();
        directory.rosters.insert("Sweats".into(), Ok(Vec::new()));
        directory
            .rosters
            .insert("Casuals".into(), Err("directory unavailable".into()));

        let previous = vec![
            member("Alice", "id-alice", "Sweats", "key-a"),
            member("Bob", "id-bob", "Casuals", "key-b"),
        ];
        let (sync, _dir) = synchronizer(directory, &previous, &["Sweats", "Casuals"]);

        let summary = sync.synchronize().await.unwrap();

        assert_eq!(summary.members_who_left, 1);
        let records = sync.snapshot.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].player_name, "Bob");
    }

    #[tokio::test]
    async fn member_in_two_rosters_is_processed_once() {
        let mut directory = FakeDirectory::default();
        directory
            .rosters
            .insert("Sweats".into(), Ok(vec!["id-alice".into()]));
        directory
            .rosters
            .insert("Casuals".into(), Ok(vec!["id-alice".into()]));

        let previous = vec![member("Alice", "id-alice", "Sweats", "key-a")];
        let (sync, _dir) = synchronizer(directory, &previous, &["Sweats", "Casuals"]);

        let summary = sync.synchronize().await.unwrap();

        assert_eq!(summary.final_member_count, 1);
        assert_eq!(summary.members_who_left, 0);
    }
}
