//! Authenticated connection set and the `publish` fan-out primitive.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use guildbridge_proto::{CloseReason, ServerFrame};

use crate::auth::Identity;

/// What a connection's write task should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(ServerFrame),
    Close(CloseReason),
}

/// Holds one authenticated connection.
///
/// Frames are pushed through a bounded channel; a full or closed channel
/// means the transport is not currently writable and the frame is dropped
/// rather than queued.
pub struct BridgeConnection {
    /// Registry-local connection id.
    pub id: u64,
    /// Identity bound at handshake time.
    pub identity: Identity,
    outbound: mpsc::Sender<Outbound>,
}

impl BridgeConnection {
    /// Best-effort send; never waits for a slow consumer.
    pub fn try_send(&self, frame: ServerFrame) -> bool {
        self.outbound.try_send(Outbound::Frame(frame)).is_ok()
    }

    fn try_close(&self, reason: CloseReason) -> bool {
        self.outbound.try_send(Outbound::Close(reason)).is_ok()
    }
}

/// Thread-safe registry of authenticated connections.
///
/// The connection set is mutated only through `register`/`unregister`/
/// `disconnect_player`; every read goes through an accessor holding the lock,
/// so callers always observe a consistent view.
#[derive(Clone)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<u64, Arc<BridgeConnection>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Add an authenticated connection and return its handle.
    pub async fn register(
        &self,
        identity: Identity,
        outbound: mpsc::Sender<Outbound>,
    ) -> Arc<BridgeConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(BridgeConnection {
            id,
            identity,
            outbound,
        });
        self.connections
            .write()
            .await
            .insert(id, Arc::clone(&conn));
        info!(
            player = %conn.identity.player_name,
            organization = %conn.identity.organization,
            "Bridge connection registered"
        );
        conn
    }

    /// Remove a connection. A second removal of the same id is a no-op, so
    /// the close path and a forced disconnect can race safely.
    pub async fn unregister(&self, id: u64) -> Option<Arc<BridgeConnection>> {
        let conn = self.connections.write().await.remove(&id);
        match &conn {
            Some(c) => info!(player = %c.identity.player_name, "Bridge connection unregistered"),
            None => debug!(id, "Connection already unregistered"),
        }
        conn
    }

    /// Total authenticated connections.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Distinct authenticated players per organization.
    ///
    /// A player holding several simultaneous connections counts once.
    pub async fn count_by_organization(&self) -> HashMap<String, usize> {
        let connections = self.connections.read().await;
        let mut players: HashMap<&str, HashSet<&str>> = HashMap::new();
        for conn in connections.values() {
            players
                .entry(conn.identity.organization.as_str())
                .or_default()
                .insert(conn.identity.player_name.as_str());
        }
        players
            .into_iter()
            .map(|(organization, names)| (organization.to_string(), names.len()))
            .collect()
    }

    /// Distinct player names per organization. Every entry in
    /// `organizations` appears in the result, even when empty.
    pub async fn players_by_organization(
        &self,
        organizations: &[String],
    ) -> HashMap<String, Vec<String>> {
        let connections = self.connections.read().await;
        let mut players: HashMap<String, Vec<String>> = organizations
            .iter()
            .map(|organization| (organization.clone(), Vec::new()))
            .collect();
        for conn in connections.values() {
            let names = players
                .entry(conn.identity.organization.clone())
                .or_default();
            if !names.contains(&conn.identity.player_name) {
                names.push(conn.identity.player_name.clone());
            }
        }
        for names in players.values_mut() {
            names.sort();
        }
        players
    }

    /// Fan a frame out to every connection matching the filters; an absent
    /// filter matches all.
    ///
    /// Delivery is best-effort: a connection whose transport is not currently
    /// writable is skipped, never queued or retried. Returns how many
    /// connections accepted the frame.
    pub async fn publish(
        &self,
        frame: &ServerFrame,
        organization: Option<&str>,
        player: Option<&str>,
    ) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for conn in connections.values() {
            let matches_organization =
                organization.is_none_or(|o| conn.identity.organization == o);
            let matches_player = player.is_none_or(|p| conn.identity.player_name == p);
            if matches_organization && matches_player && conn.try_send(frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver a frame to every connection except one — used for the
    /// combined channel, which reaches every organization but is not
    /// re-delivered to the exact sending connection.
    pub async fn broadcast_except(&self, frame: &ServerFrame, exclude_id: u64) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for conn in connections.values() {
            if conn.id != exclude_id && conn.try_send(frame.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Force-close every connection bound to `player_name`.
    ///
    /// Safe to invoke concurrently with a connection's own close path.
    /// Returns whether any live connection was dropped.
    pub async fn disconnect_player(&self, player_name: &str) -> bool {
        let mut removed = Vec::new();
        {
            let mut connections = self.connections.write().await;
            connections.retain(|_, conn| {
                if conn.identity.player_name == player_name {
                    removed.push(Arc::clone(conn));
                    false
                } else {
                    true
                }
            });
        }
        for conn in &removed {
            conn.try_close(CloseReason::Revoked);
            info!(player = %player_name, "Forced disconnect");
        }
        !removed.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
