//! GuildBridge Relay Server
//!
//! WebSocket relay bridging guild chat between game clients and group
//! channels, with per-connection bridge-key authentication, guild-scoped
//! routing, and rate-limited membership synchronization.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use guildbridge_core::config::{BridgeConfig, RelayConfig, SyncConfig};
use guildbridge_core::tracing_init::init_tracing;

use guildbridge_relay::auth::CredentialStore;
use guildbridge_relay::dedup::MessageDeduplicator;
use guildbridge_relay::registry::ConnectionRegistry;
use guildbridge_relay::server::{BridgeEvent, BridgeServer, event_channel};
use guildbridge_relay::storage::SnapshotStore;
use guildbridge_relay::sync::{CallBudget, DirectoryClient, MembershipSynchronizer};

#[derive(Parser, Debug)]
#[command(name = "guildbridge-relay")]
#[command(
    version,
    about = "GuildBridge relay server - guild chat router and membership sync"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Path to the membership snapshot file.
    #[arg(long, default_value = "guild_members.json")]
    snapshot_path: PathBuf,

    /// Organizations served by the bridge (comma separated).
    #[arg(long, value_delimiter = ',', default_value = "Sweats,Casuals")]
    organizations: Vec<String>,

    /// Membership directory API base URL.
    #[arg(long, default_value = "https://api.hypixel.net")]
    directory_url: String,

    /// Membership directory API key.
    #[arg(long, env = "GUILDBRIDGE_DIRECTORY_KEY", default_value = "")]
    directory_key: String,

    /// Seconds between membership synchronization passes.
    #[arg(long, default_value_t = 600)]
    sync_interval: u64,

    /// Handshake timeout in seconds.
    #[arg(long, default_value_t = 10)]
    auth_timeout: u64,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("guildbridge_relay=info", args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting guildbridge-relay"
    );

    let config = BridgeConfig {
        relay: RelayConfig {
            auth_timeout_secs: args.auth_timeout,
            ..Default::default()
        },
        sync: SyncConfig {
            interval_secs: args.sync_interval,
            snapshot_path: args.snapshot_path,
            directory_url: args.directory_url,
            ..Default::default()
        },
        organizations: args.organizations,
    };

    let snapshot = SnapshotStore::new(config.sync.snapshot_path.clone());
    let store = Arc::new(CredentialStore::new());
    match snapshot.load() {
        Ok(records) => store.reload(&records).await,
        Err(e) => warn!(error = %e, "Could not load membership snapshot at startup"),
    }

    let registry = Arc::new(ConnectionRegistry::new());
    let dedup = Arc::new(MessageDeduplicator::new(config.relay.dedup_window));
    let (events_tx, mut events_rx) = event_channel();

    let server = Arc::new(BridgeServer::new(
        config.relay.clone(),
        config.organizations.clone(),
        Arc::clone(&store),
        Arc::clone(&registry),
        dedup,
        events_tx,
    ));

    let budget = Arc::new(CallBudget::new(
        config.sync.max_calls,
        config.sync.window(),
        config.sync.safety_buffer,
    ));
    let directory = DirectoryClient::new(
        config.sync.directory_url.clone(),
        args.directory_key,
        budget,
    );
    let synchronizer = Arc::new(MembershipSynchronizer::new(
        directory,
        snapshot,
        Arc::clone(&store),
        Arc::clone(&registry),
        config.organizations.clone(),
    ));

    // Periodic membership sync; the first pass runs one interval in, not at
    // startup, since the snapshot was just loaded.
    let sync_interval = config.sync.interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sync_interval);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            match synchronizer.synchronize().await {
                Ok(summary) => info!(
                    new_members = summary.new_members_added,
                    departed = summary.members_who_left,
                    total = summary.final_member_count,
                    "Membership sync completed"
                ),
                Err(e) => warn!(error = %e, "Membership sync failed"),
            }
        }
    });

    // In production the chat-platform adapter consumes these events; the
    // standalone binary reports them in the log.
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                BridgeEvent::MemberMessage {
                    message,
                    player,
                    organization,
                    combined,
                } => info!(
                    player = %player,
                    organization = %organization,
                    combined,
                    message = %message,
                    "Member message"
                ),
                BridgeEvent::BounceMessage { player, .. } => {
                    debug!(player = %player, "Combined-channel bounce");
                }
                BridgeEvent::ClientConnected { total } => {
                    info!(total, "Bridge client connected");
                }
                BridgeEvent::ClientDisconnected { total } => {
                    info!(total, "Bridge client disconnected");
                }
            }
        }
    });

    let listener = TcpListener::bind(args.addr).await?;
    tokio::select! {
        result = server.run(listener) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Relay stopped");
    Ok(())
}
