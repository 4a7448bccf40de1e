//! WebSocket accept loop and the per-connection protocol state machine.
//!
//! Every accepted socket starts unauthenticated with a bounded wait for the
//! handshake frame; the only transitions out of that state are a successful
//! authentication or a terminal close with a distinct protocol close code.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use guildbridge_core::config::RelayConfig;
use guildbridge_proto::{ClientFrame, CloseReason, FrameError, RelayPayload, ServerFrame};

use crate::auth::{CredentialStore, Identity};
use crate::dedup::{MessageDeduplicator, clean_message};
use crate::registry::{BridgeConnection, ConnectionRegistry, Outbound};

use super::events::BridgeEvent;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Shared state for every connection task.
pub struct BridgeServer {
    config: RelayConfig,
    organizations: Vec<String>,
    store: Arc<CredentialStore>,
    registry: Arc<ConnectionRegistry>,
    dedup: Arc<MessageDeduplicator>,
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeServer {
    pub fn new(
        config: RelayConfig,
        organizations: Vec<String>,
        store: Arc<CredentialStore>,
        registry: Arc<ConnectionRegistry>,
        dedup: Arc<MessageDeduplicator>,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            config,
            organizations,
            store,
            registry,
            dedup,
            events,
        }
    }

    /// Accept connections until the listener fails, one task per socket.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "Bridge relay listening");
        loop {
            let (stream, addr) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                server.handle_connection(stream, addr).await;
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(%addr, error = %e, "WebSocket handshake failed");
                return;
            }
        };
        debug!(%addr, "Client connected, awaiting authentication");
        let (mut write, mut read) = ws.split();

        // Handshake phase: bounded wait for the first data frame.
        let identity = match timeout(self.config.auth_timeout(), next_data(&mut read)).await {
            Err(_) => {
                debug!(%addr, "Client authentication timeout");
                reject(&mut write, CloseReason::AuthTimeout).await;
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                debug!(%addr, error = %e, "Connection error before authentication");
                return;
            }
            Ok(Some(Ok(message))) => {
                let Message::Text(text) = message else {
                    reject(&mut write, CloseReason::InvalidFormat).await;
                    return;
                };
                match self.authenticate(&text).await {
                    Ok(identity) => identity,
                    Err(reason) => {
                        if reason == CloseReason::InvalidKey {
                            let _ = write
                                .send(Message::Text(ServerFrame::AuthFailed.encode()))
                                .await;
                        }
                        reject(&mut write, reason).await;
                        return;
                    }
                }
            }
        };

        // Success ack goes out before the connection joins the fan-out set.
        if write
            .send(Message::Text(ServerFrame::AuthSuccess.encode()))
            .await
            .is_err()
        {
            return;
        }

        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(self.config.outbound_queue);
        let conn = self.registry.register(identity, out_tx).await;
        let total = self.registry.count().await;
        info!(
            player = %conn.identity.player_name,
            organization = %conn.identity.organization,
            total,
            "Client authenticated"
        );
        let _ = self.events.send(BridgeEvent::ClientConnected { total });

        // Write task: drains the outbound queue; a Close entry ends it.
        let write_task = tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Frame(frame) => {
                        if write.send(Message::Text(frame.encode())).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close(reason) => {
                        let _ = write.send(close_message(reason)).await;
                        break;
                    }
                }
            }
            let _ = write.close().await;
        });

        // Read loop: frames from one connection are processed in order, one
        // at a time.
        while let Some(result) = read.next().await {
            match result {
                Ok(Message::Text(text)) => self.handle_frame(&conn, &text).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(player = %conn.identity.player_name, error = %e, "Connection error");
                    break;
                }
            }
        }

        // Both the ordinary close path and a forced disconnect funnel here;
        // whoever removes the entry first reports the departure.
        if self.registry.unregister(conn.id).await.is_some() {
            let total = self.registry.count().await;
            info!(player = %conn.identity.player_name, total, "Client disconnected");
            let _ = self.events.send(BridgeEvent::ClientDisconnected { total });
        }
        write_task.abort();
    }

    /// Resolve the handshake frame against the credential store.
    async fn authenticate(&self, text: &str) -> Result<Identity, CloseReason> {
        match ClientFrame::decode(text) {
            Ok(ClientFrame::Handshake { key }) => match self.store.resolve(&key).await {
                Some(identity) => Ok(identity),
                None => {
                    info!("Invalid bridge key attempted");
                    Err(CloseReason::InvalidKey)
                }
            },
            Ok(_) => Err(CloseReason::InvalidFormat),
            Err(FrameError::InvalidJson(e)) => {
                debug!(error = %e, "Invalid JSON during authentication");
                Err(CloseReason::InvalidJson)
            }
            Err(FrameError::InvalidFormat) => Err(CloseReason::InvalidFormat),
        }
    }

    async fn handle_frame(&self, conn: &BridgeConnection, text: &str) {
        match ClientFrame::decode(text) {
            Ok(ClientFrame::Query { request }) => self.handle_query(conn, &request).await,
            Ok(ClientFrame::CombinedChat { msg }) => self.handle_combined(conn, msg).await,
            Ok(ClientFrame::Chat { msg }) => self.handle_chat(conn, &msg).await,
            Ok(ClientFrame::Handshake { .. }) => {
                // Re-authentication is not supported; a changed identity
                // requires a new connection.
                debug!(player = %conn.identity.player_name, "Handshake on authenticated connection ignored");
            }
            Err(e) => {
                debug!(player = %conn.identity.player_name, error = %e, "Undecodable frame dropped");
            }
        }
    }

    async fn handle_chat(&self, conn: &BridgeConnection, msg: &str) {
        if !self.dedup.is_unique(msg).await {
            return;
        }
        let _ = self.events.send(BridgeEvent::MemberMessage {
            message: clean_message(msg),
            player: conn.identity.player_name.clone(),
            organization: conn.identity.organization.clone(),
            combined: false,
        });
    }

    async fn handle_combined(&self, conn: &BridgeConnection, msg: String) {
        // Combined traffic reaches every organization for visibility, minus
        // the exact sending connection, and is echoed back to the adapter.
        let payload = ServerFrame::Relay(RelayPayload {
            from: "mc".to_string(),
            message: Some(msg.clone()),
            guild: Some(conn.identity.organization.clone()),
            combinedbridge: Some(true),
        });
        let delivered = self.registry.broadcast_except(&payload, conn.id).await;
        debug!(player = %conn.identity.player_name, delivered, "Combined message fanned out");

        let _ = self.events.send(BridgeEvent::BounceMessage {
            message: msg.clone(),
            player: conn.identity.player_name.clone(),
            organization: conn.identity.organization.clone(),
        });
        let _ = self.events.send(BridgeEvent::MemberMessage {
            message: msg,
            player: conn.identity.player_name.clone(),
            organization: conn.identity.organization.clone(),
            combined: true,
        });
    }

    async fn handle_query(&self, conn: &BridgeConnection, request: &str) {
        let response = match request {
            "getOnlinePlayers" => {
                let players = self
                    .registry
                    .players_by_organization(&self.organizations)
                    .await;
                serde_json::to_value(players).unwrap_or_default()
            }
            _ => {
                warn!(request = %request, "Unknown client request");
                return;
            }
        };

        // Unicast reply to the requesting player.
        let frame = ServerFrame::QueryResponse {
            request: request.to_string(),
            response,
        };
        let delivered = self
            .registry
            .publish(&frame, None, Some(&conn.identity.player_name))
            .await;
        debug!(
            player = %conn.identity.player_name,
            request = %request,
            delivered,
            "Answered client request"
        );
    }
}

/// Next data frame, skipping transport-level ping/pong traffic.
async fn next_data(
    read: &mut WsSource,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    while let Some(item) = read.next().await {
        match &item {
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            _ => return Some(item),
        }
    }
    None
}

fn close_message(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(reason.code()),
        reason: reason.reason().into(),
    }))
}

/// Terminal handshake failure: close with the distinct protocol code. No
/// retry is offered on this connection.
async fn reject(write: &mut WsSink, reason: CloseReason) {
    let _ = write.send(close_message(reason)).await;
    let _ = write.close().await;
}
