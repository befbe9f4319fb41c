//! WebSocket Game Server
//!
//! Async WebSocket front end for the game gateway. Accepts connections,
//! assigns each a connection id, decodes client events, and executes the
//! effect lists the gateway returns against the room registry.
//!
//! The gateway sits behind a single mutex: one inbound event is dispatched
//! to completion (including its awaited collaborator checks) before the
//! next is taken, so queue and game mutation stays atomic per event and
//! per-room ordering follows arrival order.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::game::queue::GameQueue;
use crate::game::state::{ConnectionId, RoomId};
use crate::network::external::GameDirectory;
use crate::network::gateway::{Effect, Gateway};
use crate::network::protocol::{ClientEvent, ServerEvent};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

type EventSender = mpsc::Sender<ServerEvent>;

/// Connected sockets and room membership.
#[derive(Default)]
struct Registry {
    clients: BTreeMap<ConnectionId, EventSender>,
    rooms: BTreeMap<RoomId, BTreeSet<ConnectionId>>,
}

impl Registry {
    fn insert(&mut self, conn: ConnectionId, sender: EventSender) {
        self.clients.insert(conn, sender);
    }

    fn join(&mut self, room: RoomId, conn: ConnectionId) {
        self.rooms.entry(room).or_default().insert(conn);
    }

    fn leave(&mut self, room: RoomId, conn: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
    }

    /// Drop a room wholesale. Members stay connected; they just stop
    /// receiving fan-out for a match that no longer exists.
    fn close(&mut self, room: RoomId) {
        self.rooms.remove(&room);
    }

    fn remove(&mut self, conn: ConnectionId) {
        self.clients.remove(&conn);
        self.rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }

    fn len(&self) -> usize {
        self.clients.len()
    }

    async fn send_to(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(sender) = self.clients.get(&conn) {
            let _ = sender.send(event).await;
        }
    }

    async fn broadcast_room(&self, room: RoomId, event: ServerEvent) {
        let Some(members) = self.rooms.get(&room) else {
            return;
        };
        for conn in members {
            if let Some(sender) = self.clients.get(conn) {
                let _ = sender.send(event.clone()).await;
            }
        }
    }

    async fn broadcast_all(&self, event: ServerEvent) {
        for sender in self.clients.values() {
            let _ = sender.send(event.clone()).await;
        }
    }
}

/// The WebSocket server: listener, connection tasks, and effect execution.
pub struct GameServer<D: GameDirectory> {
    config: ServerConfig,
    gateway: Arc<Mutex<Gateway<GameQueue, D>>>,
    registry: Arc<RwLock<Registry>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<D: GameDirectory> GameServer<D> {
    /// Create a server over the given collaborator directory.
    pub fn new(config: ServerConfig, directory: D) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            gateway: Arc::new(Mutex::new(Gateway::new(GameQueue::new(), directory))),
            registry: Arc::new(RwLock::new(Registry::default())),
            shutdown_tx,
        }
    }

    /// Signal every connection task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the accept loop until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            "Game server v{} listening on {}",
            self.config.version, self.config.bind_addr
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let connected = self.registry.read().await.len();
                            if connected >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Spawn the task owning one WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let gateway = self.gateway.clone();
        let registry = self.registry.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let conn: ConnectionId = Uuid::new_v4();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerEvent>(64);

            {
                let mut registry = registry.write().await;
                registry.insert(conn, msg_tx);
                info!("Socket {} connected from {} ({} online)", conn, addr, registry.len());
            }

            // Writer task: serialize queued events onto the socket
            let sender_task = tokio::spawn(async move {
                while let Some(event) = msg_rx.recv().await {
                    let text = match event.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientEvent::from_json(&text) {
                                    Ok(event) => {
                                        let effects =
                                            gateway.lock().await.dispatch(conn, event).await;
                                        apply_effects(&registry, conn, effects).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid event from {}: {}", conn, e);
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                // Not part of the protocol; only JSON text frames are
                                debug!("Binary frame from {} dropped", conn);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Socket {} disconnected", conn);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", conn, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();

            // The drop counts as a cancellation request for any bound game
            let effects = gateway.lock().await.handle_disconnect(conn).await;
            apply_effects(&registry, conn, effects).await;

            let mut registry = registry.write().await;
            registry.remove(conn);
            info!("Socket {} cleaned up ({} online)", conn, registry.len());
        });
    }
}

/// Execute a gateway effect list against the registry.
async fn apply_effects(registry: &Arc<RwLock<Registry>>, conn: ConnectionId, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Send(event) => {
                registry.read().await.send_to(conn, event).await;
            }
            Effect::Broadcast { room, event } => {
                registry.read().await.broadcast_room(room, event).await;
            }
            Effect::BroadcastAll(event) => {
                registry.read().await.broadcast_all(event).await;
            }
            Effect::JoinRoom(room) => {
                registry.write().await.join(room, conn);
            }
            Effect::LeaveRoom(room) => {
                registry.write().await.leave(room, conn);
            }
            Effect::CloseRoom(room) => {
                registry.write().await.close(room);
            }
        }
    }
}
