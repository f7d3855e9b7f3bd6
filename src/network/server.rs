//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//!
//! Connection tasks parse messages and enqueue [`SimCommand`]s; they never
//! touch game state. A single game-loop task owns the [`Simulation`], ticks
//! it at a fixed rate and broadcasts the resulting snapshot and events. The
//! connection table is the only state shared between the two sides.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::config::SimConfig;
use crate::game::level::LevelData;
use crate::game::tick::{ClientId, SimCommand, Simulation};
use crate::game::world::EntityId;
use crate::network::protocol::{
    ClientMessage, ErrorCode, JoinAccepted, JoinRequest, ServerMessage,
};
use crate::replication::registry::ComponentRegistry;
use crate::replication::snapshot::build_snapshot;

/// Outgoing queue depth per connection. A client this far behind starts
/// losing snapshots rather than stalling the tick.
const CLIENT_QUEUE_DEPTH: usize = 64;

/// Command queue depth between connection tasks and the game loop.
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Maximum joined players.
    pub max_players: usize,
    /// Tick rate for game simulation (Hz).
    pub tick_rate: u32,
    /// Display name.
    pub name: String,
    /// Server version string.
    pub version: String,
    /// Reject joins whose version differs from ours.
    pub version_check: bool,
    /// Level JSON file (`None` = built-in arena).
    pub level_path: Option<PathBuf>,
    /// Master registry base URL (`None` = unlisted).
    pub registry_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7373)),
            max_connections: 64,
            max_players: 8,
            tick_rate: 20,
            name: "Doomerang Server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            version_check: true,
            level_path: None,
            registry_url: None,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct Connection {
    /// Remote address.
    addr: SocketAddr,
    /// Encoded messages to this client.
    sender: mpsc::Sender<Arc<str>>,
    /// Player entity once the join has been processed.
    entity: Option<EntityId>,
    /// Join queued, waiting for the next tick.
    pending_join: Option<PendingJoin>,
    /// Connection time.
    connected_at: Instant,
}

struct PendingJoin {
    name: String,
    reconnect_token: String,
}

type ConnectionTable = Arc<RwLock<BTreeMap<ClientId, Connection>>>;

/// Facts the game loop reports to joining clients.
#[derive(Debug, Clone)]
struct ServerInfo {
    name: String,
    tick_rate: u32,
    level: String,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Simulation tuning.
    sim_config: SimConfig,
    /// Level to run.
    level: Arc<LevelData>,
    /// Connected clients.
    connections: ConnectionTable,
    /// Joined player count, refreshed every tick.
    players: Arc<AtomicUsize>,
    /// Next connection id.
    next_client: AtomicU64,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, sim_config: SimConfig, level: LevelData) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sim_config = SimConfig {
            tick_rate: config.tick_rate,
            ..sim_config
        };

        Self {
            config,
            sim_config,
            level: Arc::new(level),
            connections: Arc::new(RwLock::new(BTreeMap::new())),
            players: Arc::new(AtomicUsize::new(0)),
            next_client: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live player count shared with background tasks.
    pub fn player_counter(&self) -> Arc<AtomicUsize> {
        self.players.clone()
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, GameServerError> {
        Ok(TcpListener::bind(&self.config.bind_addr).await?)
    }

    /// Bind and run until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` and run the game loop until shutdown.
    #[instrument(skip(self, listener), fields(name = %self.config.name))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Game server listening on {} ({} Hz, level {:?})",
            listener.local_addr()?,
            self.config.tick_rate,
            self.level.name
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let simulation = Simulation::new(self.sim_config.clone(), self.level.clone());
        let info = ServerInfo {
            name: self.config.name.clone(),
            tick_rate: self.config.tick_rate,
            level: self.level.name.clone(),
        };

        let loop_handle = tokio::spawn(run_game_loop(
            simulation,
            command_rx,
            self.connections.clone(),
            self.players.clone(),
            info,
            self.shutdown_tx.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let count = self.connections.read().await.len();
                            if count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            let client = self.next_client.fetch_add(1, Ordering::Relaxed);
                            info!(client, "New connection from {}", addr);
                            self.handle_connection(stream, addr, client, command_tx.clone());
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

        if let Err(e) = loop_handle.await {
            error!("Game loop task failed: {}", e);
        }
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        client: ClientId,
        commands: mpsc::Sender<SimCommand>,
    ) {
        let connections = self.connections.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<Arc<str>>(CLIENT_QUEUE_DEPTH);

            // Register client
            connections.write().await.insert(client, Connection {
                addr,
                sender: msg_tx.clone(),
                entity: None,
                pending_join: None,
                connected_at: Instant::now(),
            });

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(text) = msg_rx.recv().await {
                    if ws_sender.send(Message::Text(text.to_string())).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        send(&msg_tx, &ServerMessage::error(
                                            ErrorCode::InvalidMessage,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                let keep_going = handle_client_message(
                                    client,
                                    client_msg,
                                    &connections,
                                    &config,
                                    &commands,
                                    &msg_tx,
                                ).await;
                                if !keep_going {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                send(&msg_tx, &ServerMessage::error(
                                    ErrorCode::InvalidMessage,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        send(&msg_tx, &ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup: the player is removed on the next tick
            let removed = connections.write().await.remove(&client);
            if let Some(conn) = removed {
                if conn.entity.is_some() || conn.pending_join.is_some() {
                    let _ = commands.send(SimCommand::Leave { client }).await;
                }
                debug!(
                    client,
                    "Connection from {} lasted {:?}",
                    conn.addr,
                    conn.connected_at.elapsed()
                );
            }
            drop(msg_tx);
            let _ = sender_task.await;

            info!(client, "Client {} cleaned up", addr);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Joined player count as of the last tick.
    pub fn player_count(&self) -> usize {
        self.players.load(Ordering::Relaxed)
    }
}

/// Encode and queue one message for a client.
async fn send(sender: &mpsc::Sender<Arc<str>>, msg: &ServerMessage) {
    match msg.to_json() {
        Ok(text) => {
            let _ = sender.send(Arc::from(text)).await;
        }
        Err(e) => error!("Failed to serialize message: {}", e),
    }
}

/// Handle a client message. Returns false when the connection should close.
async fn handle_client_message(
    client: ClientId,
    msg: ClientMessage,
    connections: &ConnectionTable,
    config: &ServerConfig,
    commands: &mpsc::Sender<SimCommand>,
    sender: &mpsc::Sender<Arc<str>>,
) -> bool {
    match msg {
        ClientMessage::JoinRequest(req) => {
            handle_join(client, req, connections, config, commands, sender).await;
            true
        }
        ClientMessage::Input(input) => {
            let joined = connections
                .read()
                .await
                .get(&client)
                .is_some_and(|c| c.entity.is_some());
            if !joined {
                send(sender, &ServerMessage::error(ErrorCode::NotJoined, "Join first")).await;
                return true;
            }
            commands.send(SimCommand::Input { client, input }).await.is_ok()
        }
        ClientMessage::Ping { timestamp } => {
            send(sender, &ServerMessage::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis(),
            }).await;
            true
        }
        ClientMessage::Leave => false,
    }
}

/// Validate a join and queue it for the next tick.
async fn handle_join(
    client: ClientId,
    req: JoinRequest,
    connections: &ConnectionTable,
    config: &ServerConfig,
    commands: &mpsc::Sender<SimCommand>,
    sender: &mpsc::Sender<Arc<str>>,
) {
    if config.version_check && req.version != config.version {
        info!(client, "Version mismatch: got {:?}, want {:?}", req.version, config.version);
        send(sender, &ServerMessage::JoinRejected {
            reason: format!(
                "Version mismatch: server={} client={}",
                config.version, req.version
            ),
        }).await;
        return;
    }

    let name = if req.player_name.trim().is_empty() {
        format!("Player {client}")
    } else {
        req.player_name.trim().to_string()
    };

    {
        let mut table = connections.write().await;
        let occupied = table
            .values()
            .filter(|c| c.entity.is_some() || c.pending_join.is_some())
            .count();

        let Some(conn) = table.get_mut(&client) else {
            return;
        };
        if conn.entity.is_some() || conn.pending_join.is_some() {
            drop(table);
            send(sender, &ServerMessage::error(ErrorCode::AlreadyJoined, "Already joined")).await;
            return;
        }
        if occupied >= config.max_players {
            drop(table);
            send(sender, &ServerMessage::JoinRejected {
                reason: "Server full".to_string(),
            }).await;
            return;
        }

        if let Some(token) = &req.reconnect_token {
            debug!(client, token = %token, "Join with reconnect token");
        }
        conn.pending_join = Some(PendingJoin {
            name: name.clone(),
            reconnect_token: uuid::Uuid::new_v4().simple().to_string(),
        });
    }

    if commands.send(SimCommand::Join { client, name }).await.is_err() {
        send(sender, &ServerMessage::error(ErrorCode::InternalError, "Game loop stopped")).await;
    }
}

// =============================================================================
// GAME LOOP
// =============================================================================

/// Fixed-rate game loop. Sole owner of the simulation.
async fn run_game_loop(
    mut simulation: Simulation,
    mut commands: mpsc::Receiver<SimCommand>,
    connections: ConnectionTable,
    players: Arc<AtomicUsize>,
    info: ServerInfo,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let registry = ComponentRegistry::standard();
    let tick_duration = Duration::from_micros(1_000_000 / u64::from(info.tick_rate.max(1)));
    let mut tick_interval = interval(tick_duration);
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {}
            _ = shutdown_rx.recv() => {
                info!(tick = simulation.current_tick(), "Game loop stopping");
                break;
            }
        }

        let mut batch = Vec::new();
        while let Ok(command) = commands.try_recv() {
            batch.push(command);
        }

        let result = simulation.tick(batch);
        players.store(simulation.player_count(), Ordering::Relaxed);

        if !result.joined.is_empty() {
            accept_joins(&result.joined, &connections, &info).await;
        }

        let snapshot = match build_snapshot(simulation.world(), &registry, result.tick) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(tick = result.tick, "Snapshot failed: {}", e);
                continue;
            }
        };

        let mut outgoing = Vec::with_capacity(result.events.len() + 1);
        for event in result.events {
            outgoing.push(ServerMessage::Event(event));
        }
        outgoing.push(ServerMessage::Snapshot(snapshot));
        broadcast_joined(&connections, &outgoing).await;
    }
}

/// Bind joined entities to their connections and send `JoinAccepted`.
async fn accept_joins(
    joined: &[(ClientId, EntityId)],
    connections: &ConnectionTable,
    info: &ServerInfo,
) {
    let mut table = connections.write().await;
    for &(client, entity) in joined {
        // Disconnected before the tick: a Leave is already queued
        let Some(conn) = table.get_mut(&client) else {
            continue;
        };
        let Some(pending) = conn.pending_join.take() else {
            continue;
        };
        conn.entity = Some(entity);

        let msg = ServerMessage::JoinAccepted(JoinAccepted {
            entity,
            reconnect_token: pending.reconnect_token,
            server_name: info.name.clone(),
            tick_rate: info.tick_rate,
            level: info.level.clone(),
            levels: vec![info.level.clone()],
        });
        match msg.to_json() {
            Ok(text) => {
                if conn.sender.try_send(Arc::from(text)).is_err() {
                    warn!(client, "Could not deliver JoinAccepted");
                }
            }
            Err(e) => error!("Failed to serialize message: {}", e),
        }
        info!(client, entity = %entity, "Player {:?} joined", pending.name);
    }
}

/// Send messages to every joined client without waiting on slow ones.
async fn broadcast_joined(connections: &ConnectionTable, messages: &[ServerMessage]) {
    let encoded: Vec<Arc<str>> = messages
        .iter()
        .filter_map(|m| match m.to_json() {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                None
            }
        })
        .collect();

    let table = connections.read().await;
    for (client, conn) in table.iter().filter(|(_, c)| c.entity.is_some()) {
        for text in &encoded {
            if conn.sender.try_send(text.clone()).is_err() {
                debug!(client, "Client queue full, dropping message");
                break;
            }
        }
    }
}
