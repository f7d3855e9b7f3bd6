//! Client Connection
//!
//! WebSocket link to a game server. A reader task routes server messages
//! into a latest-wins snapshot slot and small per-kind event queues; a
//! writer task drains outgoing messages. Nothing here blocks the caller's
//! frame: every accessor is synchronous and non-waiting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::game::events::{EventKind, GameEvent};
use crate::game::input::InputCommand;
use crate::network::protocol::{
    ClientMessage, JoinAccepted, JoinRequest, ProtocolError, ServerMessage,
};
use crate::replication::snapshot::Snapshot;

/// Capacity of each event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 4;

/// Outgoing message queue depth.
const OUTGOING_QUEUE_DEPTH: usize = 128;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Could not open the WebSocket.
    #[error("Connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// Message could not be encoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Link is closed.
    #[error("Not connected")]
    NotConnected,

    /// Outgoing queue is full.
    #[error("Outgoing queue full")]
    QueueFull,
}

/// Link state.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    /// No link
    Disconnected,
    /// Dialing
    Connecting,
    /// Socket open, join not yet answered
    Connected,
    /// Server accepted the join
    Joined(JoinAccepted),
    /// Join refused or link failed
    Error(String),
}

impl ConnectionState {
    /// Whether the server accepted our join.
    pub fn is_joined(&self) -> bool {
        matches!(self, ConnectionState::Joined(_))
    }
}

/// Single-value slot where a newer value replaces an unread older one.
#[derive(Debug)]
pub struct LatestSlot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for LatestSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> LatestSlot<T> {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, returning the unread value it replaced.
    pub fn put(&self, value: T) -> Option<T> {
        let mut slot = self.value.lock().unwrap_or_else(|e| e.into_inner());
        slot.replace(value)
    }

    /// Take the value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.value.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }
}

/// Per-kind bounded event queues. A full queue drops the new event.
struct EventRouter {
    senders: BTreeMap<EventKind, mpsc::Sender<GameEvent>>,
}

impl EventRouter {
    fn new() -> (Self, BTreeMap<EventKind, mpsc::Receiver<GameEvent>>) {
        let mut senders = BTreeMap::new();
        let mut receivers = BTreeMap::new();
        for kind in [
            EventKind::BoomerangCharge,
            EventKind::BoomerangThrow,
            EventKind::BoomerangCatch,
            EventKind::BoomerangHit,
            EventKind::Presence,
        ] {
            let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
            senders.insert(kind, tx);
            receivers.insert(kind, rx);
        }
        (Self { senders }, receivers)
    }

    fn route(&self, event: GameEvent) {
        let kind = event.kind();
        if let Some(tx) = self.senders.get(&kind) {
            if tx.try_send(event).is_err() {
                debug!(?kind, "Event queue full, dropping event");
            }
        }
    }
}

/// WebSocket connection to a game server.
pub struct ClientConnection {
    state: watch::Receiver<ConnectionState>,
    outgoing: mpsc::Sender<ClientMessage>,
    snapshots: LatestSlot<Snapshot>,
    events: BTreeMap<EventKind, mpsc::Receiver<GameEvent>>,
    last_rtt_ms: Arc<AtomicI64>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientConnection {
    /// Dial `url` (e.g. `ws://127.0.0.1:7373`) and send `join`.
    ///
    /// Returns once the socket is open; the join answer arrives later as a
    /// state change.
    pub async fn connect(url: &str, join: JoinRequest) -> Result<Self, ClientError> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let ws_stream = match connect_async(url).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                let _ = state_tx.send(ConnectionState::Error(e.to_string()));
                return Err(e.into());
            }
        };
        info!("Connected to {}", url);
        let _ = state_tx.send(ConnectionState::Connected);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(OUTGOING_QUEUE_DEPTH);
        let snapshots = LatestSlot::new();
        let (router, events) = EventRouter::new();
        let last_rtt_ms = Arc::new(AtomicI64::new(-1));
        let state_tx = Arc::new(state_tx);

        // Writer
        let writer_state = state_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(text)).await {
                    writer_state.send_replace(ConnectionState::Error(e.to_string()));
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        // Reader
        let reader_state = state_tx;
        let reader_slot = snapshots.clone();
        let reader_rtt = last_rtt_ms.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Connection error: {}", e);
                        reader_state.send_replace(ConnectionState::Error(e.to_string()));
                        return;
                    }
                };

                let msg = match ServerMessage::from_json(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!("Ignoring malformed server message: {}", e);
                        continue;
                    }
                };

                match msg {
                    ServerMessage::JoinAccepted(accepted) => {
                        info!(
                            entity = %accepted.entity,
                            server = %accepted.server_name,
                            tick_rate = accepted.tick_rate,
                            "Join accepted"
                        );
                        reader_state.send_replace(ConnectionState::Joined(accepted));
                    }
                    ServerMessage::JoinRejected { reason } => {
                        info!("Join rejected: {}", reason);
                        reader_state.send_replace(ConnectionState::Error(format!(
                            "join rejected: {reason}"
                        )));
                    }
                    ServerMessage::Snapshot(snapshot) => {
                        reader_slot.put(snapshot);
                    }
                    ServerMessage::Event(event) => router.route(event),
                    ServerMessage::Pong { timestamp, .. } => {
                        let rtt = chrono::Utc::now().timestamp_millis() - timestamp;
                        reader_rtt.store(rtt.max(0), Ordering::Relaxed);
                    }
                    ServerMessage::Error(err) => {
                        warn!(code = ?err.code, "Server error: {}", err.message);
                    }
                    ServerMessage::Shutdown { reason } => {
                        info!("Server shutting down: {}", reason);
                        break;
                    }
                }
            }

            reader_state.send_if_modified(|state| {
                if matches!(state, ConnectionState::Error(_)) {
                    false
                } else {
                    *state = ConnectionState::Disconnected;
                    true
                }
            });
        });

        let connection = Self {
            state: state_rx,
            outgoing: out_tx,
            snapshots,
            events,
            last_rtt_ms,
            tasks: vec![writer, reader],
        };
        connection.send(ClientMessage::JoinRequest(join))?;
        Ok(connection)
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Wait until the state changes. Returns the new state, or `None` once
    /// both link tasks have finished.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.state.changed().await.ok()?;
        Some(self.state())
    }

    /// Queue a message without waiting.
    pub fn send(&self, msg: ClientMessage) -> Result<(), ClientError> {
        self.outgoing.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::NotConnected,
        })
    }

    /// Queue an input for the local player.
    pub fn send_input(&self, input: InputCommand) -> Result<(), ClientError> {
        self.send(ClientMessage::Input(input))
    }

    /// Queue a latency ping.
    pub fn ping(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Last measured round trip in milliseconds.
    pub fn last_rtt_ms(&self) -> Option<i64> {
        let rtt = self.last_rtt_ms.load(Ordering::Relaxed);
        (rtt >= 0).then_some(rtt)
    }

    /// Newest snapshot not yet taken.
    pub fn take_snapshot(&mut self) -> Option<Snapshot> {
        self.snapshots.take()
    }

    /// Pending events of one kind, oldest first.
    pub fn drain_events(&mut self, kind: EventKind) -> Vec<GameEvent> {
        let mut drained = Vec::new();
        if let Some(rx) = self.events.get_mut(&kind) {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }
        drained
    }

    /// Say goodbye and close the link.
    pub fn disconnect(&mut self) {
        let _ = self.send(ClientMessage::Leave);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::config::SimConfig;
    use crate::game::events::GameEventData;
    use crate::game::level::LevelData;
    use crate::game::world::EntityId;
    use crate::network::server::{GameServer, ServerConfig};
    use std::net::SocketAddr;
    use std::time::Duration;

    fn event(owner: u64) -> GameEvent {
        GameEvent::new(
            1,
            GameEventData::BoomerangCatch {
                owner: EntityId(owner),
                boomerang: EntityId(99),
            },
        )
    }

    #[test]
    fn test_latest_slot_keeps_newest() {
        let slot = LatestSlot::new();
        assert_eq!(slot.put(1), None);
        assert_eq!(slot.put(2), Some(1));
        assert_eq!(slot.take(), Some(2));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_event_queue_drops_when_full() {
        let (router, mut receivers) = EventRouter::new();
        for owner in 0..10 {
            router.route(event(owner));
        }
        let rx = receivers.get_mut(&EventKind::BoomerangCatch).unwrap();
        let mut got = Vec::new();
        while let Ok(e) = rx.try_recv() {
            got.push(e);
        }
        assert_eq!(got.len(), EVENT_QUEUE_CAPACITY);
        // Oldest are kept, newest dropped
        assert_eq!(got[0], event(0));

        let hits = receivers.get_mut(&EventKind::BoomerangHit).unwrap();
        assert!(hits.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        let result = ClientConnection::connect("ws://127.0.0.1:9", JoinRequest::default()).await;
        assert!(matches!(result, Err(ClientError::Connect(_))));
    }

    #[tokio::test]
    async fn test_join_and_receive_snapshots() {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            tick_rate: 60,
            ..Default::default()
        };
        let server = Arc::new(GameServer::new(config, SimConfig::default(), LevelData::arena()));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        let join = JoinRequest {
            version: env!("CARGO_PKG_VERSION").to_string(),
            player_name: "client".to_string(),
            ..Default::default()
        };
        let mut conn = ClientConnection::connect(&format!("ws://{addr}"), join).await.unwrap();

        let state = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = conn.state();
                if !matches!(state, ConnectionState::Connected | ConnectionState::Connecting) {
                    return state;
                }
                conn.changed().await;
            }
        })
        .await
        .unwrap();
        let ConnectionState::Joined(accepted) = state else {
            panic!("unexpected state {state:?}");
        };

        let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(s) = conn.take_snapshot() {
                    if s.entity(accepted.entity).is_some() {
                        return s;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(snapshot.tick > 0);

        conn.ping().unwrap();
        let presence = conn.drain_events(EventKind::Presence);
        assert!(presence.len() <= EVENT_QUEUE_CAPACITY);

        server.shutdown();
        handle.await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while conn.state().is_joined() {
                if conn.changed().await.is_none() {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
