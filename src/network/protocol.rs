//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON text frames; replicated component payloads inside a
//! snapshot are bincode bytes carried as hex strings.

use serde::{Serialize, Deserialize};

use crate::game::events::GameEvent;
use crate::game::input::InputCommand;
use crate::game::world::EntityId;
use crate::replication::snapshot::Snapshot;

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed JSON or unknown message type.
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame type the protocol doesn't use.
    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a player entity.
    JoinRequest(JoinRequest),

    /// Input for the local player.
    Input(InputCommand),

    /// Ping for latency measurement.
    Ping { timestamp: i64 },

    /// Player is leaving.
    Leave,
}

/// Join handshake request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Client build version
    pub version: String,
    /// Display name
    pub player_name: String,
    /// Token from a previous `JoinAccepted`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_token: Option<String>,
    /// Requested level (empty = server default)
    #[serde(default)]
    pub level: String,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted; the client now has a player entity.
    JoinAccepted(JoinAccepted),

    /// Join refused.
    JoinRejected { reason: String },

    /// Full replicated state for one tick.
    Snapshot(Snapshot),

    /// Game event notification.
    Event(GameEvent),

    /// Pong response.
    Pong { timestamp: i64, server_time: i64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Join handshake reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAccepted {
    /// Player entity id
    pub entity: EntityId,
    /// Token for reconnecting
    pub reconnect_token: String,
    /// Server display name
    pub server_name: String,
    /// Simulation tick rate (Hz)
    pub tick_rate: u32,
    /// Active level name
    pub level: String,
    /// Levels this server can run
    pub levels: Vec<String>,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// Message requires a joined player.
    NotJoined,
    /// Join sent twice.
    AlreadyJoined,
    /// Server is full.
    ServerFull,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Shorthand for an error reply.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }
}
