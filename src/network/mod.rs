//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication, plus the
//! optional master-registry heartbeat.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod protocol;
pub mod registration;
pub mod server;

pub use protocol::{
    ClientMessage, ServerMessage, JoinRequest, JoinAccepted, ServerError, ErrorCode,
    ProtocolError,
};
pub use registration::{Registration, RegistrationInfo, RegistrationError};
pub use server::{GameServer, ServerConfig, GameServerError};
