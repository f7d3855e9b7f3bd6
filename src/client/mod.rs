//! Client Layer
//!
//! Everything a game client needs to play against an authoritative server:
//! the WebSocket connection, local prediction with server reconciliation,
//! and the per-frame session that drives both.

pub mod connection;
pub mod prediction;
pub mod predictor;
pub mod session;

pub use connection::{ClientConnection, ClientError, ConnectionState, LatestSlot};
pub use prediction::{PredictionBuffer, PredictionRecord, PREDICTION_BUFFER_SIZE};
pub use predictor::{ClientPredictor, Reconciliation, ServerPlayerState};
pub use session::{FrameReport, NetworkedSession};
