//! Replication Layer
//!
//! Full-state snapshots of every replicated entity, built once per server
//! tick, and the client-side shadow world that mirrors them.
//!
//! - `components`: replicated component types and their sync ids
//! - `registry`: sync id -> encode / apply / remove / lerp
//! - `snapshot`: snapshot types and the server-side builder
//! - `shadow`: client-side mirror with interpolation

pub mod components;
pub mod registry;
pub mod snapshot;
pub mod shadow;

use registry::SyncId;

pub use components::{BoomerangInfo, PlayerInfo, Position, Replicated, Velocity};
pub use registry::ComponentRegistry;
pub use snapshot::{build_snapshot, ComponentPayload, EntitySnapshot, Snapshot};
pub use shadow::{ApplyReport, ShadowWorld};

/// Replication errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// No component registered under this sync id.
    #[error("Unknown component sync id {0}")]
    UnknownComponent(SyncId),

    /// Component failed to serialize.
    #[error("Failed to encode component {sync_id}: {source}")]
    Encode {
        /// Component sync id
        sync_id: SyncId,
        /// Underlying error
        #[source]
        source: bincode::Error,
    },

    /// Payload failed to deserialize.
    #[error("Failed to decode component {sync_id}: {source}")]
    Decode {
        /// Component sync id
        sync_id: SyncId,
        /// Underlying error
        #[source]
        source: bincode::Error,
    },
}
