//! # Doomerang Server
//!
//! Authoritative simulation core for Doomerang, a 2D platformer brawler
//! where players throw charged boomerangs at each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DOOMERANG SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── vec2.rs     - 2D vector and rectangle                   │
//! │  └── hash.rs     - State hashing for determinism checks      │
//! │                                                              │
//! │  game/           - Simulation (deterministic)                │
//! │  ├── collision.rs- Grid-partitioned collision space          │
//! │  ├── physics.rs  - Player physics and animation state        │
//! │  ├── projectile.rs - Boomerang charge, flight and contacts   │
//! │  ├── world.rs    - Entity store                              │
//! │  └── tick.rs     - Authoritative simulation loop             │
//! │                                                              │
//! │  replication/    - Snapshots and client mirror               │
//! │  client/         - Prediction, reconciliation, connection    │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server and game loop task       │
//! │  ├── protocol.rs - Message types                             │
//! │  └── registration.rs - Master registry heartbeat             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The server and the client predictor run the same `game::tick::advance_player`
//! over the same level data, so identical input sequences produce
//! bit-identical player trajectories:
//! - One code path for server and client player updates
//! - No HashMap in simulation state (BTreeMap for sorted iteration)
//! - No wall-clock time inside a tick
//! - Fixed sub-step count per tick derived from the tick rate

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod core;
pub mod game;
pub mod network;
pub mod replication;

// Re-export commonly used types
pub use crate::core::vec2::{Rect, Vec2};
pub use game::config::SimConfig;
pub use game::input::{ActionFlags, InputCommand};
pub use game::level::LevelData;
pub use game::tick::{SimCommand, Simulation, TickResult};
pub use game::world::{EntityId, World};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz)
pub const DEFAULT_TICK_RATE: u32 = 20;
