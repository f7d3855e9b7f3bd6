//! Game Logic Module
//!
//! All simulation code. Deterministic for a given level, config and input
//! stream; the client predictor runs the same functions as the server.
//!
//! ## Module Structure
//!
//! - `config`: Physics and boomerang tuning
//! - `input`: Input commands and sequence numbers
//! - `level`: Level geometry and spawn points
//! - `collision`: Grid broad-phase collision space
//! - `physics`: Sub-stepped player physics
//! - `projectile`: Boomerang charge, throw and flight
//! - `world`: Entity/component store
//! - `events`: Game events for client effects
//! - `tick`: Authoritative simulation loop

pub mod config;
pub mod input;
pub mod level;
pub mod collision;
pub mod physics;
pub mod projectile;
pub mod world;
pub mod events;
pub mod tick;

// Re-export key types
pub use config::{BoomerangConfig, PhysicsConfig, SimConfig};
pub use input::{ActionFlags, InputCommand};
pub use level::LevelData;
pub use collision::CollisionSpace;
pub use physics::{AnimState, PlayerPhysicsState};
pub use projectile::{BoomerangPhase, ProjectileState};
pub use world::{EntityId, World};
pub use events::{GameEvent, GameEventData};
pub use tick::{ClientId, SimCommand, Simulation, TickResult};
