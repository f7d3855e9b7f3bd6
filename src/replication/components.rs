//! Replicated Components
//!
//! Component types sent in every snapshot, each with a stable sync id.
//! Payloads are bincode; the sync ids are part of the wire contract.

use serde::{Serialize, Deserialize, de::DeserializeOwned};

use crate::core::vec2::Vec2;
use crate::game::physics::AnimState;
use crate::game::projectile::BoomerangPhase;
use crate::game::world::EntityId;
use crate::replication::registry::SyncId;

/// Sync id of [`Position`].
pub const SYNC_POSITION: SyncId = 10;
/// Sync id of [`Velocity`].
pub const SYNC_VELOCITY: SyncId = 11;
/// Sync id of [`PlayerInfo`].
pub const SYNC_PLAYER_INFO: SyncId = 12;
/// Sync id of [`BoomerangInfo`].
pub const SYNC_BOOMERANG: SyncId = 13;

/// A component that can travel in a snapshot.
pub trait ReplicatedComponent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Stable wire id.
    const SYNC_ID: SyncId;
    /// Name for logs.
    const NAME: &'static str;
}

/// A component that can be blended between two snapshots.
pub trait Interpolate {
    /// Blend from `self` toward `to` by `t` in [0, 1].
    fn lerp(&self, to: &Self, t: f64) -> Self;
}

/// Marker: entity is included in snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Replicated;

/// Top-left position in world units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X
    pub x: f64,
    /// Y
    pub y: f64,
}

impl Position {
    /// As a vector.
    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

impl From<Vec2> for Position {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl ReplicatedComponent for Position {
    const SYNC_ID: SyncId = SYNC_POSITION;
    const NAME: &'static str = "position";
}

impl Interpolate for Position {
    fn lerp(&self, to: &Self, t: f64) -> Self {
        self.to_vec2().lerp(to.to_vec2(), t).into()
    }
}

/// Velocity in world units per sub-step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// Horizontal
    pub x: f64,
    /// Vertical
    pub y: f64,
}

impl From<Vec2> for Velocity {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl ReplicatedComponent for Velocity {
    const SYNC_ID: SyncId = SYNC_VELOCITY;
    const NAME: &'static str = "velocity";
}

impl Interpolate for Velocity {
    fn lerp(&self, to: &Self, t: f64) -> Self {
        Self {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }
}

/// Per-player gameplay state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Display name
    pub name: String,
    /// Derived animation state
    pub anim: AnimState,
    /// +1 right, -1 left
    pub facing: i8,
    /// Remaining health
    pub health: i32,
    /// Last input sequence the server applied for this player
    pub last_sequence: u32,
    /// Standing on something
    pub on_ground: bool,
}

impl ReplicatedComponent for PlayerInfo {
    const SYNC_ID: SyncId = SYNC_PLAYER_INFO;
    const NAME: &'static str = "player_info";
}

/// Boomerang state visible to clients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoomerangInfo {
    /// Box top-left X
    pub x: f64,
    /// Box top-left Y
    pub y: f64,
    /// Horizontal velocity
    pub vel_x: f64,
    /// Vertical velocity
    pub vel_y: f64,
    /// Thrower
    pub owner: EntityId,
    /// Travel phase
    pub phase: BoomerangPhase,
    /// Outbound path length so far
    pub distance_traveled: f64,
    /// Charge level of the throw
    pub charge_ratio: f64,
}

impl ReplicatedComponent for BoomerangInfo {
    const SYNC_ID: SyncId = SYNC_BOOMERANG;
    const NAME: &'static str = "boomerang";
}

impl Interpolate for BoomerangInfo {
    fn lerp(&self, to: &Self, t: f64) -> Self {
        Self {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
            vel_x: self.vel_x + (to.vel_x - self.vel_x) * t,
            vel_y: self.vel_y + (to.vel_y - self.vel_y) * t,
            ..*to
        }
    }
}
