//! Game Events
//!
//! Discrete events produced by a simulation tick. They drive cosmetic
//! effects on clients and are never needed to reconstruct state.

use serde::{Serialize, Deserialize};
use crate::game::world::EntityId;

/// Event category. Clients keep one bounded queue per kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Boomerang charge effect
    BoomerangCharge,
    /// Boomerang released
    BoomerangThrow,
    /// Boomerang caught by its owner
    BoomerangCatch,
    /// Boomerang struck a player
    BoomerangHit,
    /// Player joined or left
    Presence,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEventData {
    /// Charge held long enough to show the charge effect
    BoomerangCharge {
        owner: EntityId,
        x: f64,
        y: f64,
    },

    /// Boomerang thrown
    BoomerangThrow {
        owner: EntityId,
        boomerang: EntityId,
        x: f64,
        y: f64,
        direction_x: f64,
        direction_y: f64,
        charge_ratio: f64,
    },

    /// Boomerang returned to its owner
    BoomerangCatch {
        owner: EntityId,
        boomerang: EntityId,
    },

    /// Boomerang struck a player
    BoomerangHit {
        attacker: EntityId,
        target: EntityId,
        hit_x: f64,
        hit_y: f64,
        charge_ratio: f64,
        damage: i32,
        knockback_x: f64,
        knockback_y: f64,
    },

    /// Player entity created
    PlayerJoined {
        entity: EntityId,
        name: String,
    },

    /// Player entity removed
    PlayerLeft {
        entity: EntityId,
    },
}

/// A game event stamped with the tick that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,
    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Queue category of this event.
    pub fn kind(&self) -> EventKind {
        match self.data {
            GameEventData::BoomerangCharge { .. } => EventKind::BoomerangCharge,
            GameEventData::BoomerangThrow { .. } => EventKind::BoomerangThrow,
            GameEventData::BoomerangCatch { .. } => EventKind::BoomerangCatch,
            GameEventData::BoomerangHit { .. } => EventKind::BoomerangHit,
            GameEventData::PlayerJoined { .. } | GameEventData::PlayerLeft { .. } => EventKind::Presence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        let event = GameEvent::new(
            3,
            GameEventData::BoomerangCatch {
                owner: EntityId(1),
                boomerang: EntityId(2),
            },
        );
        assert_eq!(event.kind(), EventKind::BoomerangCatch);
    }

    #[test]
    fn test_event_json_tag() {
        let event = GameEvent::new(7, GameEventData::PlayerLeft { entity: EntityId(4) });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"player_left\""));
        let back: GameEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
