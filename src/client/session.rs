//! Networked Session
//!
//! Per-frame client driver: apply the newest snapshot to the shadow world,
//! reconcile the local player, then hand this frame's input to the
//! predictor. Input goes out once per server tick, at the tick rate the
//! server announced when accepting the join.

use tracing::{debug, warn};

use crate::client::connection::{ClientConnection, ConnectionState};
use crate::client::predictor::{ClientPredictor, Reconciliation, ServerPlayerState};
use crate::core::vec2::Vec2;
use crate::game::config::SimConfig;
use crate::game::input::ActionFlags;
use crate::game::level::LevelData;
use crate::game::world::EntityId;
use crate::replication::components::{BoomerangInfo, PlayerInfo, Position, Velocity};
use crate::replication::registry::ComponentRegistry;
use crate::replication::shadow::{ApplyReport, ShadowWorld};

/// What one frame did.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Link state at the start of the frame
    pub state: ConnectionState,
    /// Snapshot application result, if a snapshot arrived
    pub applied: Option<ApplyReport>,
    /// Reconcile result, if the snapshot carried the local player
    pub reconciliation: Option<Reconciliation>,
    /// Predicted local position after this frame
    pub predicted: Option<Vec2>,
}

/// Client-side game session bound to one connection.
pub struct NetworkedSession {
    connection: ClientConnection,
    shadow: ShadowWorld,
    registry: ComponentRegistry,
    predictor: ClientPredictor,
    local: Option<EntityId>,
}

impl NetworkedSession {
    /// Session over `connection` playing `level`.
    pub fn new(connection: ClientConnection, config: SimConfig, level: &LevelData) -> Self {
        Self {
            connection,
            shadow: ShadowWorld::new(),
            registry: ComponentRegistry::standard(),
            predictor: ClientPredictor::new(config, level),
            local: None,
        }
    }

    /// Underlying connection.
    pub fn connection(&mut self) -> &mut ClientConnection {
        &mut self.connection
    }

    /// Mirrored server state.
    pub fn shadow(&self) -> &ShadowWorld {
        &self.shadow
    }

    /// Local predictor.
    pub fn predictor(&self) -> &ClientPredictor {
        &self.predictor
    }

    /// Local player entity once joined.
    pub fn local_entity(&self) -> Option<EntityId> {
        self.local
    }

    /// Run one client frame with the input captured for it.
    pub fn update(&mut self, direction: i8, actions: ActionFlags) -> FrameReport {
        let state = self.connection.state();
        let mut report = FrameReport {
            state: state.clone(),
            applied: None,
            reconciliation: None,
            predicted: None,
        };

        let ConnectionState::Joined(accepted) = &state else {
            return report;
        };
        if self.local.is_none() {
            self.local = Some(accepted.entity);
            self.predictor.set_tick_rate(accepted.tick_rate);
        }
        let local = accepted.entity;

        if let Some(snapshot) = self.connection.take_snapshot() {
            let applied = self.shadow.apply(&snapshot, &self.registry);
            if !applied.stale {
                report.reconciliation = self.reconcile_local(local);
            }
            report.applied = Some(applied);
        }

        if !self.predictor.is_initialized() {
            return report;
        }

        if let Some(input) = self.predictor.frame(direction, actions) {
            if let Err(e) = self.connection.send_input(input) {
                warn!(sequence = input.sequence, "Input not sent: {}", e);
            }
        }
        report.predicted = self.predictor.position();
        report
    }

    fn reconcile_local(&mut self, local: EntityId) -> Option<Reconciliation> {
        let world = self.shadow.world();
        let has_boomerang = world.iter::<BoomerangInfo>().any(|(_, b)| b.owner == local);
        self.predictor.set_has_active_boomerang(has_boomerang);

        let position = world.get::<Position>(local)?;
        let velocity = world.get::<Velocity>(local)?;
        let info = world.get::<PlayerInfo>(local)?;
        let server = ServerPlayerState::from_components(position, velocity, info);

        let outcome = self.predictor.reconcile(&server);
        if let Reconciliation::Corrected { error, replayed } = outcome {
            debug!(?error, replayed, "Local player corrected");
        }
        Some(outcome)
    }
}
