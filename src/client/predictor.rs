//! Client Predictor
//!
//! Runs the server's player update locally the moment input is captured,
//! against a collision space built from the same level data. Server state
//! for the local player is then checked against the stored prediction for
//! the acknowledged sequence; on divergence the predictor rewinds to the
//! server state and replays every input the server hasn't applied yet.
//!
//! A client frame is one physics sub-step. The server applies one input per
//! tick, so frames are collected and released as one tick's input every
//! `substeps` frames. Jump and boomerang presses inside the window are
//! latched the same way the server latches them between ticks.

use tracing::debug;

use crate::client::prediction::PredictionBuffer;
use crate::core::vec2::Vec2;
use crate::game::collision::CollisionSpace;
use crate::game::config::SimConfig;
use crate::game::input::{ActionFlags, InputCommand};
use crate::game::level::LevelData;
use crate::game::physics::PlayerPhysicsState;
use crate::game::tick::advance_player;
use crate::replication::components::{PlayerInfo, Position, Velocity};

/// Positional error (pixels) tolerated before rewinding.
pub const DEFAULT_RECONCILE_TOLERANCE: f64 = 0.5;

/// Authoritative state of the local player as received from the server.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ServerPlayerState {
    /// Last input sequence the server applied
    pub last_sequence: u32,
    /// Top-left position
    pub position: Vec2,
    /// Velocity per sub-step
    pub velocity: Vec2,
    /// Standing on something
    pub on_ground: bool,
    /// +1 right, -1 left
    pub facing: i8,
}

impl ServerPlayerState {
    /// Assemble from replicated components.
    pub fn from_components(position: &Position, velocity: &Velocity, info: &PlayerInfo) -> Self {
        Self {
            last_sequence: info.last_sequence,
            position: position.to_vec2(),
            velocity: Vec2::new(velocity.x, velocity.y),
            on_ground: info.on_ground,
            facing: info.facing,
        }
    }
}

impl From<&PlayerPhysicsState> for ServerPlayerState {
    fn from(state: &PlayerPhysicsState) -> Self {
        Self {
            last_sequence: state.last_processed_sequence,
            position: state.position(),
            velocity: state.velocity,
            on_ground: state.on_ground,
            facing: state.facing,
        }
    }
}

/// What a reconcile did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reconciliation {
    /// First server state; predictor snapped to it
    Initialized {
        /// Inputs replayed on top
        replayed: usize,
    },
    /// Prediction matched within tolerance
    InSync {
        /// Measured error
        error: f64,
    },
    /// Rewound to the server state and replayed
    Corrected {
        /// Measured error, `None` if the prediction was no longer buffered
        error: Option<f64>,
        /// Inputs replayed on top
        replayed: usize,
    },
}

/// Frames collected toward the next tick's input.
#[derive(Clone, Copy, Debug, Default)]
struct PendingFrames {
    frames: u32,
    direction: i8,
    actions: ActionFlags,
    jump_latched: bool,
    boomerang_latched: bool,
}

impl PendingFrames {
    fn record(&mut self, direction: i8, actions: ActionFlags) {
        self.frames += 1;
        self.direction = direction;
        self.actions = actions;
        self.jump_latched |= actions.jump();
        self.boomerang_latched |= actions.boomerang();
    }

    fn effective_actions(&self) -> ActionFlags {
        let mut actions = self.actions;
        actions.set(ActionFlags::JUMP, self.jump_latched);
        actions.set(ActionFlags::BOOMERANG, self.boomerang_latched);
        actions
    }
}

/// Local-player prediction and reconciliation.
#[derive(Debug)]
pub struct ClientPredictor {
    config: SimConfig,
    space: CollisionSpace,
    buffer: PredictionBuffer,
    state: Option<PlayerPhysicsState>,
    next_sequence: u32,
    has_active_boomerang: bool,
    tolerance: f64,
    pending: PendingFrames,
}

impl ClientPredictor {
    /// Predictor for `level` with a collision space of its own.
    pub fn new(config: SimConfig, level: &LevelData) -> Self {
        Self {
            config,
            space: CollisionSpace::from_level(level),
            buffer: PredictionBuffer::new(),
            state: None,
            next_sequence: 1,
            has_active_boomerang: false,
            tolerance: DEFAULT_RECONCILE_TOLERANCE,
            pending: PendingFrames::default(),
        }
    }

    /// Override the reconcile tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    /// Whether a server state has been seen.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Current predicted state.
    pub fn state(&self) -> Option<&PlayerPhysicsState> {
        self.state.as_ref()
    }

    /// Predicted top-left position.
    pub fn position(&self) -> Option<Vec2> {
        self.state.as_ref().map(|s| s.position())
    }

    /// Prediction history.
    pub fn buffer(&self) -> &PredictionBuffer {
        &self.buffer
    }

    /// Client frames per server tick.
    pub fn frames_per_tick(&self) -> u32 {
        self.config.substeps()
    }

    /// Adopt the server's tick rate. Buffered predictions and collected
    /// frames were made at the old rate and are dropped.
    pub fn set_tick_rate(&mut self, tick_rate: u32) {
        if self.config.tick_rate == tick_rate {
            return;
        }
        debug!(from = self.config.tick_rate, to = tick_rate, "Prediction tick rate changed");
        self.config.tick_rate = tick_rate;
        self.buffer.clear();
        self.pending = PendingFrames::default();
    }

    /// Feed one client frame of input.
    ///
    /// Every `frames_per_tick` frames the collected input is stamped,
    /// predicted for a whole tick and returned for sending. Frames before the
    /// first server state are discarded.
    pub fn frame(&mut self, direction: i8, actions: ActionFlags) -> Option<InputCommand> {
        if !self.is_initialized() {
            return None;
        }
        self.pending.record(direction, actions);
        if self.pending.frames < self.frames_per_tick() {
            return None;
        }

        let pending = std::mem::take(&mut self.pending);
        let input = self.next_input(pending.direction, pending.effective_actions());
        self.predict(input);
        Some(input)
    }

    /// Tell the predictor whether the local player has a boomerang in flight.
    pub fn set_has_active_boomerang(&mut self, active: bool) {
        self.has_active_boomerang = active;
    }

    /// Stamp a new input with the next sequence number.
    pub fn next_input(&mut self, direction: i8, actions: ActionFlags) -> InputCommand {
        let input = InputCommand::now(self.next_sequence, direction, actions);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        input
    }

    /// Apply `input` locally and remember the result.
    ///
    /// Returns the predicted position, or `None` before the first server
    /// state arrives.
    pub fn predict(&mut self, input: InputCommand) -> Option<Vec2> {
        let state = self.state.as_mut()?;
        advance_player(state, &input, self.has_active_boomerang, &self.space, &self.config);
        state.last_processed_sequence = input.sequence;
        let position = state.position();
        self.buffer.store(input, state.clone());
        Some(position)
    }

    /// Check the server's view of the local player against the prediction.
    pub fn reconcile(&mut self, server: &ServerPlayerState) -> Reconciliation {
        let Some(current) = self.state.as_ref() else {
            let base = PlayerPhysicsState::new(server.position, &self.config.physics);
            let replayed = self.rewind(base, server);
            debug!(x = server.position.x, y = server.position.y, replayed, "Prediction initialized");
            return Reconciliation::Initialized { replayed };
        };

        let ack = server.last_sequence;
        let error = self
            .buffer
            .prediction_error(ack, server.position.x, server.position.y);
        if let Some(error) = error {
            if error <= self.tolerance {
                return Reconciliation::InSync { error };
            }
        }

        let base = self
            .buffer
            .get(ack)
            .map(|r| r.state.clone())
            .unwrap_or_else(|| current.clone());
        let replayed = self.rewind(base, server);
        debug!(sequence = ack, ?error, replayed, "Prediction corrected");
        Reconciliation::Corrected { error, replayed }
    }

    /// Reset to `base` overwritten by the server state, then re-simulate
    /// every unacknowledged input.
    fn rewind(&mut self, mut base: PlayerPhysicsState, server: &ServerPlayerState) -> usize {
        base.set_position(server.position);
        base.velocity = server.velocity;
        base.on_ground = server.on_ground;
        base.facing = server.facing;
        base.last_processed_sequence = server.last_sequence;

        let pending: Vec<InputCommand> = self
            .buffer
            .unacknowledged(server.last_sequence)
            .into_iter()
            .map(|r| r.input)
            .collect();

        for input in &pending {
            advance_player(&mut base, input, self.has_active_boomerang, &self.space, &self.config);
            base.last_processed_sequence = input.sequence;
            self.buffer.store(*input, base.clone());
        }
        self.state = Some(base);
        pending.len()
    }
}
