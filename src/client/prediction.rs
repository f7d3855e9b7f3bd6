//! Prediction Buffer
//!
//! Ring buffer of predicted results keyed by input sequence. A slot is only
//! valid while its stored sequence matches the lookup key, so wrap-around
//! invalidates old entries without explicit eviction.

use crate::game::input::{sequence_newer, InputCommand};
use crate::game::physics::PlayerPhysicsState;

/// Number of slots.
pub const PREDICTION_BUFFER_SIZE: usize = 64;

/// One predicted step.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionRecord {
    /// Input that produced this state
    pub input: InputCommand,
    /// Predicted state after applying the input
    pub state: PlayerPhysicsState,
}

impl PredictionRecord {
    /// Input sequence of this record.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.input.sequence
    }
}

/// Fixed-size history of predicted steps.
#[derive(Clone, Debug)]
pub struct PredictionBuffer {
    slots: Vec<Option<PredictionRecord>>,
    latest: Option<u32>,
}

impl Default for PredictionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self {
            slots: vec![None; PREDICTION_BUFFER_SIZE],
            latest: None,
        }
    }

    #[inline]
    fn slot(sequence: u32) -> usize {
        sequence as usize % PREDICTION_BUFFER_SIZE
    }

    /// Store the state predicted for `input`, replacing whatever shared its slot.
    pub fn store(&mut self, input: InputCommand, state: PlayerPhysicsState) {
        let sequence = input.sequence;
        self.slots[Self::slot(sequence)] = Some(PredictionRecord { input, state });
        if self.latest.map_or(true, |latest| sequence_newer(sequence, latest)) {
            self.latest = Some(sequence);
        }
    }

    /// Record for `sequence`, if it is still held.
    pub fn get(&self, sequence: u32) -> Option<&PredictionRecord> {
        self.slots[Self::slot(sequence)]
            .as_ref()
            .filter(|r| r.sequence() == sequence)
    }

    /// Newest stored sequence.
    pub fn latest_sequence(&self) -> Option<u32> {
        self.latest
    }

    /// Records newer than `acknowledged`, oldest first.
    pub fn unacknowledged(&self, acknowledged: u32) -> Vec<&PredictionRecord> {
        let Some(latest) = self.latest else {
            return Vec::new();
        };
        let mut records: Vec<&PredictionRecord> = self
            .slots
            .iter()
            .flatten()
            .filter(|r| sequence_newer(r.sequence(), acknowledged))
            .filter(|r| !sequence_newer(r.sequence(), latest))
            .collect();
        records.sort_by_key(|r| r.sequence().wrapping_sub(acknowledged));
        records
    }

    /// Euclidean distance between the predicted and server positions for
    /// `sequence`. `None` if the record is gone.
    pub fn prediction_error(&self, sequence: u32, server_x: f64, server_y: f64) -> Option<f64> {
        self.get(sequence).map(|r| {
            let dx = r.state.body.x - server_x;
            let dy = r.state.body.y - server_y;
            (dx * dx + dy * dy).sqrt()
        })
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.latest = None;
    }
}
