//! Core primitives.
//!
//! Geometry and state hashing shared by the server simulation and the
//! client predictor.

pub mod vec2;
pub mod hash;

// Re-export core types
pub use vec2::{Rect, Vec2};
pub use hash::{compute_state_hash, StateHash, StateHasher};
