//! Input Commands
//!
//! Player input as captured by the client and replayed by both the
//! server and the local predictor.

use serde::{Serialize, Deserialize};

// =============================================================================
// ACTION FLAGS
// =============================================================================

/// Packed action bits for one input command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionFlags(pub u8);

impl ActionFlags {
    /// Jump held
    pub const JUMP: u8 = 0x01;
    /// Melee attack held
    pub const ATTACK: u8 = 0x02;
    /// Boomerang (charge / throw) held
    pub const BOOMERANG: u8 = 0x04;
    /// Crouch held (aims down, drops through platforms)
    pub const CROUCH: u8 = 0x08;
    /// Up held (aims up)
    pub const MOVE_UP: u8 = 0x10;

    /// No actions.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from a raw byte, dropping unknown bits.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & (Self::JUMP | Self::ATTACK | Self::BOOMERANG | Self::CROUCH | Self::MOVE_UP))
    }

    /// Check a flag.
    #[inline]
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    /// Set or clear a flag.
    #[inline]
    pub fn set(&mut self, flag: u8, pressed: bool) {
        if pressed {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    /// Builder form of [`ActionFlags::set`].
    #[inline]
    pub fn with(mut self, flag: u8) -> Self {
        self.set(flag, true);
        self
    }

    /// Jump held.
    #[inline]
    pub fn jump(self) -> bool {
        self.contains(Self::JUMP)
    }

    /// Attack held.
    #[inline]
    pub fn attack(self) -> bool {
        self.contains(Self::ATTACK)
    }

    /// Boomerang held.
    #[inline]
    pub fn boomerang(self) -> bool {
        self.contains(Self::BOOMERANG)
    }

    /// Crouch held.
    #[inline]
    pub fn crouch(self) -> bool {
        self.contains(Self::CROUCH)
    }

    /// Up held.
    #[inline]
    pub fn move_up(self) -> bool {
        self.contains(Self::MOVE_UP)
    }
}

// =============================================================================
// INPUT COMMAND
// =============================================================================

/// One captured input, tagged with a per-connection sequence number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputCommand {
    /// Monotonically increasing per connection (wraps)
    pub sequence: u32,
    /// Horizontal direction: -1, 0 or 1
    pub direction: i8,
    /// Held actions
    pub actions: ActionFlags,
    /// Client capture time (unix millis)
    pub timestamp: i64,
}

impl InputCommand {
    /// Create an input with no actions and no timestamp.
    pub fn new(sequence: u32, direction: i8, actions: ActionFlags) -> Self {
        Self {
            sequence,
            direction: direction.signum(),
            actions,
            timestamp: 0,
        }
    }

    /// Create an input stamped with the current wall-clock time.
    pub fn now(sequence: u32, direction: i8, actions: ActionFlags) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..Self::new(sequence, direction, actions)
        }
    }

    /// Clamp untrusted fields into range.
    pub fn sanitized(mut self) -> Self {
        self.direction = self.direction.signum();
        self.actions = ActionFlags::from_bits_truncate(self.actions.0);
        self
    }
}

/// Serial-number comparison: is `a` newer than `b`, tolerating wrap-around.
#[inline]
pub fn sequence_newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_flags() {
        let mut flags = ActionFlags::empty().with(ActionFlags::JUMP);
        assert!(flags.jump());
        assert!(!flags.boomerang());

        flags.set(ActionFlags::BOOMERANG, true);
        flags.set(ActionFlags::JUMP, false);
        assert!(flags.boomerang());
        assert!(!flags.jump());
    }

    #[test]
    fn test_sanitize_clamps_direction_and_bits() {
        let raw = InputCommand {
            sequence: 1,
            direction: -100,
            actions: ActionFlags(0xFF),
            timestamp: 0,
        };
        let clean = raw.sanitized();
        assert_eq!(clean.direction, -1);
        assert_eq!(clean.actions.0, 0x1F);
    }

    #[test]
    fn test_sequence_newer_wraps() {
        assert!(sequence_newer(2, 1));
        assert!(!sequence_newer(1, 1));
        assert!(!sequence_newer(1, 2));
        assert!(sequence_newer(0, u32::MAX));
        assert!(sequence_newer(5, u32::MAX - 5));
    }

    #[test]
    fn test_flags_serialize_as_byte() {
        let cmd = InputCommand::new(7, 1, ActionFlags(ActionFlags::JUMP | ActionFlags::CROUCH));
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"actions\":9"));
        let back: InputCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}
