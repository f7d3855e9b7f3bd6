//! Simulation Configuration
//!
//! Tuning constants for player physics and the boomerang. All values are
//! tuned for a 60 Hz sub-step; the tick rate only decides how many sub-steps
//! run per server tick.

use std::path::Path;
use serde::{Serialize, Deserialize};

/// Rate the physics constants are tuned for.
pub const PHYSICS_HZ: u32 = 60;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for this schema.
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Player movement constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Downward acceleration per sub-step
    pub gravity: f64,
    /// Upward speed set by a jump
    pub jump_speed: f64,
    /// Horizontal speed cap
    pub max_speed: f64,
    /// Horizontal acceleration per sub-step while a direction is held
    pub acceleration: f64,
    /// Horizontal speed lost per sub-step while grounded
    pub friction: f64,
    /// Terminal falling speed
    pub max_fall_speed: f64,
    /// Hard clamp on vertical displacement per sub-step
    pub max_vert_speed: f64,
    /// Small sink into ramp surfaces so the ground check keeps hitting them
    pub slope_surface_offset: f64,
    /// How far above a one-way platform the feet may be and still land
    pub platform_drop_threshold: f64,
    /// Horizontal speed at or above which the player counts as running
    pub running_epsilon: f64,
    /// Player collision box width
    pub player_width: f64,
    /// Player collision box height
    pub player_height: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.75,
            jump_speed: 15.0,
            max_speed: 6.0,
            acceleration: 0.75,
            friction: 0.5,
            max_fall_speed: 10.0,
            max_vert_speed: 16.0,
            slope_surface_offset: 0.1,
            platform_drop_threshold: 4.0,
            running_epsilon: 0.1,
            player_width: 16.0,
            player_height: 40.0,
        }
    }
}

/// Boomerang projectile constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoomerangConfig {
    /// Base throw speed at zero charge
    pub throw_speed: f64,
    /// Homing speed while returning
    pub return_speed: f64,
    /// Range at zero charge
    pub base_range: f64,
    /// Range at full charge
    pub max_charge_range: f64,
    /// Pierce budget per throw
    pub pierce_distance: f64,
    /// Pierce budget consumed per hit
    pub pierce_cost: f64,
    /// Gravity while outbound
    pub gravity: f64,
    /// Ticks of holding needed for full charge
    pub max_charge_time: u32,
    /// Charge frame at which the charge effect event fires
    pub charge_vfx_frame: u32,
    /// Horizontal knockback applied to a struck player
    pub hit_knockback: f64,
    /// Vertical velocity added to a struck player (negative is up)
    pub knockback_upward: f64,
    /// Damage at zero charge
    pub base_damage: i32,
    /// Extra damage at full charge
    pub max_charge_damage_bonus: i32,
    /// Owner centre distance below which an inbound boomerang is caught
    pub catch_radius: f64,
    /// Upward speed subtracted from the throw for an arc
    pub throw_lift: f64,
    /// Side length of the square collision box
    pub size: f64,
    /// Spawn offset from the owner's centre in the facing direction
    pub spawn_offset: f64,
    /// Ticks the thrower stays in the throw animation
    pub throw_lock_ticks: u32,
    /// Ticks a struck player stays in the hit animation
    pub hit_lock_ticks: u32,
}

impl Default for BoomerangConfig {
    fn default() -> Self {
        Self {
            throw_speed: 6.0,
            return_speed: 8.0,
            base_range: 150.0,
            max_charge_range: 250.0,
            pierce_distance: 40.0,
            pierce_cost: 12.0,
            gravity: 0.2,
            max_charge_time: 60,
            charge_vfx_frame: 15,
            hit_knockback: 2.0,
            knockback_upward: -4.0,
            base_damage: 15,
            max_charge_damage_bonus: 15,
            catch_radius: 20.0,
            throw_lift: 2.0,
            size: 12.0,
            spawn_offset: 10.0,
            throw_lock_ticks: 6,
            hit_lock_ticks: 10,
        }
    }
}

/// Full simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Server ticks per second
    pub tick_rate: u32,
    /// Starting and maximum health
    pub max_health: i32,
    /// Player physics
    pub physics: PhysicsConfig,
    /// Boomerang
    pub boomerang: BoomerangConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            max_health: 100,
            physics: PhysicsConfig::default(),
            boomerang: BoomerangConfig::default(),
        }
    }
}

impl SimConfig {
    /// Create a config with the given tick rate and default tuning.
    pub fn with_tick_rate(tick_rate: u32) -> Self {
        Self {
            tick_rate,
            ..Default::default()
        }
    }

    /// Number of 60 Hz sub-steps per server tick (at least one).
    pub fn substeps(&self) -> u32 {
        substeps_for(self.tick_rate)
    }

    /// Load overrides from a JSON file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::Invalid {
                field: "tick_rate",
                reason: format!("{} is outside 1..=1000", self.tick_rate),
            });
        }
        if self.boomerang.max_charge_time == 0 {
            return Err(ConfigError::Invalid {
                field: "boomerang.max_charge_time",
                reason: "must be positive".to_string(),
            });
        }
        if self.boomerang.pierce_cost <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "boomerang.pierce_cost",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Sub-steps per tick for a tick rate: `max(1, 60 / tick_rate)`.
#[inline]
pub fn substeps_for(tick_rate: u32) -> u32 {
    if tick_rate == 0 {
        return 1;
    }
    (PHYSICS_HZ / tick_rate).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substeps() {
        assert_eq!(substeps_for(20), 3);
        assert_eq!(substeps_for(30), 2);
        assert_eq!(substeps_for(60), 1);
        assert_eq!(substeps_for(120), 1);
        assert_eq!(SimConfig::default().substeps(), 3);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SimConfig =
            serde_json::from_str(r#"{"tick_rate": 30, "boomerang": {"catch_radius": 24.0}}"#).unwrap();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.boomerang.catch_radius, 24.0);
        assert_eq!(config.boomerang.throw_speed, 6.0);
        assert_eq!(config.physics, PhysicsConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_tick_rate() {
        let config = SimConfig::with_tick_rate(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "tick_rate", .. })
        ));
    }
}
