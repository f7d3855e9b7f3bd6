//! Player Physics
//!
//! Sub-stepped platformer kinematics for one player. [`step`] advances one
//! 60 Hz sub-step and depends only on its arguments, so the server tick and
//! the client predictor produce bit-identical trajectories from the same
//! inputs and level.
//!
//! Sub-step order:
//! 1. Horizontal acceleration (skipped while charging a boomerang)
//! 2. Edge-triggered jump
//! 3. Ground friction
//! 4. Horizontal speed clamp
//! 5. Gravity (not on the sub-step a jump fires)
//! 6. Horizontal collision: ramp ahead, ramp below, solid ahead
//! 7. Vertical collision: ramps, one-way platforms, solids, else free-fall

use serde::{Serialize, Deserialize};

use crate::core::vec2::{Rect, Vec2};
use crate::game::collision::{CollisionObject, CollisionSpace, ObjectId, Tag};
use crate::game::config::PhysicsConfig;
use crate::game::input::InputCommand;

/// Coarse animation / logic state, derived once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AnimState {
    /// Standing still
    #[default]
    Idle = 0,
    /// Moving along the ground
    Running = 1,
    /// Airborne
    Jump = 2,
    /// Holding the boomerang button
    ChargingBoomerang = 3,
    /// Just released a boomerang
    Throw = 4,
    /// Just struck by a boomerang
    Hit = 5,
}

/// Boomerang charge tracking for one player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeState {
    /// Currently holding a charge
    pub charging: bool,
    /// Ticks held so far (capped at the max charge time)
    pub charge_time: u32,
    /// Boomerang button state on the previous tick
    pub was_pressed: bool,
}

/// Authoritative (or predicted) physics state of one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerPhysicsState {
    /// Collision box; `(x, y)` is the replicated position
    pub body: Rect,
    /// Velocity in pixels per sub-step
    pub velocity: Vec2,
    /// Standing on something
    pub on_ground: bool,
    /// +1 right, -1 left
    pub facing: i8,
    /// Ticks left on a forced animation state
    pub locked_state_timer: u32,
    /// State shown while the lock timer runs
    pub locked_state: AnimState,
    /// Last derived state
    pub anim: AnimState,
    /// Highest input sequence applied
    pub last_processed_sequence: u32,
    /// Jump button state on the previous sub-step
    pub jump_was_pressed: bool,
    /// One-way platform currently stood on
    pub ground_platform: Option<ObjectId>,
    /// One-way platform the player chose to drop through
    pub dropped_platform: Option<ObjectId>,
    /// Boomerang charge
    pub charge: ChargeState,
}

impl PlayerPhysicsState {
    /// Fresh state at `position` (top-left), grounded and facing right.
    pub fn new(position: Vec2, config: &PhysicsConfig) -> Self {
        Self {
            body: Rect::new(position.x, position.y, config.player_width, config.player_height),
            velocity: Vec2::ZERO,
            on_ground: true,
            facing: 1,
            locked_state_timer: 0,
            locked_state: AnimState::Idle,
            anim: AnimState::Idle,
            last_processed_sequence: 0,
            jump_was_pressed: false,
            ground_platform: None,
            dropped_platform: None,
            charge: ChargeState::default(),
        }
    }

    /// Top-left position.
    #[inline]
    pub fn position(&self) -> Vec2 {
        self.body.position()
    }

    /// Move the body to `position` (top-left).
    #[inline]
    pub fn set_position(&mut self, position: Vec2) {
        self.body.x = position.x;
        self.body.y = position.y;
    }

    /// Centre of the collision box.
    #[inline]
    pub fn center(&self) -> Vec2 {
        self.body.center()
    }

    /// Force an animation state for `ticks` ticks.
    pub fn lock_state(&mut self, state: AnimState, ticks: u32) {
        self.locked_state = state;
        self.locked_state_timer = ticks;
        self.anim = state;
    }
}

/// Reduce speed toward zero by `friction` without crossing zero.
#[inline]
pub fn apply_friction(speed: f64, friction: f64) -> f64 {
    if speed > 0.0 {
        (speed - friction).max(0.0)
    } else if speed < 0.0 {
        (speed + friction).min(0.0)
    } else {
        0.0
    }
}

/// Advance one 60 Hz sub-step.
pub fn step(
    state: &mut PlayerPhysicsState,
    input: &InputCommand,
    space: &CollisionSpace,
    config: &PhysicsConfig,
) {
    let direction = input.direction.signum();
    if direction != 0 {
        state.facing = direction;
    }

    // Drop through the platform underfoot
    if input.actions.crouch() && state.on_ground {
        if let Some(platform) = state.ground_platform.take() {
            state.dropped_platform = Some(platform);
            state.on_ground = false;
        }
    }

    if direction != 0 && !state.charge.charging {
        state.velocity.x += f64::from(direction) * config.acceleration;
    }

    let jump_pressed = input.actions.jump();
    let jumped = jump_pressed && !state.jump_was_pressed && state.on_ground;
    if jumped {
        state.velocity.y = -config.jump_speed;
        state.on_ground = false;
        state.ground_platform = None;
    }
    state.jump_was_pressed = jump_pressed;

    if state.on_ground {
        state.velocity.x = apply_friction(state.velocity.x, config.friction);
    }

    state.velocity.x = state.velocity.x.clamp(-config.max_speed, config.max_speed);

    if !jumped {
        state.velocity.y += config.gravity;
    }
    if state.velocity.y > config.max_fall_speed {
        state.velocity.y = config.max_fall_speed;
    }

    resolve_horizontal(state, space, config);
    resolve_vertical(state, space, config);

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(
        x = state.body.x,
        y = state.body.y,
        vx = state.velocity.x,
        vy = state.velocity.y,
        on_ground = state.on_ground,
        "physics sub-step"
    );
}

/// Run `substeps` sub-steps with the same input, then derive the tick's
/// animation state.
pub fn tick_player(
    state: &mut PlayerPhysicsState,
    input: &InputCommand,
    space: &CollisionSpace,
    config: &PhysicsConfig,
    substeps: u32,
) {
    for _ in 0..substeps.max(1) {
        step(state, input, space, config);
    }
    state.anim = derive_state(state, config);
}

/// Derive the coarse state. A running lock suppresses derivation and is
/// decremented instead.
pub fn derive_state(state: &mut PlayerPhysicsState, config: &PhysicsConfig) -> AnimState {
    if state.locked_state_timer > 0 {
        state.locked_state_timer -= 1;
        return state.locked_state;
    }
    if state.charge.charging {
        AnimState::ChargingBoomerang
    } else if !state.on_ground {
        AnimState::Jump
    } else if state.velocity.x.abs() >= config.running_epsilon {
        AnimState::Running
    } else {
        AnimState::Idle
    }
}

// =============================================================================
// COLLISION RESOLUTION
// =============================================================================

fn resolve_horizontal(state: &mut PlayerPhysicsState, space: &CollisionSpace, config: &PhysicsConfig) {
    let mut dx = state.velocity.x;
    if dx == 0.0 {
        return;
    }

    // Ramp ahead (uphill), then ramp just below (downhill)
    for sink in [0.0, 1.0] {
        if let Some(hit) = space.check(&state.body, dx, sink, &[Tag::Ramp]) {
            if let Some(ramp) = hit.first_by_tag(Tag::Ramp) {
                state.body.x += dx;
                snap_to_slope(state, ramp, config);
                return;
            }
        }
    }

    // Solids the body is already embedded in are left to the vertical pass.
    if let Some(hit) = space.check(&state.body, dx, 0.0, &[Tag::Solid]) {
        let blocking = hit
            .objects_by_tag(Tag::Solid)
            .into_iter()
            .find(|solid| !state.body.overlaps(&solid.rect));
        if let Some(solid) = blocking {
            dx = hit.contact_with(solid).x;
            state.velocity.x = 0.0;
        }
    }

    state.body.x += dx;
}

fn resolve_vertical(state: &mut PlayerPhysicsState, space: &CollisionSpace, config: &PhysicsConfig) {
    let dy = state.velocity.y.clamp(-config.max_vert_speed, config.max_vert_speed);
    let check_dist = if dy >= 0.0 { dy + 1.0 } else { dy };

    if let Some(hit) = space.check(&state.body, 0.0, check_dist, &[Tag::Solid, Tag::Ramp, Tag::Platform]) {
        if dy >= 0.0 {
            if let Some(ramp) = hit.first_by_tag(Tag::Ramp) {
                let surface_y = ramp.surface_y(&state.body);
                if state.body.bottom() + dy >= surface_y {
                    state.body.y = surface_y - state.body.h + config.slope_surface_offset;
                    land(state, None);
                    return;
                }
            }

            let platform = hit.objects_by_tag(Tag::Platform).into_iter().find(|p| {
                state.dropped_platform != Some(p.id)
                    && state.velocity.y >= 0.0
                    && state.body.bottom() < p.rect.y + config.platform_drop_threshold
            });
            if let Some(platform) = platform {
                state.body.y += hit.contact_with(platform).y;
                land(state, Some(platform.id));
                return;
            }
        }

        if let Some(solid) = hit.first_by_tag(Tag::Solid) {
            state.body.y += hit.contact_with(solid).y;
            state.velocity.y = 0.0;
            if dy >= 0.0 {
                land(state, None);
            }
            return;
        }
    }

    state.on_ground = false;
    state.ground_platform = None;
    state.body.y += dy;
}

fn snap_to_slope(state: &mut PlayerPhysicsState, ramp: &CollisionObject, config: &PhysicsConfig) {
    let surface_y = ramp.surface_y(&state.body);
    state.body.y = surface_y - state.body.h + config.slope_surface_offset;
    land(state, None);
}

fn land(state: &mut PlayerPhysicsState, platform: Option<ObjectId>) {
    state.velocity.y = 0.0;
    state.on_ground = true;
    state.ground_platform = platform;
    if platform.is_none() || platform != state.dropped_platform {
        state.dropped_platform = None;
    }
}
