//! Boomerang Projectile
//!
//! State machine: Outbound -> Inbound -> (Caught | Destroyed).
//!
//! - Outbound: gravity applies; distance accumulates; turns Inbound at max
//!   range or on touching solid geometry.
//! - Inbound: homes straight at the owner's centre at a fixed speed.
//! - Catch: proximity to the owner every sub-step, with box overlap as backup.
//! - Hits: at most once per target per throw; each hit spends pierce budget
//!   and an exhausted budget forces the return.
//!
//! Nothing here removes entities. Projectiles are only flagged with
//! `destroy` and swept by the tick at the end.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::core::vec2::{Rect, Vec2};
use crate::game::collision::{CollisionSpace, Tag};
use crate::game::config::BoomerangConfig;
use crate::game::physics::ChargeState;
use crate::game::world::EntityId;

/// Travel phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoomerangPhase {
    /// Flying away from the thrower
    Outbound,
    /// Homing back to the thrower
    Inbound,
}

/// Live boomerang state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    /// Collision box
    pub body: Rect,
    /// Velocity per sub-step
    pub velocity: Vec2,
    /// Travel phase
    pub phase: BoomerangPhase,
    /// Path length flown while outbound
    pub distance_traveled: f64,
    /// Outbound distance that triggers the return
    pub max_range: f64,
    /// Remaining pierce budget
    pub pierce_remaining: f64,
    /// Damage per hit
    pub damage: i32,
    /// Charge level the throw was released at, in [0, 1]
    pub charge_ratio: f64,
    /// Thrower (weak reference; may have been destroyed)
    pub owner: EntityId,
    /// Targets already struck this throw. Only ever grows.
    pub hit_set: BTreeSet<EntityId>,
    /// Flagged for end-of-tick removal
    pub destroy: bool,
}

/// What happened to a player's charge this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChargeOutcome {
    /// Not charging
    Idle,
    /// Charging, nothing notable
    Charging,
    /// Charge reached the effect frame this tick
    ChargeEffect,
    /// Button released: throw now
    Released {
        /// Charge level in [0, 1]
        charge_ratio: f64,
    },
}

/// Result of a projectile touching a player.
#[derive(Clone, Debug, PartialEq)]
pub enum Contact {
    /// Owner caught the boomerang; it is now flagged for removal
    Caught,
    /// A non-owner was struck
    Hit(HitInfo),
}

/// Effects of one hit, for the caller to apply to the target.
#[derive(Clone, Debug, PartialEq)]
pub struct HitInfo {
    /// Struck player
    pub target: EntityId,
    /// Damage to subtract from health
    pub damage: i32,
    /// Velocity to add to the target
    pub knockback: Vec2,
    /// Projectile centre at impact
    pub position: Vec2,
}

// =============================================================================
// THROW MATH
// =============================================================================

/// Advance a player's charge from the boomerang button state.
///
/// Charging starts on the press edge, only while the player has no boomerang
/// in flight, and counts up one per tick while held. Release yields the
/// charge ratio.
pub fn update_charge(
    charge: &mut ChargeState,
    pressed: bool,
    has_active: bool,
    config: &BoomerangConfig,
) -> ChargeOutcome {
    if has_active {
        charge.was_pressed = pressed;
        return ChargeOutcome::Idle;
    }

    if pressed && !charge.was_pressed {
        charge.charging = true;
        charge.charge_time = 0;
    }

    let mut outcome = ChargeOutcome::Idle;
    if charge.charging && pressed {
        charge.charge_time = (charge.charge_time + 1).min(config.max_charge_time);
        outcome = if charge.charge_time == config.charge_vfx_frame {
            ChargeOutcome::ChargeEffect
        } else {
            ChargeOutcome::Charging
        };
    }

    if charge.charging && !pressed {
        let max = config.max_charge_time.max(1);
        outcome = ChargeOutcome::Released {
            charge_ratio: f64::from(charge.charge_time) / f64::from(max),
        };
        charge.charging = false;
        charge.charge_time = 0;
    }

    charge.was_pressed = pressed;
    outcome
}

/// Normalized aim: up or down (diagonal while moving), otherwise facing.
pub fn aim_direction(facing: i8, up: bool, down: bool, moving: bool) -> Vec2 {
    let fx = if facing < 0 { -1.0 } else { 1.0 };
    let raw = if up && !down {
        Vec2::new(if moving { fx } else { 0.0 }, -1.0)
    } else if down && !up {
        Vec2::new(if moving { fx } else { 0.0 }, 1.0)
    } else {
        Vec2::new(fx, 0.0)
    };
    raw.normalize()
}

/// Throw speed scaled by charge.
#[inline]
pub fn throw_speed(base: f64, charge_ratio: f64) -> f64 {
    base * (1.0 + 0.5 * charge_ratio)
}

/// Outbound range scaled by charge.
#[inline]
pub fn max_range(base: f64, max_charge: f64, charge_ratio: f64) -> f64 {
    base + charge_ratio * (max_charge - base)
}

/// Damage scaled by charge (bonus truncated toward zero).
#[inline]
pub fn damage(base: i32, max_bonus: i32, charge_ratio: f64) -> i32 {
    base + (f64::from(max_bonus) * charge_ratio) as i32
}

/// Velocity that homes from `from` toward `to` at `speed`. Zero when on target.
#[inline]
pub fn homing_velocity(from: Vec2, to: Vec2, speed: f64) -> Vec2 {
    (to - from).normalize() * speed
}

impl ProjectileState {
    /// Spawn a boomerang for `owner` standing at `owner_body`.
    pub fn spawn(
        owner: EntityId,
        owner_body: &Rect,
        facing: i8,
        aim: Vec2,
        charge_ratio: f64,
        config: &BoomerangConfig,
    ) -> Self {
        let charge_ratio = charge_ratio.clamp(0.0, 1.0);
        let fx = if facing < 0 { -1.0 } else { 1.0 };
        let center = owner_body.center();
        let half = config.size / 2.0;
        let body = Rect::new(
            center.x + fx * config.spawn_offset - half,
            center.y - half,
            config.size,
            config.size,
        );

        let speed = throw_speed(config.throw_speed, charge_ratio);
        let velocity = Vec2::new(aim.x * speed, aim.y * speed - config.throw_lift);

        Self {
            body,
            velocity,
            phase: BoomerangPhase::Outbound,
            distance_traveled: 0.0,
            max_range: max_range(config.base_range, config.max_charge_range, charge_ratio),
            pierce_remaining: config.pierce_distance,
            damage: damage(config.base_damage, config.max_charge_damage_bonus, charge_ratio),
            charge_ratio,
            owner,
            hit_set: BTreeSet::new(),
            destroy: false,
        }
    }

    /// Centre of the collision box.
    #[inline]
    pub fn center(&self) -> Vec2 {
        self.body.center()
    }

    /// Advance one sub-step.
    ///
    /// `owner_center` is `None` when the owner no longer exists, which flags
    /// the projectile for removal.
    pub fn step(&mut self, owner_center: Option<Vec2>, config: &BoomerangConfig) {
        if self.destroy {
            return;
        }
        let Some(owner_center) = owner_center else {
            self.destroy = true;
            return;
        };

        match self.phase {
            BoomerangPhase::Outbound => {
                self.velocity.y += config.gravity;
                self.distance_traveled += self.velocity.length();
                if self.distance_traveled >= self.max_range {
                    self.phase = BoomerangPhase::Inbound;
                }
            }
            BoomerangPhase::Inbound => {
                self.velocity = homing_velocity(self.center(), owner_center, config.return_speed);
            }
        }

        self.body.x += self.velocity.x;
        self.body.y += self.velocity.y;
    }

    /// Check the projectile against the owner, level geometry and players.
    ///
    /// `players` lists every live player (owner included) in a stable order.
    pub fn resolve_contacts(
        &mut self,
        owner_body: Option<&Rect>,
        players: &[(EntityId, Rect)],
        space: &CollisionSpace,
        config: &BoomerangConfig,
    ) -> Vec<Contact> {
        let mut contacts = Vec::new();
        if self.destroy {
            return contacts;
        }

        // Proximity catch: the small box can skip past the owner at speed
        if self.phase == BoomerangPhase::Inbound {
            if let Some(owner) = owner_body {
                if self.center().distance(owner.center()) < config.catch_radius {
                    self.destroy = true;
                    contacts.push(Contact::Caught);
                    return contacts;
                }
            }
        }

        if self.phase == BoomerangPhase::Outbound
            && space.check(&self.body, 0.0, 0.0, &[Tag::Solid]).is_some()
        {
            self.phase = BoomerangPhase::Inbound;
        }

        for (id, rect) in players {
            if !self.body.overlaps(rect) {
                continue;
            }
            if *id == self.owner {
                if self.phase == BoomerangPhase::Inbound {
                    self.destroy = true;
                    contacts.push(Contact::Caught);
                    return contacts;
                }
                continue;
            }
            if let Some(hit) = self.register_hit(*id, rect.center(), config) {
                contacts.push(Contact::Hit(hit));
            }
        }

        contacts
    }

    /// Record a hit on `target`. Returns `None` if it was already struck
    /// this throw.
    pub fn register_hit(
        &mut self,
        target: EntityId,
        target_center: Vec2,
        config: &BoomerangConfig,
    ) -> Option<HitInfo> {
        if !self.hit_set.insert(target) {
            return None;
        }

        let center = self.center();
        let away = target_center.x - center.x;
        let direction = if away != 0.0 {
            away.signum()
        } else if self.velocity.x != 0.0 {
            self.velocity.x.signum()
        } else {
            0.0
        };

        self.pierce_remaining -= config.pierce_cost;
        if self.pierce_remaining <= 0.0 {
            self.phase = BoomerangPhase::Inbound;
        }

        Some(HitInfo {
            target,
            damage: self.damage,
            knockback: Vec2::new(direction * config.hit_knockback, config.knockback_upward),
            position: center,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::level::SolidKind;
    use proptest::prelude::*;

    fn flat_config() -> BoomerangConfig {
        BoomerangConfig {
            gravity: 0.0,
            throw_lift: 0.0,
            ..Default::default()
        }
    }

    fn owner_body() -> Rect {
        Rect::new(100.0, 100.0, 16.0, 40.0)
    }

    #[test]
    fn test_full_charge_damage() {
        let config = BoomerangConfig::default();
        assert_eq!(damage(config.base_damage, config.max_charge_damage_bonus, 1.0), 30);
        assert_eq!(damage(15, 15, 0.0), 15);
        assert_eq!(damage(15, 15, 0.5), 22);

        let p = ProjectileState::spawn(EntityId(1), &owner_body(), 1, Vec2::new(1.0, 0.0), 1.0, &config);
        assert_eq!(p.damage, 30);
        assert_eq!(p.max_range, 250.0);
        assert_eq!(p.velocity.x, 9.0);
        assert_eq!(p.velocity.y, -config.throw_lift);
    }

    #[test]
    fn test_range_transition_exactly_at_max() {
        let config = flat_config();
        let mut p = ProjectileState::spawn(EntityId(1), &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
        assert_eq!(p.max_range, 150.0);
        assert_eq!(p.velocity, Vec2::new(6.0, 0.0));

        let far_owner = Some(Vec2::new(-1000.0, 0.0));
        for _ in 0..24 {
            p.step(far_owner, &config);
        }
        assert_eq!(p.distance_traveled, 144.0);
        assert_eq!(p.phase, BoomerangPhase::Outbound);

        p.step(far_owner, &config);
        assert_eq!(p.distance_traveled, 150.0);
        assert_eq!(p.phase, BoomerangPhase::Inbound);
    }

    #[test]
    fn test_inbound_homes_to_owner() {
        let config = BoomerangConfig::default();
        let mut p = ProjectileState::spawn(EntityId(1), &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
        p.phase = BoomerangPhase::Inbound;
        p.body.x = 200.0;
        p.body.y = 114.0;
        let owner_center = owner_body().center();
        p.step(Some(owner_center), &config);
        assert!((p.velocity.length() - config.return_speed).abs() < 1e-9);
        assert!(p.velocity.x < 0.0);
    }

    #[test]
    fn test_owner_loss_flags_destroy() {
        let config = BoomerangConfig::default();
        let mut p = ProjectileState::spawn(EntityId(1), &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
        let before = p.body;
        p.step(None, &config);
        assert!(p.destroy);
        assert_eq!(p.body, before);
    }

    #[test]
    fn test_proximity_catch() {
        let config = BoomerangConfig::default();
        let owner = EntityId(1);
        let mut p = ProjectileState::spawn(owner, &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
        p.phase = BoomerangPhase::Inbound;
        // Centre 15 px from owner centre, boxes not overlapping
        let oc = owner_body().center();
        p.body.x = oc.x + 15.0 - 6.0;
        p.body.y = oc.y - 6.0;
        let space = CollisionSpace::new(640.0, 480.0, 16.0);
        let contacts = p.resolve_contacts(Some(&owner_body()), &[(owner, owner_body())], &space, &config);
        assert_eq!(contacts, vec![Contact::Caught]);
        assert!(p.destroy);
    }

    #[test]
    fn test_outbound_owner_overlap_is_ignored() {
        let config = BoomerangConfig::default();
        let owner = EntityId(1);
        let mut p = ProjectileState::spawn(owner, &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
        let space = CollisionSpace::new(640.0, 480.0, 16.0);
        let contacts = p.resolve_contacts(Some(&owner_body()), &[(owner, owner_body())], &space, &config);
        assert!(contacts.is_empty());
        assert!(!p.destroy);
    }

    #[test]
    fn test_wall_turns_inbound() {
        let config = flat_config();
        let mut space = CollisionSpace::new(640.0, 480.0, 16.0);
        space.add(Rect::new(140.0, 0.0, 16.0, 480.0), SolidKind::Solid);
        let owner = EntityId(1);
        let mut p = ProjectileState::spawn(owner, &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
        let mut steps = 0;
        while p.phase == BoomerangPhase::Outbound && steps < 10 {
            p.step(Some(owner_body().center()), &config);
            p.resolve_contacts(Some(&owner_body()), &[], &space, &config);
            steps += 1;
        }
        assert_eq!(p.phase, BoomerangPhase::Inbound);
        assert!(p.distance_traveled < p.max_range);
    }

    #[test]
    fn test_hit_once_with_knockback() {
        let config = BoomerangConfig::default();
        let owner = EntityId(1);
        let target = EntityId(2);
        let mut p = ProjectileState::spawn(owner, &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
        let target_body = Rect::new(p.body.x + 4.0, p.body.y - 10.0, 16.0, 40.0);
        let space = CollisionSpace::new(640.0, 480.0, 16.0);
        let players = [(owner, Rect::new(0.0, 0.0, 1.0, 1.0)), (target, target_body)];

        let first = p.resolve_contacts(None, &players, &space, &config);
        assert_eq!(first.len(), 1);
        match &first[0] {
            Contact::Hit(hit) => {
                assert_eq!(hit.target, target);
                assert_eq!(hit.damage, 15);
                assert_eq!(hit.knockback, Vec2::new(config.hit_knockback, config.knockback_upward));
            }
            other => panic!("expected hit, got {other:?}"),
        }

        let second = p.resolve_contacts(None, &players, &space, &config);
        assert!(second.is_empty());
        assert_eq!(p.pierce_remaining, config.pierce_distance - config.pierce_cost);
    }

    #[test]
    fn test_charge_cycle() {
        let config = BoomerangConfig::default();
        let mut charge = ChargeState::default();

        assert_eq!(update_charge(&mut charge, false, false, &config), ChargeOutcome::Idle);
        assert_eq!(update_charge(&mut charge, true, false, &config), ChargeOutcome::Charging);
        assert!(charge.charging);
        assert_eq!(charge.charge_time, 1);

        let mut effect_at = None;
        for tick in 2..=100 {
            if update_charge(&mut charge, true, false, &config) == ChargeOutcome::ChargeEffect {
                effect_at = Some(tick);
            }
        }
        assert_eq!(effect_at, Some(config.charge_vfx_frame));
        assert_eq!(charge.charge_time, config.max_charge_time);

        assert_eq!(
            update_charge(&mut charge, false, false, &config),
            ChargeOutcome::Released { charge_ratio: 1.0 }
        );
        assert!(!charge.charging);
    }

    #[test]
    fn test_no_charge_with_active_boomerang() {
        let config = BoomerangConfig::default();
        let mut charge = ChargeState::default();
        assert_eq!(update_charge(&mut charge, true, true, &config), ChargeOutcome::Idle);
        assert!(!charge.charging);
        // Still held after the boomerang is gone: no new press edge
        assert_eq!(update_charge(&mut charge, true, false, &config), ChargeOutcome::Idle);
    }

    #[test]
    fn test_aim_direction() {
        assert_eq!(aim_direction(1, false, false, false), Vec2::new(1.0, 0.0));
        assert_eq!(aim_direction(-1, false, false, true), Vec2::new(-1.0, 0.0));
        assert_eq!(aim_direction(1, true, false, false), Vec2::new(0.0, -1.0));
        assert_eq!(aim_direction(-1, false, true, false), Vec2::new(0.0, 1.0));
        let diag = aim_direction(1, true, false, true);
        assert!((diag.length() - 1.0).abs() < 1e-12);
        assert!(diag.x > 0.0 && diag.y < 0.0);
        assert_eq!(aim_direction(1, true, true, true), Vec2::new(1.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_hit_set_at_most_once(targets in proptest::collection::vec(0u64..6, 0..64)) {
            let config = BoomerangConfig::default();
            let mut p = ProjectileState::spawn(EntityId(100), &owner_body(), 1, Vec2::new(1.0, 0.0), 0.5, &config);
            let mut hits: std::collections::BTreeMap<u64, u32> = Default::default();
            let mut previous = p.hit_set.clone();
            for t in targets {
                if p.register_hit(EntityId(t), Vec2::new(0.0, 0.0), &config).is_some() {
                    *hits.entry(t).or_default() += 1;
                }
                prop_assert!(p.hit_set.is_superset(&previous));
                previous = p.hit_set.clone();
            }
            prop_assert!(hits.values().all(|&n| n == 1));
        }

        #[test]
        fn prop_pierce_budget(budget in 1u32..200, cost in 1u32..50) {
            let (budget, cost) = (f64::from(budget), f64::from(cost));
            let config = BoomerangConfig {
                pierce_distance: budget,
                pierce_cost: cost,
                ..Default::default()
            };
            let mut p = ProjectileState::spawn(EntityId(100), &owner_body(), 1, Vec2::new(1.0, 0.0), 0.0, &config);
            let limit = (budget / cost).ceil() as u64;
            let mut hits = 0u64;
            while p.phase == BoomerangPhase::Outbound {
                p.register_hit(EntityId(hits), Vec2::ZERO, &config);
                hits += 1;
                prop_assert!(hits <= limit);
            }
            prop_assert_eq!(hits, limit);
        }

        #[test]
        fn prop_distance_non_decreasing(ratio in 0.0f64..=1.0, aim_up in any::<bool>()) {
            let config = BoomerangConfig::default();
            let aim = aim_direction(1, aim_up, false, true);
            let mut p = ProjectileState::spawn(EntityId(1), &owner_body(), 1, aim, ratio, &config);
            let mut last = p.distance_traveled;
            let mut transitions = 0;
            let mut phase = p.phase;
            for _ in 0..200 {
                p.step(Some(Vec2::new(-5000.0, -5000.0)), &config);
                if p.phase == BoomerangPhase::Outbound {
                    prop_assert!(p.distance_traveled >= last);
                    last = p.distance_traveled;
                }
                if p.phase != phase {
                    transitions += 1;
                    phase = p.phase;
                }
            }
            prop_assert!(transitions <= 1);
        }
    }
}
