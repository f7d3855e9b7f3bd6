//! Authoritative Simulation Tick
//!
//! [`Simulation`] owns the server world and advances it one tick at a time.
//! It is single-threaded and never touched by network code directly:
//! connection tasks enqueue [`SimCommand`]s and the game loop hands each
//! tick's batch to [`Simulation::tick`].
//!
//! Per tick:
//! 1. Drain commands (join, leave, input) in arrival order
//! 2. Sub-step every player, then charge / throw boomerangs
//! 3. Sub-step every boomerang with contact checks after each sub-step
//! 4. Sweep flagged boomerangs
//! 5. Write replicated components back

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::vec2::Rect;
use crate::game::collision::CollisionSpace;
use crate::game::config::SimConfig;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::input::{sequence_newer, ActionFlags, InputCommand};
use crate::game::level::LevelData;
use crate::game::physics::{tick_player, AnimState, PlayerPhysicsState};
use crate::game::projectile::{
    aim_direction, update_charge, ChargeOutcome, Contact, ProjectileState,
};
use crate::game::world::{EntityId, World};
use crate::replication::components::{BoomerangInfo, PlayerInfo, Position, Replicated, Velocity};

/// Network connection id assigned by the server.
pub type ClientId = u64;

/// Work queued for the next tick by connection tasks.
#[derive(Clone, Debug, PartialEq)]
pub enum SimCommand {
    /// Spawn a player for a client
    Join {
        /// Connection
        client: ClientId,
        /// Display name
        name: String,
    },
    /// Remove a client's player
    Leave {
        /// Connection
        client: ClientId,
    },
    /// Latest input from a client
    Input {
        /// Connection
        client: ClientId,
        /// Captured input
        input: InputCommand,
    },
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Tick number just simulated
    pub tick: u64,
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Players spawned this tick
    pub joined: Vec<(ClientId, EntityId)>,
    /// Players removed this tick
    pub left: Vec<(ClientId, EntityId)>,
}

/// Input a player is currently holding, plus presses seen since the last
/// tick so a short tap between ticks is not lost.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlayerInput {
    /// Most recent command
    pub latest: InputCommand,
    /// Jump pressed in any command this tick
    pub jump_latched: bool,
    /// Boomerang pressed in any command this tick
    pub boomerang_latched: bool,
}

impl PlayerInput {
    /// Command to simulate this tick.
    pub fn effective(&self) -> InputCommand {
        let mut input = self.latest;
        if self.jump_latched {
            input.actions.set(ActionFlags::JUMP, true);
        }
        if self.boomerang_latched {
            input.actions.set(ActionFlags::BOOMERANG, true);
        }
        input
    }

    fn record(&mut self, input: InputCommand) {
        self.jump_latched |= input.actions.jump();
        self.boomerang_latched |= input.actions.boomerang();
        self.latest = input;
    }

    fn clear_latches(&mut self) {
        self.jump_latched = false;
        self.boomerang_latched = false;
    }
}

/// Advance one player by one tick: sub-stepped physics, then the boomerang
/// charge. Server and client predictor both run exactly this.
pub fn advance_player(
    state: &mut PlayerPhysicsState,
    input: &InputCommand,
    has_active_boomerang: bool,
    space: &CollisionSpace,
    config: &SimConfig,
) -> ChargeOutcome {
    let locked = state.locked_state_timer > 0;
    tick_player(state, input, space, &config.physics, config.substeps());

    let outcome = update_charge(
        &mut state.charge,
        input.actions.boomerang(),
        has_active_boomerang,
        &config.boomerang,
    );
    // Lock is judged as of the start of the tick; tick_player already counted it down
    if matches!(outcome, ChargeOutcome::Charging | ChargeOutcome::ChargeEffect) && !locked {
        state.anim = AnimState::ChargingBoomerang;
    }
    outcome
}

// =============================================================================
// SIMULATION
// =============================================================================

/// Authoritative game state and the rules that advance it.
pub struct Simulation {
    config: SimConfig,
    level: Arc<LevelData>,
    space: CollisionSpace,
    world: World,
    tick: u64,
    joins: usize,
    clients: BTreeMap<ClientId, EntityId>,
    active_boomerangs: BTreeMap<EntityId, EntityId>,
}

impl Simulation {
    /// Create a simulation on `level`.
    pub fn new(config: SimConfig, level: Arc<LevelData>) -> Self {
        let space = CollisionSpace::from_level(&level);
        Self {
            config,
            level,
            space,
            world: World::new(),
            tick: 0,
            joins: 0,
            clients: BTreeMap::new(),
            active_boomerangs: BTreeMap::new(),
        }
    }

    /// Current tick (number of ticks simulated).
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Simulation tuning.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Level being played.
    pub fn level(&self) -> &Arc<LevelData> {
        &self.level
    }

    /// Static level geometry.
    pub fn space(&self) -> &CollisionSpace {
        &self.space
    }

    /// Authoritative world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Connected players.
    pub fn player_count(&self) -> usize {
        self.clients.len()
    }

    /// Player entity of a client.
    pub fn player_entity(&self, client: ClientId) -> Option<EntityId> {
        self.clients.get(&client).copied()
    }

    /// Physics state of a player.
    pub fn player(&self, entity: EntityId) -> Option<&PlayerPhysicsState> {
        self.world.get::<PlayerPhysicsState>(entity)
    }

    /// Live boomerang thrown by `owner`.
    pub fn active_boomerang(&self, owner: EntityId) -> Option<EntityId> {
        self.active_boomerangs.get(&owner).copied()
    }

    /// Live boomerang state.
    pub fn projectile(&self, entity: EntityId) -> Option<&ProjectileState> {
        self.world.get::<ProjectileState>(entity)
    }

    /// Run one tick over the queued commands.
    pub fn tick(&mut self, commands: impl IntoIterator<Item = SimCommand>) -> TickResult {
        self.tick += 1;
        let mut result = TickResult {
            tick: self.tick,
            ..Default::default()
        };

        // 1. Commands
        for command in commands {
            self.apply_command(command, &mut result);
        }

        // 2. Players
        self.update_players(&mut result);

        // 3. Boomerangs
        self.update_boomerangs(&mut result);

        // 4. Sweep
        self.destroy_flagged_boomerangs();

        // 5. Replicated state
        self.write_back();

        result
    }

    /// Hash of all simulated state at the current tick.
    pub fn state_hash(&self) -> StateHash {
        compute_state_hash(self.tick, |hasher| {
            for (id, player) in self.world.iter::<PlayerPhysicsState>() {
                hasher.update_u64(id.0);
                hasher.update_rect(&player.body);
                hasher.update_vec2(player.velocity);
                hasher.update_bool(player.on_ground);
                hasher.update_u8(player.facing as u8);
                hasher.update_u8(player.anim as u8);
                hasher.update_u32(player.last_processed_sequence);
            }
            for (id, info) in self.world.iter::<PlayerInfo>() {
                hasher.update_u64(id.0);
                hasher.update_i32(info.health);
            }
            for (id, proj) in self.world.iter::<ProjectileState>() {
                hasher.update_u64(id.0);
                hasher.update_rect(&proj.body);
                hasher.update_vec2(proj.velocity);
                hasher.update_f64(proj.distance_traveled);
                hasher.update_f64(proj.pierce_remaining);
                hasher.update_u64(proj.owner.0);
            }
        })
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    fn apply_command(&mut self, command: SimCommand, result: &mut TickResult) {
        match command {
            SimCommand::Join { client, name } => {
                if let Some(entity) = self.clients.get(&client) {
                    debug!(client, entity = %entity, "Duplicate join ignored");
                    return;
                }
                let entity = self.spawn_player(&name);
                self.clients.insert(client, entity);
                info!(client, entity = %entity, name = %name, "Player joined");
                result.joined.push((client, entity));
                result.events.push(GameEvent::new(
                    self.tick,
                    GameEventData::PlayerJoined { entity, name },
                ));
            }
            SimCommand::Leave { client } => {
                if let Some(entity) = self.clients.remove(&client) {
                    self.world.destroy(entity);
                    info!(client, entity = %entity, "Player left");
                    result.left.push((client, entity));
                    result
                        .events
                        .push(GameEvent::new(self.tick, GameEventData::PlayerLeft { entity }));
                }
            }
            SimCommand::Input { client, input } => {
                let Some(&entity) = self.clients.get(&client) else {
                    return;
                };
                let input = input.sanitized();
                let Some(physics) = self.world.get_mut::<PlayerPhysicsState>(entity) else {
                    return;
                };
                if !sequence_newer(input.sequence, physics.last_processed_sequence) {
                    debug!(client, sequence = input.sequence, "Stale input dropped");
                    return;
                }
                physics.last_processed_sequence = input.sequence;
                if let Some(slot) = self.world.get_mut::<PlayerInput>(entity) {
                    slot.record(input);
                }
            }
        }
    }

    fn spawn_player(&mut self, name: &str) -> EntityId {
        let spawn = self.level.spawn_point(self.joins);
        self.joins += 1;

        let entity = self.world.create();
        let physics = PlayerPhysicsState::new(spawn, &self.config.physics);
        self.world.set(entity, Position::from(physics.position()));
        self.world.set(entity, Velocity::default());
        self.world.set(
            entity,
            PlayerInfo {
                name: name.to_string(),
                anim: AnimState::Idle,
                facing: physics.facing,
                health: self.config.max_health,
                last_sequence: 0,
                on_ground: physics.on_ground,
            },
        );
        self.world.set(entity, physics);
        self.world.set(entity, PlayerInput::default());
        self.world.set(entity, Replicated);
        entity
    }

    // =========================================================================
    // PLAYERS
    // =========================================================================

    fn update_players(&mut self, result: &mut TickResult) {
        for entity in self.world.ids_with::<PlayerPhysicsState>() {
            let input = match self.world.get_mut::<PlayerInput>(entity) {
                Some(slot) => {
                    let input = slot.effective();
                    slot.clear_latches();
                    input
                }
                None => InputCommand::default(),
            };
            let has_active = self.active_boomerangs.contains_key(&entity);

            let Some(physics) = self.world.get_mut::<PlayerPhysicsState>(entity) else {
                continue;
            };
            let outcome = advance_player(physics, &input, has_active, &self.space, &self.config);

            match outcome {
                ChargeOutcome::ChargeEffect => {
                    let at = (physics.center().x, physics.body.bottom());
                    result.events.push(GameEvent::new(
                        self.tick,
                        GameEventData::BoomerangCharge {
                            owner: entity,
                            x: at.0,
                            y: at.1,
                        },
                    ));
                }
                ChargeOutcome::Released { charge_ratio } => {
                    self.throw_boomerang(entity, &input, charge_ratio, result);
                }
                ChargeOutcome::Idle | ChargeOutcome::Charging => {}
            }
        }
    }

    fn throw_boomerang(
        &mut self,
        owner: EntityId,
        input: &InputCommand,
        charge_ratio: f64,
        result: &mut TickResult,
    ) {
        let cfg = &self.config.boomerang;
        let Some(physics) = self.world.get_mut::<PlayerPhysicsState>(owner) else {
            return;
        };

        let aim = aim_direction(
            physics.facing,
            input.actions.move_up(),
            input.actions.crouch(),
            input.direction != 0,
        );
        let projectile = ProjectileState::spawn(owner, &physics.body, physics.facing, aim, charge_ratio, cfg);
        physics.lock_state(AnimState::Throw, cfg.throw_lock_ticks);

        let spawn = projectile.body.position();
        let boomerang = self.world.create();
        self.world.set(boomerang, boomerang_info(&projectile));
        self.world.set(boomerang, projectile);
        self.world.set(boomerang, Replicated);
        self.active_boomerangs.insert(owner, boomerang);

        debug!(owner = %owner, boomerang = %boomerang, charge_ratio, "Boomerang thrown");
        result.events.push(GameEvent::new(
            self.tick,
            GameEventData::BoomerangThrow {
                owner,
                boomerang,
                x: spawn.x,
                y: spawn.y,
                direction_x: aim.x,
                direction_y: aim.y,
                charge_ratio,
            },
        ));
    }

    // =========================================================================
    // BOOMERANGS
    // =========================================================================

    fn update_boomerangs(&mut self, result: &mut TickResult) {
        let boomerangs = self.world.ids_with::<ProjectileState>();
        if boomerangs.is_empty() {
            return;
        }

        for _ in 0..self.config.substeps() {
            for &boomerang in &boomerangs {
                self.step_boomerang(boomerang, result);
            }
        }
    }

    fn step_boomerang(&mut self, boomerang: EntityId, result: &mut TickResult) {
        let players: Vec<(EntityId, Rect)> = self
            .world
            .iter::<PlayerPhysicsState>()
            .map(|(id, p)| (id, p.body))
            .collect();

        let cfg = &self.config.boomerang;
        let Some(projectile) = self.world.get::<ProjectileState>(boomerang) else {
            return;
        };
        if projectile.destroy {
            return;
        }
        let owner = projectile.owner;
        let owner_body = self.world.get::<PlayerPhysicsState>(owner).map(|p| p.body);

        let Some(projectile) = self.world.get_mut::<ProjectileState>(boomerang) else {
            return;
        };
        projectile.step(owner_body.map(|b| b.center()), cfg);
        if projectile.destroy {
            debug!(boomerang = %boomerang, owner = %owner, "Owner gone, boomerang dropped");
            return;
        }
        let contacts = projectile.resolve_contacts(owner_body.as_ref(), &players, &self.space, cfg);
        let charge_ratio = projectile.charge_ratio;

        for contact in contacts {
            match contact {
                Contact::Caught => {
                    debug!(boomerang = %boomerang, owner = %owner, "Boomerang caught");
                    result.events.push(GameEvent::new(
                        self.tick,
                        GameEventData::BoomerangCatch { owner, boomerang },
                    ));
                }
                Contact::Hit(hit) => {
                    if let Some(target) = self.world.get_mut::<PlayerPhysicsState>(hit.target) {
                        target.velocity += hit.knockback;
                        target.on_ground = false;
                        target.ground_platform = None;
                        target.lock_state(AnimState::Hit, cfg.hit_lock_ticks);
                    }
                    if let Some(info) = self.world.get_mut::<PlayerInfo>(hit.target) {
                        info.health = (info.health - hit.damage).max(0);
                    }
                    info!(
                        attacker = %owner,
                        target = %hit.target,
                        damage = hit.damage,
                        "Boomerang hit"
                    );
                    result.events.push(GameEvent::new(
                        self.tick,
                        GameEventData::BoomerangHit {
                            attacker: owner,
                            target: hit.target,
                            hit_x: hit.position.x,
                            hit_y: hit.position.y,
                            charge_ratio,
                            damage: hit.damage,
                            knockback_x: hit.knockback.x,
                            knockback_y: hit.knockback.y,
                        },
                    ));
                }
            }
        }
    }

    fn destroy_flagged_boomerangs(&mut self) {
        let flagged: Vec<(EntityId, EntityId)> = self
            .world
            .iter::<ProjectileState>()
            .filter(|(_, p)| p.destroy)
            .map(|(id, p)| (id, p.owner))
            .collect();

        for (boomerang, owner) in flagged {
            self.world.destroy(boomerang);
            if self.active_boomerangs.get(&owner) == Some(&boomerang) {
                self.active_boomerangs.remove(&owner);
            }
        }
        // Owners that left keep no entry
        let world = &self.world;
        self.active_boomerangs.retain(|_, b| world.valid(*b));
    }

    fn write_back(&mut self) {
        for entity in self.world.ids_with::<PlayerPhysicsState>() {
            let Some(physics) = self.world.get::<PlayerPhysicsState>(entity).cloned() else {
                continue;
            };
            self.world.set(entity, Position::from(physics.position()));
            self.world.set(entity, Velocity::from(physics.velocity));
            if let Some(info) = self.world.get_mut::<PlayerInfo>(entity) {
                info.anim = physics.anim;
                info.facing = physics.facing;
                info.last_sequence = physics.last_processed_sequence;
                info.on_ground = physics.on_ground;
            }
        }

        for entity in self.world.ids_with::<ProjectileState>() {
            let Some(info) = self.world.get::<ProjectileState>(entity).map(boomerang_info) else {
                continue;
            };
            self.world.set(entity, info);
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("level", &self.level.name)
            .field("players", &self.clients.len())
            .field("boomerangs", &self.active_boomerangs.len())
            .finish()
    }
}

fn boomerang_info(projectile: &ProjectileState) -> BoomerangInfo {
    BoomerangInfo {
        x: projectile.body.x,
        y: projectile.body.y,
        vel_x: projectile.velocity.x,
        vel_y: projectile.velocity.y,
        owner: projectile.owner,
        phase: projectile.phase,
        distance_traveled: projectile.distance_traveled,
        charge_ratio: projectile.charge_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::projectile::BoomerangPhase;

    fn sim() -> Simulation {
        Simulation::new(SimConfig::default(), Arc::new(LevelData::arena()))
    }

    fn join(sim: &mut Simulation, client: ClientId) -> EntityId {
        let result = sim.tick([SimCommand::Join {
            client,
            name: format!("p{client}"),
        }]);
        result.joined[0].1
    }

    fn input(client: ClientId, sequence: u32, direction: i8, actions: ActionFlags) -> SimCommand {
        SimCommand::Input {
            client,
            input: InputCommand::new(sequence, direction, actions),
        }
    }

    fn place(sim: &mut Simulation, entity: EntityId, x: f64, y: f64) {
        if let Some(p) = sim.world.get_mut::<PlayerPhysicsState>(entity) {
            p.set_position(Vec2::new(x, y));
            p.velocity = Vec2::ZERO;
            p.on_ground = true;
        }
    }

    #[test]
    fn test_join_spawns_replicated_player() {
        let mut sim = sim();
        let result = sim.tick([SimCommand::Join { client: 7, name: "ana".into() }]);

        assert_eq!(result.tick, 1);
        assert_eq!(result.joined.len(), 1);
        let entity = result.joined[0].1;
        assert_eq!(sim.player_entity(7), Some(entity));
        assert!(sim.world().has::<Replicated>(entity));
        assert_eq!(sim.world().get::<PlayerInfo>(entity).unwrap().health, 100);
        assert!(matches!(
            result.events[0].data,
            GameEventData::PlayerJoined { .. }
        ));
    }

    #[test]
    fn test_duplicate_join_ignored() {
        let mut sim = sim();
        let first = join(&mut sim, 1);
        let result = sim.tick([SimCommand::Join { client: 1, name: "again".into() }]);
        assert!(result.joined.is_empty());
        assert_eq!(sim.player_entity(1), Some(first));
        assert_eq!(sim.player_count(), 1);
    }

    #[test]
    fn test_leave_destroys_immediately() {
        let mut sim = sim();
        let entity = join(&mut sim, 1);
        let result = sim.tick([SimCommand::Leave { client: 1 }]);
        assert_eq!(result.left, vec![(1, entity)]);
        assert!(!sim.world().valid(entity));
        assert_eq!(sim.player_count(), 0);
    }

    #[test]
    fn test_input_sequence_tracking() {
        let mut sim = sim();
        let entity = join(&mut sim, 1);

        sim.tick([input(1, 5, 1, ActionFlags::empty())]);
        assert_eq!(sim.player(entity).unwrap().last_processed_sequence, 5);

        // Older and duplicate sequences are dropped
        sim.tick([input(1, 3, -1, ActionFlags::empty()), input(1, 5, -1, ActionFlags::empty())]);
        let player = sim.player(entity).unwrap();
        assert_eq!(player.last_processed_sequence, 5);
        assert_eq!(player.facing, 1);
        assert_eq!(
            sim.world().get::<PlayerInfo>(entity).unwrap().last_sequence,
            5
        );
    }

    #[test]
    fn test_jump_tap_between_ticks_is_latched() {
        let mut sim = sim();
        let entity = join(&mut sim, 1);
        for _ in 0..20 {
            sim.tick([]);
        }
        assert!(sim.player(entity).unwrap().on_ground);

        sim.tick([
            input(1, 1, 0, ActionFlags::empty().with(ActionFlags::JUMP)),
            input(1, 2, 0, ActionFlags::empty()),
        ]);
        let player = sim.player(entity).unwrap();
        assert!(!player.on_ground);
        assert!(player.velocity.y < 0.0);
    }

    #[test]
    fn test_write_back_positions() {
        let mut sim = sim();
        let entity = join(&mut sim, 1);
        sim.tick([input(1, 1, 1, ActionFlags::empty())]);

        let physics = sim.player(entity).unwrap().clone();
        let position = sim.world().get::<Position>(entity).unwrap();
        assert_eq!(position.to_vec2(), physics.position());
        let velocity = sim.world().get::<Velocity>(entity).unwrap();
        assert_eq!(velocity.x, physics.velocity.x);
    }

    #[test]
    fn test_charge_throw_and_catch() {
        let mut sim = sim();
        let entity = join(&mut sim, 1);
        for _ in 0..10 {
            sim.tick([]);
        }

        let boomerang = ActionFlags::empty().with(ActionFlags::BOOMERANG);
        let mut seq = 0;
        let mut saw_charge_effect = false;
        for _ in 0..20 {
            seq += 1;
            let result = sim.tick([input(1, seq, 0, boomerang)]);
            saw_charge_effect |= result
                .events
                .iter()
                .any(|e| matches!(e.data, GameEventData::BoomerangCharge { .. }));
        }
        assert!(saw_charge_effect);
        assert_eq!(sim.player(entity).unwrap().anim, AnimState::ChargingBoomerang);

        seq += 1;
        let result = sim.tick([input(1, seq, 0, ActionFlags::empty())]);
        let thrown = sim.active_boomerang(entity).expect("boomerang in flight");
        assert!(result.events.iter().any(|e| matches!(
            e.data,
            GameEventData::BoomerangThrow { owner, boomerang, .. } if owner == entity && boomerang == thrown
        )));
        assert_eq!(sim.player(entity).unwrap().anim, AnimState::Throw);
        assert!(sim.world().has::<BoomerangInfo>(thrown));

        // A second press while one is in flight does not charge
        seq += 1;
        sim.tick([input(1, seq, 0, boomerang)]);
        assert!(!sim.player(entity).unwrap().charge.charging);

        let mut caught = false;
        for _ in 0..200 {
            seq += 1;
            let result = sim.tick([input(1, seq, 0, ActionFlags::empty())]);
            if result
                .events
                .iter()
                .any(|e| matches!(e.data, GameEventData::BoomerangCatch { .. }))
            {
                caught = true;
                break;
            }
        }
        assert!(caught);
        assert!(sim.active_boomerang(entity).is_none());
        assert!(!sim.world().valid(thrown));
    }

    #[test]
    fn test_hit_applies_damage_and_lock() {
        let mut sim = sim();
        let thrower = join(&mut sim, 1);
        let target = join(&mut sim, 2);
        for _ in 0..10 {
            sim.tick([]);
        }
        place(&mut sim, thrower, 64.0, 280.0);
        place(&mut sim, target, 110.0, 280.0);

        let boomerang = ActionFlags::empty().with(ActionFlags::BOOMERANG);
        sim.tick([input(1, 1, 0, boomerang)]);

        let mut hit = None;
        for seq in 2..40 {
            let result = sim.tick([input(1, seq, 0, ActionFlags::empty())]);
            if let Some(event) = result
                .events
                .iter()
                .find(|e| matches!(e.data, GameEventData::BoomerangHit { .. }))
            {
                hit = Some(event.clone());
                break;
            }
        }

        let event = hit.expect("target was hit");
        let GameEventData::BoomerangHit { attacker, target: struck, damage, knockback_x, .. } = event.data else {
            unreachable!()
        };
        assert_eq!(attacker, thrower);
        assert_eq!(struck, target);
        assert!(knockback_x > 0.0);
        let info = sim.world().get::<PlayerInfo>(target).unwrap();
        assert_eq!(info.health, 100 - damage);
        assert_eq!(info.anim, AnimState::Hit);
    }

    #[test]
    fn test_fast_boomerang_hits_between_tick_boundaries() {
        let mut config = SimConfig::default();
        config.boomerang.throw_speed = 20.0;
        // One tick of travel clears boomerang and player boxes combined
        let per_tick = config.boomerang.throw_speed * f64::from(config.substeps());
        assert!(per_tick > config.boomerang.size + config.physics.player_width);

        for offset in (40..=120).step_by(4) {
            let mut sim = Simulation::new(config.clone(), Arc::new(LevelData::arena()));
            let thrower = join(&mut sim, 1);
            let target = join(&mut sim, 2);
            for _ in 0..10 {
                sim.tick([]);
            }
            place(&mut sim, thrower, 64.0, 280.0);
            place(&mut sim, target, 64.0 + f64::from(offset), 280.0);

            sim.tick([input(1, 1, 0, ActionFlags::empty().with(ActionFlags::BOOMERANG))]);
            let mut struck = false;
            for seq in 2..12 {
                let result = sim.tick([input(1, seq, 0, ActionFlags::empty())]);
                struck |= result.events.iter().any(|e| {
                    matches!(e.data, GameEventData::BoomerangHit { target: t, .. } if t == target)
                });
                if struck {
                    break;
                }
            }
            assert!(struck, "target at offset {offset} was skipped");
        }
    }

    #[test]
    fn test_lock_holds_through_last_tick_while_charging() {
        let config = SimConfig::default();
        let level = LevelData::arena();
        let space = CollisionSpace::from_level(&level);
        let mut state = PlayerPhysicsState::new(level.spawn_point(0), &config.physics);
        state.lock_state(AnimState::Hit, 1);

        let held = ActionFlags::empty().with(ActionFlags::BOOMERANG);
        let outcome = advance_player(&mut state, &InputCommand::new(1, 0, held), false, &space, &config);
        assert_eq!(outcome, ChargeOutcome::Charging);
        assert_eq!(state.anim, AnimState::Hit);
        assert_eq!(state.locked_state_timer, 0);

        advance_player(&mut state, &InputCommand::new(2, 0, held), false, &space, &config);
        assert_eq!(state.anim, AnimState::ChargingBoomerang);
    }

    #[test]
    fn test_owner_leaving_drops_boomerang() {
        let mut sim = sim();
        let entity = join(&mut sim, 1);
        for _ in 0..10 {
            sim.tick([]);
        }
        let boomerang = ActionFlags::empty().with(ActionFlags::BOOMERANG);
        sim.tick([input(1, 1, 0, boomerang)]);
        sim.tick([input(1, 2, 0, ActionFlags::empty())]);
        let thrown = sim.active_boomerang(entity).unwrap();
        assert_eq!(sim.projectile(thrown).unwrap().phase, BoomerangPhase::Outbound);

        sim.tick([SimCommand::Leave { client: 1 }]);
        assert!(!sim.world().valid(thrown));
        assert!(sim.active_boomerang(entity).is_none());
    }

    #[test]
    fn test_identical_runs_hash_equal() {
        let run = || {
            let mut sim = sim();
            join(&mut sim, 1);
            join(&mut sim, 2);
            for seq in 1..120u32 {
                let dir = if seq % 40 < 20 { 1 } else { -1 };
                let mut actions = ActionFlags::empty();
                actions.set(ActionFlags::JUMP, seq % 17 == 0);
                actions.set(ActionFlags::BOOMERANG, seq % 30 < 10);
                sim.tick([input(1, seq, dir, actions), input(2, seq, -dir, ActionFlags::empty())]);
            }
            sim.state_hash()
        };
        assert_eq!(run(), run());
    }
}
