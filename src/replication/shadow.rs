//! Shadow World
//!
//! Client-side mirror of the server's replicated entities. Every snapshot
//! fully describes the set of entities that exist, so applying one creates,
//! updates and destroys until the mirror matches it.

use std::collections::BTreeSet;

use tracing::debug;

use crate::game::world::{EntityId, World};
use crate::replication::components::ReplicatedComponent;
use crate::replication::registry::{ComponentRegistry, Previous};
use crate::replication::snapshot::Snapshot;

/// What applying one snapshot changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Entities created
    pub created: usize,
    /// Entities destroyed
    pub destroyed: usize,
    /// Entities updated
    pub updated: usize,
    /// Components that failed to decode or carried an unregistered sync id
    pub skipped: usize,
    /// Snapshot was older than the one already applied
    pub stale: bool,
}

/// Mirror of the server world as seen through snapshots.
#[derive(Debug, Default)]
pub struct ShadowWorld {
    world: World,
    last_tick: Option<u64>,
}

impl ShadowWorld {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrored entities and components.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Tick of the last applied snapshot.
    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Apply a full-state snapshot.
    ///
    /// Older snapshots are ignored. Re-applying the current tick overwrites
    /// values without moving the interpolation origin, so it is idempotent.
    pub fn apply(&mut self, snapshot: &Snapshot, registry: &ComponentRegistry) -> ApplyReport {
        let mut report = ApplyReport::default();

        let advance = match self.last_tick {
            Some(last) if snapshot.tick < last => {
                debug!(tick = snapshot.tick, last, "Ignoring stale snapshot");
                report.stale = true;
                return report;
            }
            Some(last) => snapshot.tick > last,
            None => true,
        };

        let mut present = BTreeSet::new();
        for entity in &snapshot.entities {
            present.insert(entity.id);
            if !self.world.valid(entity.id) {
                self.world.create_with_id(entity.id);
                report.created += 1;
            }

            for sync_id in registry.sync_ids() {
                match entity.component(sync_id) {
                    Some(payload) => {
                        if let Err(e) = registry.apply(&mut self.world, entity.id, sync_id, &payload.data, advance) {
                            debug!(entity = %entity.id, error = %e, "Skipping component");
                            report.skipped += 1;
                        }
                    }
                    None => registry.remove(&mut self.world, entity.id, sync_id),
                }
            }
            for payload in &entity.components {
                if !registry.contains(payload.sync_id) {
                    debug!(entity = %entity.id, sync_id = payload.sync_id, "Unknown component");
                    report.skipped += 1;
                }
            }
            report.updated += 1;
        }

        let gone: Vec<EntityId> = self
            .world
            .entities()
            .filter(|id| !present.contains(id))
            .collect();
        for id in gone {
            self.world.destroy(id);
            report.destroyed += 1;
        }

        self.last_tick = Some(snapshot.tick);
        report
    }

    /// Component value blended between the previous and current snapshot.
    ///
    /// Falls back to the current value when the type isn't interpolated or
    /// only one snapshot has been seen.
    pub fn interpolated<T: ReplicatedComponent>(
        &self,
        entity: EntityId,
        t: f64,
        registry: &ComponentRegistry,
    ) -> Option<T> {
        let current = self.world.get::<T>(entity)?;
        let blended = self
            .world
            .get::<Previous<T>>(entity)
            .zip(registry.lerp_fn::<T>())
            .map(|(prev, lerp)| lerp(&prev.0, current, t.clamp(0.0, 1.0)));
        Some(blended.unwrap_or_else(|| current.clone()))
    }
}
