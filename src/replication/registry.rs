//! Component Registry
//!
//! Maps a sync id to the functions that encode, decode-and-apply and
//! remove one replicated component type. Snapshot code looks components up
//! by id instead of branching on concrete types.

use std::any::Any;
use std::collections::BTreeMap;

use crate::game::world::{EntityId, World};
use crate::replication::components::{
    BoomerangInfo, Interpolate, PlayerInfo, Position, ReplicatedComponent, Velocity,
};
use crate::replication::ReplicationError;

/// Wire id of a replicated component type.
pub type SyncId = u16;

/// Value of `T` from the snapshot before the current one.
#[derive(Clone, Debug, PartialEq)]
pub struct Previous<T>(pub T);

type EncodeFn = fn(&World, EntityId) -> Option<Result<Vec<u8>, bincode::Error>>;
type ApplyFn = fn(&mut World, EntityId, &[u8], bool) -> Result<(), bincode::Error>;
type RemoveFn = fn(&mut World, EntityId);

struct Entry {
    name: &'static str,
    encode: EncodeFn,
    apply: ApplyFn,
    remove: RemoveFn,
    lerp: Option<Box<dyn Any + Send + Sync>>,
}

/// Registry of replicated component types keyed by sync id.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: BTreeMap<SyncId, Entry>,
}

fn encode_component<T: ReplicatedComponent>(
    world: &World,
    entity: EntityId,
) -> Option<Result<Vec<u8>, bincode::Error>> {
    world.get::<T>(entity).map(bincode::serialize)
}

fn apply_component<T: ReplicatedComponent>(
    world: &mut World,
    entity: EntityId,
    data: &[u8],
    _advance: bool,
) -> Result<(), bincode::Error> {
    let value: T = bincode::deserialize(data)?;
    world.set(entity, value);
    Ok(())
}

fn apply_interpolated<T: ReplicatedComponent>(
    world: &mut World,
    entity: EntityId,
    data: &[u8],
    advance: bool,
) -> Result<(), bincode::Error> {
    let value: T = bincode::deserialize(data)?;
    if advance {
        if let Some(current) = world.get::<T>(entity).cloned() {
            world.set(entity, Previous(current));
        }
    }
    world.set(entity, value);
    Ok(())
}

fn remove_component<T: ReplicatedComponent>(world: &mut World, entity: EntityId) {
    world.remove::<T>(entity);
    world.remove::<Previous<T>>(entity);
}

impl ComponentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every gameplay component registered.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register_interpolated::<Position>();
        registry.register_interpolated::<Velocity>();
        registry.register::<PlayerInfo>();
        registry.register_interpolated::<BoomerangInfo>();
        registry
    }

    /// Register a component that is overwritten on every snapshot.
    pub fn register<T: ReplicatedComponent>(&mut self) {
        self.entries.insert(
            T::SYNC_ID,
            Entry {
                name: T::NAME,
                encode: encode_component::<T>,
                apply: apply_component::<T>,
                remove: remove_component::<T>,
                lerp: None,
            },
        );
    }

    /// Register a component that keeps its previous value for blending.
    pub fn register_interpolated<T: ReplicatedComponent + Interpolate>(&mut self) {
        let lerp: fn(&T, &T, f64) -> T = <T as Interpolate>::lerp;
        self.entries.insert(
            T::SYNC_ID,
            Entry {
                name: T::NAME,
                encode: encode_component::<T>,
                apply: apply_interpolated::<T>,
                remove: remove_component::<T>,
                lerp: Some(Box::new(lerp)),
            },
        );
    }

    /// Whether a sync id is known.
    pub fn contains(&self, sync_id: SyncId) -> bool {
        self.entries.contains_key(&sync_id)
    }

    /// Registered sync ids in ascending order.
    pub fn sync_ids(&self) -> impl Iterator<Item = SyncId> + '_ {
        self.entries.keys().copied()
    }

    /// Component name for a sync id.
    pub fn name(&self, sync_id: SyncId) -> Option<&'static str> {
        self.entries.get(&sync_id).map(|e| e.name)
    }

    /// Whether the component registered under `sync_id` is interpolatable.
    pub fn is_interpolated(&self, sync_id: SyncId) -> bool {
        self.entries.get(&sync_id).is_some_and(|e| e.lerp.is_some())
    }

    /// Registered blend function for `T`.
    pub fn lerp_fn<T: ReplicatedComponent>(&self) -> Option<fn(&T, &T, f64) -> T> {
        self.entries
            .get(&T::SYNC_ID)
            .and_then(|e| e.lerp.as_ref())
            .and_then(|f| f.downcast_ref::<fn(&T, &T, f64) -> T>())
            .copied()
    }

    /// Encode one component of an entity. `Ok(None)` if it doesn't have one.
    pub fn encode(
        &self,
        world: &World,
        entity: EntityId,
        sync_id: SyncId,
    ) -> Result<Option<Vec<u8>>, ReplicationError> {
        let entry = self
            .entries
            .get(&sync_id)
            .ok_or(ReplicationError::UnknownComponent(sync_id))?;
        (entry.encode)(world, entity)
            .transpose()
            .map_err(|source| ReplicationError::Encode { sync_id, source })
    }

    /// Decode a payload and write it onto `entity`.
    ///
    /// `advance` is true when the payload comes from a newer snapshot than
    /// the one currently applied; interpolated components then keep the old
    /// value as their blend origin.
    pub fn apply(
        &self,
        world: &mut World,
        entity: EntityId,
        sync_id: SyncId,
        data: &[u8],
        advance: bool,
    ) -> Result<(), ReplicationError> {
        let entry = self
            .entries
            .get(&sync_id)
            .ok_or(ReplicationError::UnknownComponent(sync_id))?;
        (entry.apply)(world, entity, data, advance)
            .map_err(|source| ReplicationError::Decode { sync_id, source })
    }

    /// Remove a registered component (and its blend origin) from `entity`.
    pub fn remove(&self, world: &mut World, entity: EntityId, sync_id: SyncId) {
        if let Some(entry) = self.entries.get(&sync_id) {
            (entry.remove)(world, entity);
        }
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, e)| (id, e.name)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::components::{SYNC_PLAYER_INFO, SYNC_POSITION};

    #[test]
    fn test_standard_registry() {
        let registry = ComponentRegistry::standard();
        let ids: Vec<_> = registry.sync_ids().collect();
        assert_eq!(ids, vec![10, 11, 12, 13]);
        assert!(registry.is_interpolated(SYNC_POSITION));
        assert!(!registry.is_interpolated(SYNC_PLAYER_INFO));
        assert_eq!(registry.name(SYNC_PLAYER_INFO), Some("player_info"));
    }

    #[test]
    fn test_encode_apply_through_registry() {
        let registry = ComponentRegistry::standard();
        let mut server = World::new();
        let e = server.create();
        server.set(e, Position { x: 3.5, y: -2.0 });

        let bytes = registry.encode(&server, e, SYNC_POSITION).unwrap().unwrap();
        assert!(registry.encode(&server, e, SYNC_PLAYER_INFO).unwrap().is_none());

        let mut client = World::new();
        client.create_with_id(e);
        registry.apply(&mut client, e, SYNC_POSITION, &bytes, true).unwrap();
        assert_eq!(client.get::<Position>(e), Some(&Position { x: 3.5, y: -2.0 }));
    }

    #[test]
    fn test_unknown_and_corrupt_payloads() {
        let registry = ComponentRegistry::standard();
        let mut world = World::new();
        let e = world.create();

        assert!(matches!(
            registry.apply(&mut world, e, 999, &[1, 2, 3], true),
            Err(ReplicationError::UnknownComponent(999))
        ));
        assert!(matches!(
            registry.apply(&mut world, e, SYNC_POSITION, &[1, 2], true),
            Err(ReplicationError::Decode { sync_id: SYNC_POSITION, .. })
        ));
        assert!(world.get::<Position>(e).is_none());
    }

    #[test]
    fn test_interpolated_keeps_previous() {
        let registry = ComponentRegistry::standard();
        let mut world = World::new();
        let e = world.create();
        let a = bincode::serialize(&Position { x: 0.0, y: 0.0 }).unwrap();
        let b = bincode::serialize(&Position { x: 10.0, y: 0.0 }).unwrap();

        registry.apply(&mut world, e, SYNC_POSITION, &a, true).unwrap();
        registry.apply(&mut world, e, SYNC_POSITION, &b, true).unwrap();

        let prev = world.get::<Previous<Position>>(e).unwrap();
        let lerp = registry.lerp_fn::<Position>().unwrap();
        let mid = lerp(&prev.0, world.get::<Position>(e).unwrap(), 0.5);
        assert_eq!(mid, Position { x: 5.0, y: 0.0 });
        assert!(registry.lerp_fn::<PlayerInfo>().is_none());
    }
}
