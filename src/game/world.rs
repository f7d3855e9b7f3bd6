//! Entity/Component Store
//!
//! Minimal typed component storage keyed by entity id. Storages are
//! `BTreeMap`s, so iteration is in ascending id order on every run.
//!
//! Ids are never reused. A stored [`EntityId`] is therefore a safe weak
//! reference: once the entity is destroyed, [`World::valid`] reports false
//! forever and lookups return `None`.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Serialize, Deserialize};

/// Opaque entity id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

trait Storage: Send + Sync {
    fn remove(&mut self, entity: EntityId);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static + Send + Sync> Storage for BTreeMap<EntityId, T> {
    fn remove(&mut self, entity: EntityId) {
        BTreeMap::remove(self, &entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// World holding entities and their typed components.
#[derive(Default)]
pub struct World {
    next_id: u64,
    alive: BTreeSet<EntityId>,
    storages: HashMap<TypeId, Box<dyn Storage>>,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entity with a fresh id.
    pub fn create(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.alive.insert(id);
        id
    }

    /// Create an entity with an id chosen elsewhere (mirroring a remote world).
    ///
    /// Returns false if the id is already alive.
    pub fn create_with_id(&mut self, id: EntityId) -> bool {
        if !self.alive.insert(id) {
            return false;
        }
        self.next_id = self.next_id.max(id.0 + 1);
        true
    }

    /// Destroy an entity and all of its components.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        if !self.alive.remove(&entity) {
            return false;
        }
        for storage in self.storages.values_mut() {
            storage.remove(entity);
        }
        true
    }

    /// Whether the entity exists.
    #[inline]
    pub fn valid(&self, entity: EntityId) -> bool {
        self.alive.contains(&entity)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    /// Whether the world has no entities.
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Live entity ids in ascending order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive.iter().copied()
    }

    /// Insert or replace a component. Ignored for dead entities.
    pub fn set<T: 'static + Send + Sync>(&mut self, entity: EntityId, component: T) -> bool {
        if !self.valid(entity) {
            return false;
        }
        self.storage_mut::<T>().insert(entity, component);
        true
    }

    /// Remove a component, returning it.
    pub fn remove<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<T> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<BTreeMap<EntityId, T>>())
            .and_then(|s| s.remove(&entity))
    }

    /// Get a component.
    pub fn get<T: 'static + Send + Sync>(&self, entity: EntityId) -> Option<&T> {
        self.storage::<T>().and_then(|s| s.get(&entity))
    }

    /// Get a component mutably.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<BTreeMap<EntityId, T>>())
            .and_then(|s| s.get_mut(&entity))
    }

    /// Whether the entity has a component of type `T`.
    pub fn has<T: 'static + Send + Sync>(&self, entity: EntityId) -> bool {
        self.get::<T>(entity).is_some()
    }

    /// Entities with component `T`, in ascending id order.
    pub fn iter<T: 'static + Send + Sync>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.storage::<T>()
            .into_iter()
            .flat_map(|s| s.iter().map(|(id, c)| (*id, c)))
    }

    /// Mutable iteration over component `T`, in ascending id order.
    pub fn iter_mut<T: 'static + Send + Sync>(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<BTreeMap<EntityId, T>>())
            .into_iter()
            .flat_map(|s| s.iter_mut().map(|(id, c)| (*id, c)))
    }

    /// Ids of entities with component `T`. Safe to mutate the world while
    /// walking the returned list.
    pub fn ids_with<T: 'static + Send + Sync>(&self) -> Vec<EntityId> {
        self.iter::<T>().map(|(id, _)| id).collect()
    }

    /// Visit every entity with component `T` exactly once.
    pub fn for_each<T: 'static + Send + Sync, F: FnMut(EntityId, &T)>(&self, mut f: F) {
        for (id, component) in self.iter::<T>() {
            f(id, component);
        }
    }

    fn storage<T: 'static + Send + Sync>(&self) -> Option<&BTreeMap<EntityId, T>> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|s| s.as_any().downcast_ref::<BTreeMap<EntityId, T>>())
    }

    fn storage_mut<T: 'static + Send + Sync>(&mut self) -> &mut BTreeMap<EntityId, T> {
        let entry = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(BTreeMap::<EntityId, T>::new()));
        match entry.as_any_mut().downcast_mut::<BTreeMap<EntityId, T>>() {
            Some(storage) => storage,
            None => unreachable!("storage for a TypeId always holds that type"),
        }
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.alive.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(i32);

    #[derive(Debug, PartialEq)]
    struct Name(&'static str);

    #[test]
    fn test_create_set_get() {
        let mut world = World::new();
        let e = world.create();
        assert!(world.set(e, Health(100)));
        assert_eq!(world.get::<Health>(e), Some(&Health(100)));
        assert!(world.get::<Name>(e).is_none());

        world.get_mut::<Health>(e).unwrap().0 -= 15;
        assert_eq!(world.get::<Health>(e), Some(&Health(85)));
    }

    #[test]
    fn test_destroy_removes_components() {
        let mut world = World::new();
        let e = world.create();
        world.set(e, Health(1));
        world.set(e, Name("a"));

        assert!(world.destroy(e));
        assert!(!world.valid(e));
        assert!(world.get::<Health>(e).is_none());
        assert!(world.get::<Name>(e).is_none());
        assert!(!world.destroy(e));
        assert!(!world.set(e, Health(5)));
    }

    #[test]
    fn test_ids_never_reused() {
        let mut world = World::new();
        let a = world.create();
        world.destroy(a);
        let b = world.create();
        assert_ne!(a, b);
        assert!(!world.valid(a));
    }

    #[test]
    fn test_iteration_order_and_exactly_once() {
        let mut world = World::new();
        let ids: Vec<_> = (0..5).map(|_| world.create()).collect();
        for id in ids.iter().rev() {
            world.set(*id, Health(id.0 as i32));
        }
        world.destroy(ids[2]);

        let mut seen = Vec::new();
        world.for_each::<Health, _>(|id, _| seen.push(id));
        assert_eq!(seen, vec![ids[0], ids[1], ids[3], ids[4]]);
    }

    #[test]
    fn test_create_with_id() {
        let mut world = World::new();
        assert!(world.create_with_id(EntityId(10)));
        assert!(!world.create_with_id(EntityId(10)));
        let next = world.create();
        assert_eq!(next, EntityId(11));
    }
}
