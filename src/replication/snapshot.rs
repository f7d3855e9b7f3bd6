//! Snapshots
//!
//! A snapshot is the complete replicated state for one tick. It never
//! carries deltas, so a lost snapshot stops mattering once the next one
//! arrives.

use serde::{Serialize, Deserialize};

use crate::game::world::{EntityId, World};
use crate::replication::components::Replicated;
use crate::replication::registry::{ComponentRegistry, SyncId};
use crate::replication::ReplicationError;

/// One encoded component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentPayload {
    /// Registry key
    pub sync_id: SyncId,
    /// bincode bytes, hex in JSON
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// All replicated components of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Server entity id
    pub id: EntityId,
    /// Components ordered by sync id
    pub components: Vec<ComponentPayload>,
}

impl EntitySnapshot {
    /// Payload for a sync id.
    pub fn component(&self, sync_id: SyncId) -> Option<&ComponentPayload> {
        self.components.iter().find(|c| c.sync_id == sync_id)
    }
}

/// Complete replicated state for one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Server tick
    pub tick: u64,
    /// Entities ordered by id
    pub entities: Vec<EntitySnapshot>,
}

impl Snapshot {
    /// Entity entry by id.
    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Decode one component of one entity.
    pub fn decode<T: crate::replication::components::ReplicatedComponent>(&self, id: EntityId) -> Option<T> {
        self.entity(id)
            .and_then(|e| e.component(T::SYNC_ID))
            .and_then(|c| bincode::deserialize(&c.data).ok())
    }
}

/// Serialize every entity carrying the [`Replicated`] marker.
pub fn build_snapshot(
    world: &World,
    registry: &ComponentRegistry,
    tick: u64,
) -> Result<Snapshot, ReplicationError> {
    let mut entities = Vec::new();
    for (id, _) in world.iter::<Replicated>() {
        let mut components = Vec::new();
        for sync_id in registry.sync_ids() {
            if let Some(data) = registry.encode(world, id, sync_id)? {
                components.push(ComponentPayload { sync_id, data });
            }
        }
        entities.push(EntitySnapshot { id, components });
    }
    Ok(Snapshot { tick, entities })
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
