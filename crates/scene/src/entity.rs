//! Drawable entities and their owning collection.
//!
//! Entities are exclusively owned by an [`Entities`] collection keyed by
//! identifier. Identifiers are monotonically assigned and never reused
//! within a process lifetime. Meshes are shared between entities through
//! `Arc`; a mesh's GPU buffers live as long as the longest-lived entity
//! referencing it.

use std::collections::BTreeMap;
use std::sync::Arc;

use helio_rhi::mesh::Mesh;

use crate::transform::Transform;

/// Unique entity identifier.
pub type EntityId = u32;

/// A drawable entity.
///
/// An entity without a mesh is valid (e.g. a camera anchor); draw submission
/// skips it.
pub struct Entity {
    /// Unique identifier, assigned by the owning collection.
    id: EntityId,
    /// Shared mesh reference, if the entity is drawable.
    pub mesh: Option<Arc<Mesh>>,
    /// World transform.
    pub transform: Transform,
    /// Material/texture index written into the per-draw uniform region.
    pub texture_index: i32,
}

impl Entity {
    /// Returns the entity's identifier.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }
}

/// The owning collection of entities, keyed by identifier.
///
/// Iteration order is ascending by id, which matches spawn order since ids
/// are monotonic.
#[derive(Default)]
pub struct Entities {
    entities: BTreeMap<EntityId, Entity>,
    next_id: EntityId,
}

impl Entities {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a new entity and returns its identifier.
    pub fn spawn(
        &mut self,
        mesh: Option<Arc<Mesh>>,
        transform: Transform,
        texture_index: i32,
    ) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;

        self.entities.insert(
            id,
            Entity {
                id,
                mesh,
                transform,
                texture_index,
            },
        );

        id
    }

    /// Returns the entity with the given id.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Returns the entity with the given id, mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Removes and returns the entity with the given id.
    ///
    /// The id is retired; it will never be assigned again.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Iterates entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterates entities mutably in ascending id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut entities = Entities::new();
        let a = entities.spawn(None, Transform::default(), 0);
        let b = entities.spawn(None, Transform::default(), 1);
        let c = entities.spawn(None, Transform::default(), 2);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_ids_never_reused_after_removal() {
        let mut entities = Entities::new();
        let a = entities.spawn(None, Transform::default(), 0);
        entities.remove(a);
        let b = entities.spawn(None, Transform::default(), 0);
        assert_ne!(a, b);
        assert!(b > a);
        assert!(entities.get(a).is_none());
    }

    #[test]
    fn test_iteration_is_spawn_ordered() {
        let mut entities = Entities::new();
        for i in 0..5 {
            entities.spawn(None, Transform::default(), i);
        }
        let indices: Vec<i32> = entities.iter().map(|e| e.texture_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_get_mut_updates_transform() {
        let mut entities = Entities::new();
        let id = entities.spawn(None, Transform::default(), 0);
        entities.get_mut(id).unwrap().transform.translation.x = 4.0;
        assert_eq!(entities.get(id).unwrap().transform.translation.x, 4.0);
    }
}
