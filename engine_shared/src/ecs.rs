//! Entity/component system (minimal ECS).
//!
//! This is a deliberately small ECS suitable for deterministic simulation and
//! net replication. It is not archetype-based; instead it uses typed component
//! storages keyed by entity id, with a name index layered on top so the wire
//! protocol can reference entities by stable string name instead of the
//! arena-style integer id the world allocates internally.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use serde::{Deserialize, Serialize};

use crate::math::{Point, ViewDir};

/// Opaque entity id, stable only within one server process's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Stable wire-level entity name. See spec §6: entity references on the wire
/// use names, not ephemeral integer ids, so clients can resolve entities
/// across delayed or reordered snapshot delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityName(pub String);

impl std::fmt::Display for EntityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityName {
    fn from(s: &str) -> Self {
        EntityName(s.to_string())
    }
}

impl From<String> for EntityName {
    fn from(s: String) -> Self {
        EntityName(s)
    }
}

/// Simple world that can store typed components, indexed by both id and
/// stable name.
#[derive(Default)]
pub struct World {
    next_id: u64,
    storages: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    names: HashMap<EntityName, EntityId>,
    ids: HashMap<EntityId, EntityName>,
}

impl World {
    /// Creates a new, unnamed entity.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Creates a new entity and binds it to a stable name. Overwrites any
    /// previous binding for that name (the caller is responsible for
    /// removing a stale entity first via `remove_named`).
    pub fn spawn_named(&mut self, name: EntityName) -> EntityId {
        let id = self.spawn();
        self.ids.insert(id, name.clone());
        self.names.insert(name, id);
        id
    }

    /// Looks up an entity id by its stable name.
    pub fn entity_by_name(&self, name: &EntityName) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Removes an entity and all of its components, including its name binding.
    pub fn remove(&mut self, entity: EntityId) {
        if let Some(name) = self.ids.remove(&entity) {
            self.names.remove(&name);
        }
        remove_known_components(&mut self.storages, entity);
    }

    /// Removes an entity by its stable name, if bound. Returns the removed id.
    pub fn remove_named(&mut self, name: &EntityName) -> Option<EntityId> {
        let id = self.names.remove(name)?;
        self.ids.remove(&id);
        remove_known_components(&mut self.storages, id);
        Some(id)
    }

    /// Inserts/replaces a component for an entity.
    pub fn insert<T: 'static + Send + Sync>(&mut self, entity: EntityId, component: T) {
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(HashMap::<EntityId, T>::new()));

        let storage = storage
            .downcast_mut::<HashMap<EntityId, T>>()
            .expect("storage type mismatch");

        storage.insert(entity, component);
    }

    /// Gets a component reference.
    pub fn get<T: 'static + Send + Sync>(&self, entity: EntityId) -> Option<&T> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<HashMap<EntityId, T>>())
            .and_then(|storage| storage.get(&entity))
    }

    /// Gets a mutable component reference.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<HashMap<EntityId, T>>())
            .and_then(|storage| storage.get_mut(&entity))
    }

    /// Iterates entities with a given component.
    pub fn iter<T: 'static + Send + Sync>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<HashMap<EntityId, T>>())
            .into_iter()
            .flat_map(|storage| storage.iter().map(|(k, v)| (*k, v)))
    }

    /// Iterates every named entity currently in the world.
    pub fn iter_names(&self) -> impl Iterator<Item = (&EntityName, EntityId)> {
        self.names.iter().map(|(name, id)| (name, *id))
    }

    pub fn name_of(&self, entity: EntityId) -> Option<&EntityName> {
        self.ids.get(&entity)
    }
}

/// Removes `entity` from every component storage we know about. There is no
/// `Any`-safe way to iterate unknown value types, so this is routed through
/// the fixed set of components the core registers.
fn remove_known_components(storages: &mut HashMap<TypeId, Box<dyn Any + Send + Sync>>, entity: EntityId) {
    macro_rules! remove_from {
        ($t:ty) => {
            if let Some(storage) = storages.get_mut(&TypeId::of::<$t>()) {
                if let Some(map) = storage.downcast_mut::<HashMap<EntityId, $t>>() {
                    map.remove(&entity);
                }
            }
        };
    }
    remove_from!(Position);
    remove_from!(Facing);
    remove_from!(Health);
    remove_from!(Animation);
    remove_from!(Tint);
}

/// Position component. Always present on entities that are snapshot-eligible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position(pub Point);

/// Facing/view-direction component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Facing(pub ViewDir);

/// Current/max health component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

/// Animation identifier component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Animation(pub String);

/// Packed tint color component (e.g. 0xRRGGBBAA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tint(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecs_insert_and_get() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, Position(Point::new(1.0, 2.0)));
        assert_eq!(world.get::<Position>(e).unwrap().0.x, 1.0);
    }

    #[test]
    fn name_binding_round_trips_and_removes() {
        let mut world = World::default();
        let name = EntityName::from("hero_1");
        let id = world.spawn_named(name.clone());
        world.insert(id, Position(Point::ZERO));

        assert_eq!(world.entity_by_name(&name), Some(id));
        assert_eq!(world.name_of(id), Some(&name));

        world.remove_named(&name);
        assert_eq!(world.entity_by_name(&name), None);
        assert!(world.get::<Position>(id).is_none());
    }

    #[test]
    fn remove_by_id_clears_name_binding() {
        let mut world = World::default();
        let name = EntityName::from("hero_2");
        let id = world.spawn_named(name.clone());
        world.remove(id);
        assert_eq!(world.entity_by_name(&name), None);
    }
}
