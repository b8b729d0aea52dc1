//! Structural-change event hooks.
//!
//! A world may carry one [`EventSink`]; when absent, every hook is a no-op.
//! Hooks fire at well-defined points:
//!
//! - creation: after the directory and archetype are consistent,
//! - destruction: before the archetype remove,
//! - component add/remove: immediately after the move,
//! - component set: immediately after the write.
//!
//! Bulk operations notify once per affected archetype through the `_many`
//! variants; their default implementations fan out per entity, so a sink that
//! needs per-entity granularity overrides nothing.

use crate::types::{ComponentId, Entity, EntityId, WorldId};

/// Receiver for structural-change notifications.
///
/// All methods default to no-ops; implement only what you observe.
#[allow(unused_variables)]
pub trait EventSink: Send + Sync {
    /// A new entity exists; directory and archetype are already consistent.
    fn on_entity_created(&self, entity: Entity) {}

    /// An entity is about to be removed from its archetype.
    fn on_entity_destroyed(&self, entity: Entity) {}

    /// `component` was added to `entity`; the move has completed.
    fn on_component_added(&self, entity: Entity, component: ComponentId) {}

    /// `component` was removed from `entity`; the move has completed.
    fn on_component_removed(&self, entity: Entity, component: ComponentId) {}

    /// `component` of `entity` was overwritten in place.
    fn on_component_set(&self, entity: Entity, component: ComponentId) {}

    /// Bulk add: `component` was added to every entity of one archetype.
    fn on_component_added_many(&self, world: WorldId, component: ComponentId, ids: &[EntityId]) {
        for &id in ids {
            self.on_component_added(Entity::new(id, world), component);
        }
    }

    /// Bulk remove: `component` was removed from every entity of one
    /// archetype.
    fn on_component_removed_many(&self, world: WorldId, component: ComponentId, ids: &[EntityId]) {
        for &id in ids {
            self.on_component_removed(Entity::new(id, world), component);
        }
    }

    /// Bulk set: `component` was overwritten for every entity of one
    /// archetype.
    fn on_component_set_many(&self, world: WorldId, component: ComponentId, ids: &[EntityId]) {
        for &id in ids {
            self.on_component_set(Entity::new(id, world), component);
        }
    }
}
