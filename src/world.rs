//! # World: the public structural and query API
//!
//! The world composes the archetype graph, the entity directory, the id
//! recycler, and the query cache, and serves every structural change and
//! query the ECS supports.
//!
//! ## Concurrency model
//!
//! Structural changes (anything that creates/destroys entities, changes an
//! entity's archetype, or alters the archetype set) take `&mut self`;
//! read-only queries take `&self`. The receiver is the marker that
//! classifies operations: Rust's borrow rules enforce the single-writer
//! discipline within safe code, and [`World::par_for_each_chunk`] fans
//! chunk-disjoint work out across threads while the world is exclusively
//! borrowed.
//!
//! The one internal lock is the query-cache latch: the cache is the only
//! structure a read-only query touches that structural changes also mutate.
//! Many queries may read it concurrently; a cache fill or a structural
//! change takes it exclusively, and briefly.
//!
//! ## Accounting
//!
//! `size` is the number of live entities; `capacity` is the total number of
//! chunk rows allocated across all archetypes. Whenever a chunk or archetype
//! is created the capacity grows and the directory is grown to match, so an
//! entity id (which is always `< size` at issue time) can never index out of
//! the directory's bounds.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::RwLock;

use log::{debug, trace};
use rayon::prelude::*;

use crate::archetype::{bulk_move_rows, move_row_components, Archetype};
use crate::bitset::{Signature, SpanBitSet};
use crate::commands::Bundle;
use crate::directory::EntityDirectory;
use crate::error::{CapacityError, EcsError, EcsResult, PreconditionViolation};
use crate::events::EventSink;
use crate::graph::ArchetypeGraph;
use crate::query::{self, ChunkView, Query, QueryCache, QueryDescription};
use crate::registry::{component_id_of, Component};
use crate::types::{
    ArchetypeId, ChunkIndex, ComponentId, Entity, EntityCount, EntityId, EntityLocation,
    EntityReference, RecycledEntity, RowIndex, Version, WorldId, CHUNK_BYTES, SIGNATURE_WORDS,
};

/// Construction parameters for a [`World`].
pub struct WorldConfig {
    /// Byte budget for every chunk buffer; `entities_per_chunk` of each
    /// archetype is derived from it.
    pub chunk_bytes: usize,

    /// Optional receiver of structural-change events. When absent the hooks
    /// are no-ops.
    pub sink: Option<Box<dyn EventSink>>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: CHUNK_BYTES,
            sink: None,
        }
    }
}

/// An archetype-based entity store.
pub struct World {
    id: WorldId,
    graph: ArchetypeGraph,
    directory: EntityDirectory,
    recycled: VecDeque<RecycledEntity>,
    size: EntityCount,
    capacity: EntityCount,
    query_cache: RwLock<QueryCache>,
    sink: Option<Box<dyn EventSink>>,
}

impl World {
    /// Creates an empty world tagged with `id`.
    pub fn new(id: WorldId) -> Self {
        Self::with_config(id, WorldConfig::default())
    }

    /// Creates an empty world with an explicit configuration.
    pub fn with_config(id: WorldId, config: WorldConfig) -> Self {
        Self {
            id,
            graph: ArchetypeGraph::new(config.chunk_bytes),
            directory: EntityDirectory::new(),
            recycled: VecDeque::new(),
            size: 0,
            capacity: 0,
            query_cache: RwLock::new(QueryCache::default()),
            sink: config.sink,
        }
    }

    /// The caller-chosen tag carried by every entity of this world.
    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// Number of live entities.
    #[inline]
    pub fn size(&self) -> EntityCount {
        self.size
    }

    /// Total chunk rows allocated across all archetypes.
    #[inline]
    pub fn capacity(&self) -> EntityCount {
        self.capacity
    }

    /// Number of archetypes currently in the graph.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.graph.len()
    }

    /// All archetypes in creation order.
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        self.graph.archetypes()
    }

    /// Borrow of archetype `id`.
    #[inline]
    pub fn archetype(&self, id: ArchetypeId) -> &Archetype {
        self.graph.get(id)
    }

    // ── liveness and lookup ─────────────────────────────────────────────

    /// Returns `true` if `entity` is currently alive in this world.
    pub fn contains(&self, entity: Entity) -> bool {
        entity.world == self.id && self.directory.is_current(entity.id)
    }

    /// Version-validated reference to a live entity, or `None` when dead.
    pub fn reference(&self, entity: Entity) -> Option<EntityReference> {
        if !self.contains(entity) {
            return None;
        }
        Some(EntityReference {
            entity,
            version: self.directory.get_version(entity.id),
        })
    }

    /// Returns `true` iff the referenced entity is still the same
    /// incarnation: alive with a matching directory version.
    pub fn is_alive(&self, reference: EntityReference) -> bool {
        reference.entity.world == self.id
            && self
                .directory
                .is_alive(reference.entity.id, reference.version)
    }

    /// Current directory version for `entity`'s id, if the slot was ever
    /// backed.
    pub fn version(&self, entity: Entity) -> Option<Version> {
        (entity.world == self.id)
            .then(|| self.directory.try_get_version(entity.id))
            .flatten()
    }

    /// Read-only storage location of a live entity.
    ///
    /// This is the lookup external collaborators (command buffers) use; it
    /// never mutates.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        if entity.world != self.id {
            return None;
        }
        self.directory.get_slot(entity.id)
    }

    fn live_slot(&self, entity: Entity) -> EcsResult<EntityLocation> {
        self.location(entity)
            .ok_or_else(|| PreconditionViolation::DeadEntity { entity }.into())
    }

    // ── entity creation and destruction ─────────────────────────────────

    fn allocate_id(&mut self) -> EcsResult<(EntityId, Version)> {
        if let Some(recycled) = self.recycled.pop_front() {
            return Ok((recycled.id, recycled.version));
        }
        if self.size == EntityId::MAX {
            return Err(CapacityError {
                entities_needed: self.size as u64 + 1,
                capacity: EntityId::MAX as u64,
            }
            .into());
        }
        Ok((self.size as EntityId, 1))
    }

    fn restore_id(&mut self, id: EntityId, version: Version) {
        // Undo of allocate_id on a failed create: fresh ids were never
        // consumed, recycled ones go back to the front of the queue.
        if version != 1 || (id as usize) < self.size as usize {
            self.recycled.push_front(RecycledEntity { id, version });
        }
    }

    /// Creates an entity whose components are exactly `signature`, all at
    /// their default state.
    ///
    /// Recycles a freed id when one is queued, otherwise issues `size` as the
    /// id with version 1.
    pub fn create(&mut self, signature: &Signature) -> EcsResult<Entity> {
        let (archetype_id, created) = self.graph.get_or_create(signature)?;
        if created {
            self.capacity += self.graph.get(archetype_id).entities_per_chunk() as EntityCount;
        }

        let (id, version) = self.allocate_id()?;
        let archetype = self.graph.get_mut(archetype_id);
        let (chunk, row, created_chunk) = archetype.add(id);
        archetype.default_init_row(chunk, row);
        if created_chunk {
            self.capacity += self.graph.get(archetype_id).entities_per_chunk() as EntityCount;
        }
        self.directory.ensure_capacity(self.capacity as usize);
        self.directory.add(
            id,
            version,
            EntityLocation {
                archetype: archetype_id,
                chunk,
                row,
            },
        );
        self.size += 1;

        let entity = Entity::new(id, self.id);
        if let Some(sink) = &self.sink {
            sink.on_entity_created(entity);
        }
        Ok(entity)
    }

    /// Creates an entity from a runtime component list.
    ///
    /// The set is assembled in stack storage and resolved against the graph
    /// without allocating when the archetype already exists.
    pub fn create_from(&mut self, components: &[ComponentId]) -> EcsResult<Entity> {
        let mut words = [0u64; SIGNATURE_WORDS];
        let span = SpanBitSet::from_components(&mut words, components);
        let signature = match self.graph.lookup_span(&span) {
            Some(id) => *self.graph.get(id).signature(),
            None => span.to_signature(),
        };
        self.create(&signature)
    }

    /// Creates an entity carrying the values of `bundle`; components in the
    /// bundle's signature without a value are default-initialized.
    pub fn create_with(&mut self, mut bundle: Bundle) -> EcsResult<Entity> {
        let signature = bundle.signature();
        let (archetype_id, created) = self.graph.get_or_create(&signature)?;
        if created {
            self.capacity += self.graph.get(archetype_id).entities_per_chunk() as EntityCount;
        }

        let (id, version) = self.allocate_id()?;
        let (chunk, row, created_chunk) = self.graph.get_mut(archetype_id).add(id);
        if created_chunk {
            self.capacity += self.graph.get(archetype_id).entities_per_chunk() as EntityCount;
        }
        self.directory.ensure_capacity(self.capacity as usize);

        let archetype = self.graph.get_mut(archetype_id);
        let columns = archetype.layout().infos().len();
        let mut mismatch = false;
        for column in 0..columns {
            let component = archetype.layout().infos()[column].component_id;
            match bundle.take(component) {
                Some(value) => {
                    if !archetype.write_boxed(chunk, row, column, value) {
                        // Keep the row fully initialized so teardown is
                        // uniform.
                        archetype.default_init_component(chunk, row, column);
                        mismatch = true;
                    }
                }
                None => archetype.default_init_component(chunk, row, column),
            }
        }

        if mismatch {
            archetype.drop_row(chunk, row);
            let moved = archetype.remove(chunk, row);
            debug_assert!(moved.is_none());
            self.restore_id(id, version);
            return Err(EcsError::Internal("bundle value does not match component type"));
        }

        self.directory.add(
            id,
            version,
            EntityLocation {
                archetype: archetype_id,
                chunk,
                row,
            },
        );
        self.size += 1;

        let entity = Entity::new(id, self.id);
        if let Some(sink) = &self.sink {
            sink.on_entity_created(entity);
        }
        Ok(entity)
    }

    /// Destroys a live entity, enqueueing its id for recycling with an
    /// incremented version.
    pub fn destroy(&mut self, entity: Entity) -> EcsResult<()> {
        let slot = self.live_slot(entity)?;

        if let Some(sink) = &self.sink {
            sink.on_entity_destroyed(entity);
        }

        let archetype = self.graph.get_mut(slot.archetype);
        archetype.drop_row(slot.chunk, slot.row);
        let moved = archetype.remove(slot.chunk, slot.row);
        if let Some(moved_id) = moved {
            self.directory.move_row(moved_id, slot.chunk, slot.row);
        }

        let version = self.directory.get_version(entity.id);
        self.directory.remove(entity.id);
        self.recycled.push_back(RecycledEntity {
            id: entity.id,
            version: version.wrapping_add(1),
        });
        self.size -= 1;
        Ok(())
    }

    // ── per-entity component operations ─────────────────────────────────

    /// Moves `entity` from its current archetype to `dst_id`, relocating
    /// shared components and fixing the directory for both the moved entity
    /// and any entity swapped into its old row.
    fn move_entity(
        &mut self,
        entity: Entity,
        src_slot: EntityLocation,
        dst_id: ArchetypeId,
        skip_default: Option<ComponentId>,
    ) -> EcsResult<EntityLocation> {
        let src_id = src_slot.archetype;
        if src_id == dst_id {
            return Err(PreconditionViolation::SameSignature.into());
        }

        let (src, dst) = self.graph.pair_mut(src_id, dst_id);
        let (chunk, row, created_chunk) = dst.add(entity.id);
        move_row_components(src, src_slot.chunk, src_slot.row, dst, chunk, row, skip_default);
        let moved = src.remove(src_slot.chunk, src_slot.row);
        let dst_rows = dst.entities_per_chunk() as EntityCount;

        if created_chunk {
            self.capacity += dst_rows;
            self.directory.ensure_capacity(self.capacity as usize);
        }

        let location = EntityLocation {
            archetype: dst_id,
            chunk,
            row,
        };
        self.directory.move_to(entity.id, location);
        if let Some(moved_id) = moved {
            self.directory.move_row(moved_id, src_slot.chunk, src_slot.row);
        }
        trace!("{} moved archetype {} -> {}", entity, src_id, dst_id);
        Ok(location)
    }

    /// Shared front half of every add: precondition checks, destination
    /// resolution through the edge cache, and the row move with the new
    /// component's slot left for the caller to initialize.
    fn add_move(
        &mut self,
        entity: Entity,
        component: ComponentId,
    ) -> EcsResult<(EntityLocation, usize)> {
        let slot = self.live_slot(entity)?;
        if self.graph.get(slot.archetype).has(component) {
            return Err(PreconditionViolation::ComponentPresent { entity, component }.into());
        }

        let (dst_id, created) = self.graph.transition_add(slot.archetype, component)?;
        if created {
            self.capacity += self.graph.get(dst_id).entities_per_chunk() as EntityCount;
        }

        let location = self.move_entity(entity, slot, dst_id, Some(component))?;
        let column = self
            .graph
            .get(dst_id)
            .column_of(component)
            .ok_or(EcsError::Internal("transition target lacks component column"))?;
        Ok((location, column))
    }

    /// Adds component `T` at its default state.
    ///
    /// ## Errors
    /// `ComponentPresent` when the entity already has `T`; `DeadEntity` for a
    /// stale handle.
    pub fn add<T: Component>(&mut self, entity: Entity) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        self.add_by_id(entity, component)
    }

    /// Adds component `T` carrying `value`.
    pub fn add_with<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        let (location, column) = self.add_move(entity, component)?;
        self.graph
            .get_mut(location.archetype)
            .write_value(location.chunk, location.row, column, value);
        if let Some(sink) = &self.sink {
            sink.on_component_added(entity, component);
        }
        Ok(())
    }

    /// Runtime-id form of [`add`](Self::add): the new component is
    /// default-constructed.
    pub fn add_by_id(&mut self, entity: Entity, component: ComponentId) -> EcsResult<()> {
        let (location, column) = self.add_move(entity, component)?;
        self.graph
            .get_mut(location.archetype)
            .default_init_component(location.chunk, location.row, column);
        if let Some(sink) = &self.sink {
            sink.on_component_added(entity, component);
        }
        Ok(())
    }

    /// Runtime-id add carrying a type-erased value. Used by command-buffer
    /// playback.
    pub fn add_boxed(
        &mut self,
        entity: Entity,
        component: ComponentId,
        value: Box<dyn Any + Send>,
    ) -> EcsResult<()> {
        let (location, column) = self.add_move(entity, component)?;
        let archetype = self.graph.get_mut(location.archetype);
        if !archetype.write_boxed(location.chunk, location.row, column, value) {
            archetype.default_init_component(location.chunk, location.row, column);
            return Err(EcsError::Internal("boxed value does not match component type"));
        }
        if let Some(sink) = &self.sink {
            sink.on_component_added(entity, component);
        }
        Ok(())
    }

    /// Removes component `T`; its value is dropped with the move.
    ///
    /// ## Errors
    /// `ComponentAbsent` when the entity does not have `T`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        self.remove_by_id(entity, component)
    }

    /// Runtime-id form of [`remove`](Self::remove).
    pub fn remove_by_id(&mut self, entity: Entity, component: ComponentId) -> EcsResult<()> {
        let slot = self.live_slot(entity)?;
        if !self.graph.get(slot.archetype).has(component) {
            return Err(PreconditionViolation::ComponentAbsent { entity, component }.into());
        }

        let (dst_id, created) = self.graph.transition_remove(slot.archetype, component)?;
        if created {
            self.capacity += self.graph.get(dst_id).entities_per_chunk() as EntityCount;
        }
        self.move_entity(entity, slot, dst_id, None)?;
        if let Some(sink) = &self.sink {
            sink.on_component_removed(entity, component);
        }
        Ok(())
    }

    /// Overwrites the `T` of a live entity in place.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        let slot = self.live_slot(entity)?;
        match self
            .graph
            .get_mut(slot.archetype)
            .get_mut::<T>(component, slot.chunk, slot.row)
        {
            Some(place) => *place = value,
            None => {
                return Err(PreconditionViolation::ComponentAbsent { entity, component }.into())
            }
        }
        if let Some(sink) = &self.sink {
            sink.on_component_set(entity, component);
        }
        Ok(())
    }

    /// Runtime-id set carrying a type-erased value. The previous value is
    /// dropped before the write. Used by command-buffer playback.
    pub fn set_boxed(
        &mut self,
        entity: Entity,
        component: ComponentId,
        value: Box<dyn Any + Send>,
    ) -> EcsResult<()> {
        let slot = self.live_slot(entity)?;
        let archetype = self.graph.get_mut(slot.archetype);
        let Some(column) = archetype.column_of(component) else {
            return Err(PreconditionViolation::ComponentAbsent { entity, component }.into());
        };
        archetype.drop_component_at(slot.chunk, slot.row, column);
        if !archetype.write_boxed(slot.chunk, slot.row, column, value) {
            archetype.default_init_component(slot.chunk, slot.row, column);
            return Err(EcsError::Internal("boxed value does not match component type"));
        }
        if let Some(sink) = &self.sink {
            sink.on_component_set(entity, component);
        }
        Ok(())
    }

    /// Borrow of the `T` of a live entity.
    pub fn get<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        let component = component_id_of::<T>()?;
        let slot = self.live_slot(entity)?;
        self.graph
            .get(slot.archetype)
            .get::<T>(component, slot.chunk, slot.row)
            .ok_or_else(|| PreconditionViolation::ComponentAbsent { entity, component }.into())
    }

    /// Mutable borrow of the `T` of a live entity.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        let component = component_id_of::<T>()?;
        let slot = self.live_slot(entity)?;
        self.graph
            .get_mut(slot.archetype)
            .get_mut::<T>(component, slot.chunk, slot.row)
            .ok_or_else(|| PreconditionViolation::ComponentAbsent { entity, component }.into())
    }

    /// Returns `true` if a live `entity` has component `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let component = component_id_of::<T>()?;
        let slot = self.live_slot(entity)?;
        Ok(self.graph.get(slot.archetype).has(component))
    }

    // ── queries ─────────────────────────────────────────────────────────

    fn matching_archetypes(&self, description: &QueryDescription) -> Vec<ArchetypeId> {
        let generation = self.graph.generation();
        if let Ok(cache) = self.query_cache.read() {
            if let Some(archetypes) = cache.get_fresh(description, generation) {
                return archetypes;
            }
        }
        let archetypes = query::scan(&self.graph, description);
        if let Ok(mut cache) = self.query_cache.write() {
            cache.insert(*description, archetypes.clone(), generation);
        }
        archetypes
    }

    /// Resolves `description` against the current archetype set.
    ///
    /// The returned query borrows the world shared; structural changes are
    /// excluded for its lifetime.
    pub fn query(&self, description: &QueryDescription) -> Query<'_> {
        Query::new(&self.graph, self.id, self.matching_archetypes(description))
    }

    /// Runs `f` over every used chunk matched by `description`.
    pub fn for_each_chunk(&self, description: &QueryDescription, mut f: impl FnMut(ChunkView<'_>)) {
        let query = self.query(description);
        for view in query.chunks() {
            f(view);
        }
    }

    /// Runs `f` over every used chunk matched by `description` in parallel.
    ///
    /// Chunks are disjoint, so `f` may write columns through the view. The
    /// exclusive receiver keeps any other access off the world while the
    /// fan-out runs.
    pub fn par_for_each_chunk(
        &mut self,
        description: &QueryDescription,
        f: impl Fn(ChunkView<'_>) + Send + Sync,
    ) {
        let archetypes = self.matching_archetypes(description);
        let graph = &self.graph;
        let views: Vec<ChunkView<'_>> = archetypes
            .iter()
            .flat_map(|&id| {
                let archetype = graph.get(id);
                (0..archetype.chunk_count()).map(move |chunk| ChunkView::new(archetype, chunk))
            })
            .filter(|view| !view.is_empty())
            .collect();
        views.into_par_iter().for_each(f);
    }

    // ── bulk structural operations ──────────────────────────────────────

    /// Destroys every entity matched by `description`, archetype at a time.
    ///
    /// Returns the number destroyed. Equivalent in post-state to destroying
    /// each matched entity individually.
    pub fn destroy_matching(&mut self, description: &QueryDescription) -> EcsResult<usize> {
        let targets = self.matching_archetypes(description);
        let mut destroyed = 0usize;

        for id in targets {
            let archetype = self.graph.get(id);
            if archetype.is_empty() {
                continue;
            }
            let ids: Vec<EntityId> = (0..archetype.chunk_count())
                .flat_map(|chunk| archetype.chunk_entities(chunk).iter().copied())
                .collect();

            if let Some(sink) = &self.sink {
                for &entity_id in &ids {
                    sink.on_entity_destroyed(Entity::new(entity_id, self.id));
                }
            }

            self.graph.get_mut(id).clear_dropping();
            for &entity_id in &ids {
                let version = self.directory.get_version(entity_id);
                self.directory.remove(entity_id);
                self.recycled.push_back(RecycledEntity {
                    id: entity_id,
                    version: version.wrapping_add(1),
                });
            }
            destroyed += ids.len();
            self.size -= ids.len() as EntityCount;
        }
        Ok(destroyed)
    }

    /// Moves all rows of `src_id` to the tail of `dst_id` by whole-column
    /// copies, then updates the directory for the moved range. Returns the
    /// moved entity ids in order.
    fn bulk_transfer(
        &mut self,
        src_id: ArchetypeId,
        dst_id: ArchetypeId,
        default_component: Option<ComponentId>,
    ) -> Vec<EntityId> {
        let moving = self.graph.get(src_id).len();
        let needed = self.graph.get(dst_id).len() + moving;
        let added = self.graph.get_mut(dst_id).reserve(needed);
        let dst_rows = self.graph.get(dst_id).entities_per_chunk();
        if added > 0 {
            self.capacity += (added * dst_rows) as EntityCount;
            self.directory.ensure_capacity(self.capacity as usize);
        }

        let dst_start = self.graph.get(dst_id).len();
        {
            let (src, dst) = self.graph.pair_mut(src_id, dst_id);
            bulk_move_rows(src, dst, default_component);
            src.reset_counts();
        }

        let dst = self.graph.get(dst_id);
        let mut ids = Vec::with_capacity(moving);
        for offset in 0..moving {
            let global = dst_start + offset;
            let chunk = (global / dst_rows) as ChunkIndex;
            let row = (global % dst_rows) as RowIndex;
            let entity_id = dst.chunk_entities(chunk as usize)[row as usize];
            ids.push(entity_id);
            self.directory.move_to(
                entity_id,
                EntityLocation {
                    archetype: dst_id,
                    chunk,
                    row,
                },
            );
        }
        ids
    }

    /// Adds component `T` (default state) to every entity matched by
    /// `description`, archetype at a time, without per-entity indirection.
    ///
    /// Archetypes already containing `T` are skipped. Returns the number of
    /// entities changed. The event sink is notified once per affected
    /// archetype.
    pub fn add_matching<T: Component>(&mut self, description: &QueryDescription) -> EcsResult<usize> {
        let component = component_id_of::<T>()?;
        let targets = self.matching_archetypes(description);
        let mut changed = 0usize;

        for src_id in targets {
            {
                let src = self.graph.get(src_id);
                if src.is_empty() || src.has(component) {
                    continue;
                }
            }
            let (dst_id, created) = self.graph.transition_add(src_id, component)?;
            if created {
                self.capacity += self.graph.get(dst_id).entities_per_chunk() as EntityCount;
            }

            let ids = self.bulk_transfer(src_id, dst_id, Some(component));
            changed += ids.len();
            if let Some(sink) = &self.sink {
                sink.on_component_added_many(self.id, component, &ids);
            }
        }
        Ok(changed)
    }

    /// Removes component `T` from every entity matched by `description`,
    /// archetype at a time; the removed values are dropped.
    ///
    /// Archetypes not containing `T` are skipped. Returns the number of
    /// entities changed.
    pub fn remove_matching<T: Component>(
        &mut self,
        description: &QueryDescription,
    ) -> EcsResult<usize> {
        let component = component_id_of::<T>()?;
        let targets = self.matching_archetypes(description);
        let mut changed = 0usize;

        for src_id in targets {
            {
                let src = self.graph.get(src_id);
                if src.is_empty() || !src.has(component) {
                    continue;
                }
            }
            let (dst_id, created) = self.graph.transition_remove(src_id, component)?;
            if created {
                self.capacity += self.graph.get(dst_id).entities_per_chunk() as EntityCount;
            }

            self.graph.get_mut(src_id).drop_column_values(component);
            let ids = self.bulk_transfer(src_id, dst_id, None);
            changed += ids.len();
            if let Some(sink) = &self.sink {
                sink.on_component_removed_many(self.id, component, &ids);
            }
        }
        Ok(changed)
    }

    /// Overwrites the `T` of every entity matched by `description` with
    /// clones of `value`. Archetypes without `T` are skipped.
    pub fn set_matching<T: Component + Clone>(
        &mut self,
        description: &QueryDescription,
        value: T,
    ) -> EcsResult<usize> {
        let component = component_id_of::<T>()?;
        let targets = self.matching_archetypes(description);
        let mut changed = 0usize;

        for id in targets {
            {
                let archetype = self.graph.get_mut(id);
                if archetype.is_empty() || !archetype.has(component) {
                    continue;
                }
                for chunk in 0..archetype.chunk_count() {
                    if let Some(column) = archetype.column_slice_mut::<T>(component, chunk) {
                        for slot in column {
                            *slot = value.clone();
                        }
                    }
                }
            }

            let archetype = self.graph.get(id);
            changed += archetype.len();
            if let Some(sink) = &self.sink {
                let ids: Vec<EntityId> = (0..archetype.chunk_count())
                    .flat_map(|chunk| archetype.chunk_entities(chunk).iter().copied())
                    .collect();
                sink.on_component_set_many(self.id, component, &ids);
            }
        }
        Ok(changed)
    }

    // ── capacity management ─────────────────────────────────────────────

    /// Pre-allocates chunk space so the archetype for `signature` can hold
    /// `additional` more entities without allocating during creation.
    pub fn reserve(&mut self, signature: &Signature, additional: usize) -> EcsResult<()> {
        let (id, created) = self.graph.get_or_create(signature)?;
        if created {
            self.capacity += self.graph.get(id).entities_per_chunk() as EntityCount;
        }
        let archetype = self.graph.get_mut(id);
        let needed = archetype.len() + additional;
        let added = archetype.reserve(needed);
        let rows = archetype.entities_per_chunk();
        if added > 0 {
            self.capacity += (added * rows) as EntityCount;
            self.directory.ensure_capacity(self.capacity as usize);
        }
        Ok(())
    }

    /// Releases unused storage: destroys empty archetypes, trims trailing
    /// spare chunks to one per survivor, re-sums capacity, and purges
    /// recycled ids that the shrunken capacity can no longer back.
    ///
    /// Idempotent when no structural change happens between calls.
    pub fn trim_excess(&mut self) {
        if let Some(remap) = self.graph.destroy_empty() {
            self.directory.remap_archetypes(&remap);
        }
        for archetype in self.graph.archetypes_mut() {
            archetype.trim_excess();
        }

        self.capacity = self
            .graph
            .archetypes()
            .iter()
            .map(|archetype| archetype.chunk_count() * archetype.entities_per_chunk())
            .sum::<usize>() as EntityCount;

        let capacity = self.capacity;
        self.recycled
            .retain(|recycled| (recycled.id as u64) < capacity as u64);
        debug!(
            "trim: {} archetypes, capacity {}, {} recycled ids",
            self.graph.len(),
            self.capacity,
            self.recycled.len()
        );
    }

    /// Releases all archetypes and the directory, returning the world to its
    /// freshly constructed state.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.directory.reset();
        self.recycled.clear();
        self.size = 0;
        self.capacity = 0;
        if let Ok(mut cache) = self.query_cache.write() {
            cache.clear();
        }
    }
}
