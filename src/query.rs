//! # Query engine
//!
//! Queries select archetypes by a predicate over signatures and expose
//! iteration by archetype, by chunk, or by entity.
//!
//! ## Matching
//!
//! A [`QueryDescription`] carries four component sets. An archetype
//! signature `S` matches when:
//!
//! ```text
//! (All ⊆ S)
//! AND (Any = ∅ OR Any ∩ S ≠ ∅)
//! AND (None ∩ S = ∅)
//! AND (Exclusive = ∅ OR Exclusive = S)
//! ```
//!
//! ## Caching
//!
//! The world caches the archetype list per description, keyed by the
//! description's content. Entries record the archetype-graph generation they
//! were computed against and are re-scanned when stale, so an iteration that
//! starts after an archetype is created always observes it.
//!
//! ## Access discipline
//!
//! Chunk views hand out column slices directly; correctness of overlapping
//! access is enforced by construction and execution-phase discipline, not by
//! the borrow checker. A caller must not request the same column mutably
//! twice from one view, and no structural change may run while any view is
//! alive.

use std::collections::HashMap;

use crate::archetype::Archetype;
use crate::bitset::Signature;
use crate::graph::ArchetypeGraph;
use crate::types::{ArchetypeId, ComponentId, Entity, EntityId, WorldId};

/// Value-type description of a query: four component sets matched against
/// archetype signatures. Equality and hashing are by content, which makes the
/// description itself the cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct QueryDescription {
    /// Components an archetype must contain.
    pub all: Signature,

    /// Components of which an archetype must contain at least one, when
    /// non-empty.
    pub any: Signature,

    /// Components an archetype must not contain.
    pub none: Signature,

    /// Exact signature the archetype must equal, when non-empty.
    pub exclusive: Signature,
}

impl QueryDescription {
    /// An empty description; matches every archetype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds components to the **All** set.
    pub fn with_all(mut self, components: &[ComponentId]) -> Self {
        for &component in components {
            self.all.set(component);
        }
        self
    }

    /// Adds components to the **Any** set.
    pub fn with_any(mut self, components: &[ComponentId]) -> Self {
        for &component in components {
            self.any.set(component);
        }
        self
    }

    /// Adds components to the **None** set.
    pub fn with_none(mut self, components: &[ComponentId]) -> Self {
        for &component in components {
            self.none.set(component);
        }
        self
    }

    /// Sets the **Exclusive** signature.
    pub fn with_exclusive(mut self, components: &[ComponentId]) -> Self {
        for &component in components {
            self.exclusive.set(component);
        }
        self
    }

    /// Returns `true` if an archetype with `signature` satisfies this query.
    pub fn matches(&self, signature: &Signature) -> bool {
        signature.contains_all(&self.all)
            && (self.any.is_empty() || signature.intersects(&self.any))
            && !signature.intersects(&self.none)
            && (self.exclusive.is_empty() || *signature == self.exclusive)
    }
}

/// A cached archetype list plus the graph generation it was computed at.
pub(crate) struct CachedQuery {
    pub archetypes: Vec<ArchetypeId>,
    pub generation: u64,
}

/// Description-keyed cache of matching archetype lists.
///
/// This is the one structure touched by read-only iteration that structural
/// changes also mutate; the world guards it with a reader/writer latch.
#[derive(Default)]
pub(crate) struct QueryCache {
    entries: HashMap<QueryDescription, CachedQuery>,
}

impl QueryCache {
    /// Fresh archetype list for `description`, or `None` when absent/stale.
    pub fn get_fresh(
        &self,
        description: &QueryDescription,
        generation: u64,
    ) -> Option<Vec<ArchetypeId>> {
        let entry = self.entries.get(description)?;
        (entry.generation == generation).then(|| entry.archetypes.clone())
    }

    /// Stores the scan result for `description`.
    pub fn insert(
        &mut self,
        description: QueryDescription,
        archetypes: Vec<ArchetypeId>,
        generation: u64,
    ) {
        self.entries.insert(
            description,
            CachedQuery {
                archetypes,
                generation,
            },
        );
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Scans the graph for archetypes matching `description`.
pub(crate) fn scan(graph: &ArchetypeGraph, description: &QueryDescription) -> Vec<ArchetypeId> {
    graph
        .archetypes()
        .iter()
        .filter(|archetype| description.matches(archetype.signature()))
        .map(|archetype| archetype.id())
        .collect()
}

/// One chunk of one matched archetype, with typed column access.
///
/// The view borrows the archetype shared; mutable column access is handed out
/// under the module's access discipline (chunks are disjoint, a column is
/// requested mutably at most once per view).
#[derive(Clone, Copy)]
pub struct ChunkView<'a> {
    archetype: &'a Archetype,
    chunk_index: usize,
}

impl<'a> ChunkView<'a> {
    pub(crate) fn new(archetype: &'a Archetype, chunk_index: usize) -> Self {
        Self {
            archetype,
            chunk_index,
        }
    }

    /// The archetype this chunk belongs to.
    #[inline]
    pub fn archetype(&self) -> &'a Archetype {
        self.archetype
    }

    /// Number of live rows in this chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetype.chunk(self.chunk_index).count()
    }

    /// Returns `true` if the chunk holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entity ids of this chunk, parallel to every column.
    #[inline]
    pub fn entities(&self) -> &'a [EntityId] {
        self.archetype.chunk_entities(self.chunk_index)
    }

    /// Read-only column of component `T`.
    pub fn column<T: 'static>(&self, component_id: ComponentId) -> Option<&'a [T]> {
        self.archetype.column_slice::<T>(component_id, self.chunk_index)
    }

    /// Mutable column of component `T`.
    ///
    /// In-place writes through this slice do not alter archetype membership
    /// and are permitted during read-only iteration. The caller must not
    /// request the same column twice from one view.
    pub fn column_mut<T: 'static>(&self, component_id: ComponentId) -> Option<&'a mut [T]> {
        let column = self.archetype.column_of(component_id)?;
        let layout = self.archetype.layout();
        let info = &layout.infos()[column];
        if info.type_id != std::any::TypeId::of::<T>() {
            return None;
        }
        let chunk = self.archetype.chunk(self.chunk_index);
        let ptr = chunk.column_ptr(layout, column) as *mut T;
        // Chunk buffers are raw allocations reached through NonNull; the
        // shared archetype borrow does not assert uniqueness over them.
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, chunk.count()) })
    }
}

/// A resolved query: the matched archetypes of one world at one point in
/// time, plus iteration primitives over them.
///
/// Holding a `Query` borrows the world shared, so no structural change can
/// run while it is alive.
pub struct Query<'w> {
    graph: &'w ArchetypeGraph,
    world_id: WorldId,
    archetypes: Vec<ArchetypeId>,
}

impl<'w> Query<'w> {
    pub(crate) fn new(graph: &'w ArchetypeGraph, world_id: WorldId, archetypes: Vec<ArchetypeId>) -> Self {
        Self {
            graph,
            world_id,
            archetypes,
        }
    }

    /// Matched archetype ids, in graph order.
    #[inline]
    pub fn archetype_ids(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    /// Iterates over matched archetypes.
    pub fn archetypes(&self) -> impl Iterator<Item = &'w Archetype> + '_ {
        self.archetypes.iter().map(|&id| self.graph.get(id))
    }

    /// Iterates over every used chunk of every matched archetype.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkView<'w>> + '_ {
        self.archetypes().flat_map(|archetype| {
            (0..archetype.chunk_count())
                .map(move |chunk_index| ChunkView::new(archetype, chunk_index))
                .filter(|view| !view.is_empty())
        })
    }

    /// Iterates over every matched entity, one at a time.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        let world_id = self.world_id;
        self.chunks().flat_map(move |view| {
            view.entities()
                .iter()
                .map(move |&id| Entity::new(id, world_id))
        })
    }

    /// Total number of matched entities.
    pub fn count(&self) -> usize {
        self.archetypes().map(|archetype| archetype.len()).sum()
    }
}
