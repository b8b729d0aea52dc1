//! # Archetype storage
//!
//! An archetype owns every entity whose component set is exactly its
//! signature. This module is responsible for:
//!
//! * owning the archetype's ordered chunk list and its shared column layout,
//! * packing new entities and unpacking removed ones with swap-remove,
//! * moving entity rows to sibling archetypes on structural change,
//! * caching add/remove transition edges.
//!
//! ## Packing model
//!
//! Entities are densely packed across chunks: every chunk before the last
//! used one is full, the last used chunk holds the remainder, and trailing
//! chunks (if any) are empty spares awaiting `trim_excess`. Removal fills the
//! hole with the archetype's overall last entity, which may cross a chunk
//! boundary; the id of the entity that moved is returned so the caller can
//! update the directory. This "moved entity" contract pervades the system.
//!
//! ## Safety model
//!
//! Component values live in raw chunk buffers. The archetype tracks which
//! rows are live and drives drop / default-construction through the
//! monomorphized function pointers captured at registration. Rows appended by
//! [`Archetype::add`] are uninitialized until the caller fills them; every
//! caller in this crate does so before the row can be observed.

use std::any::TypeId;
use std::collections::HashMap;

use crate::bitset::Signature;
use crate::chunk::{Chunk, ChunkLayout};
use crate::registry::ComponentInfo;
use crate::types::{ArchetypeId, ChunkIndex, ComponentId, EntityId, RowIndex};

/// Stores entities that share an identical component signature.
///
/// ## Invariants
/// - All component columns of a chunk have identical row counts.
/// - `len` equals the sum of chunk counts; chunk `i` holds
///   `min(capacity, len - i * capacity)` rows (clamped at zero).
/// - The signature exactly reflects the columns in the layout.
pub struct Archetype {
    id: ArchetypeId,
    signature: Signature,
    layout: ChunkLayout,
    chunks: Vec<Chunk>,
    len: usize,
    edges_add: HashMap<ComponentId, ArchetypeId>,
    edges_remove: HashMap<ComponentId, ArchetypeId>,
}

impl Archetype {
    /// Creates an archetype for `signature` with its first chunk allocated.
    ///
    /// `infos` must be the registry descriptors of exactly the signature's
    /// components, sorted by ascending id. `chunk_bytes` is the configured
    /// chunk byte budget from which `entities_per_chunk` is derived.
    pub(crate) fn new(
        id: ArchetypeId,
        signature: Signature,
        infos: Vec<ComponentInfo>,
        chunk_bytes: usize,
    ) -> Self {
        let layout = ChunkLayout::new(infos, chunk_bytes);
        let first = Chunk::new(&layout);
        Self {
            id,
            signature,
            layout,
            chunks: vec![first],
            len: 0,
            edges_add: HashMap::new(),
            edges_remove: HashMap::new(),
        }
    }

    /// Identifier of this archetype within the world's archetype list.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ArchetypeId) {
        self.id = id;
    }

    /// The component set that defines this archetype.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of live entities stored here.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rows per chunk (`N`), fixed at construction.
    #[inline]
    pub fn entities_per_chunk(&self) -> usize {
        self.layout.capacity()
    }

    /// Number of allocated chunks, including empty spares.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Column layout shared by this archetype's chunks.
    #[inline]
    pub(crate) fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Borrow of chunk `index`.
    #[inline]
    pub fn chunk(&self, index: usize) -> &Chunk {
        &self.chunks[index]
    }

    /// Live entity ids of chunk `index`.
    #[inline]
    pub fn chunk_entities(&self, index: usize) -> &[EntityId] {
        self.chunks[index].entity_ids(&self.layout)
    }

    /// Returns `true` if this archetype contains `component_id`.
    #[inline]
    pub fn has(&self, component_id: ComponentId) -> bool {
        self.signature.test(component_id)
    }

    // ── packing ─────────────────────────────────────────────────────────

    /// Places `entity_id` in the last used chunk, allocating a new chunk when
    /// it is full. Component columns of the new row are uninitialized; the
    /// caller fills them before the row becomes observable.
    ///
    /// Returns the row's location and whether a chunk was allocated, so the
    /// world can grow its capacity accounting and the directory.
    pub(crate) fn add(&mut self, entity_id: EntityId) -> (ChunkIndex, RowIndex, bool) {
        let capacity = self.layout.capacity();
        let target = self.len / capacity;
        let created = target == self.chunks.len();
        if created {
            self.chunks.push(Chunk::new(&self.layout));
        }
        debug_assert_eq!(self.chunks[target].count(), self.len % capacity);
        let row = self.chunks[target].push(&self.layout, entity_id);
        self.len += 1;
        (target as ChunkIndex, row, created)
    }

    /// Removes the row at `(chunk, row)`, backfilling the hole with the
    /// archetype's overall last entity.
    ///
    /// The removed row's component values must already have been dropped or
    /// moved out. Returns the id of the entity that was relocated into the
    /// hole (whose directory slot the caller must fix), or `None` when the
    /// removed row was the last one.
    pub(crate) fn remove(&mut self, chunk: ChunkIndex, row: RowIndex) -> Option<EntityId> {
        debug_assert!(self.len > 0);
        let capacity = self.layout.capacity();
        let chunk = chunk as usize;
        let row = row as usize;
        let last_chunk = (self.len - 1) / capacity;
        let last_row = (self.len - 1) % capacity;

        let moved = if chunk == last_chunk {
            self.chunks[chunk].swap_remove(&self.layout, row)
        } else {
            // The hole is in an earlier chunk: the last entity of the last
            // used chunk backfills it across the chunk boundary.
            let (head, tail) = self.chunks.split_at_mut(last_chunk);
            let hole = &mut head[chunk];
            let donor = &mut tail[0];

            for (column, info) in self.layout.infos().iter().enumerate() {
                if info.size == 0 {
                    continue;
                }
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        donor.element_ptr(&self.layout, column, last_row),
                        hole.element_ptr(&self.layout, column, row),
                        info.size,
                    );
                }
            }
            let moved_id = donor.entity_id_at(&self.layout, last_row);
            hole.set_entity_id(&self.layout, row, moved_id);
            let none = donor.swap_remove(&self.layout, last_row);
            debug_assert!(none.is_none());
            Some(moved_id)
        };

        self.len -= 1;
        moved
    }

    /// Grows the chunk list so `chunks * N >= n`. Returns the number of
    /// chunks allocated.
    pub(crate) fn reserve(&mut self, n: usize) -> usize {
        let capacity = self.layout.capacity();
        let needed = n.div_ceil(capacity);
        let mut added = 0;
        while self.chunks.len() < needed {
            self.chunks.push(Chunk::new(&self.layout));
            added += 1;
        }
        added
    }

    /// Releases trailing empty chunks, keeping one spare. Returns the number
    /// of chunks freed.
    pub(crate) fn trim_excess(&mut self) -> usize {
        let capacity = self.layout.capacity();
        let used = self.len.div_ceil(capacity).max(1);
        let keep = if self.chunks.len() > used { used + 1 } else { used };
        let freed = self.chunks.len().saturating_sub(keep);
        self.chunks.truncate(keep);
        freed
    }

    /// Marks every chunk empty without dropping component values.
    ///
    /// Used by bulk operations after the values have been moved out
    /// wholesale.
    pub(crate) fn reset_counts(&mut self) {
        for chunk in &mut self.chunks {
            chunk.clear();
        }
        self.len = 0;
    }

    /// Rewrites `len` and every chunk count after a bulk append wrote rows in
    /// place.
    pub(crate) fn set_len_and_counts(&mut self, len: usize) {
        let capacity = self.layout.capacity();
        debug_assert!(len <= self.chunks.len() * capacity);
        self.len = len;
        for (index, chunk) in self.chunks.iter_mut().enumerate() {
            chunk.set_count(len.saturating_sub(index * capacity).min(capacity));
        }
    }

    /// Drops every live value of component `component_id`.
    ///
    /// Used by bulk remove before the surviving columns are moved out.
    pub(crate) fn drop_column_values(&mut self, component_id: ComponentId) {
        let Some(column) = self.layout.column_of(component_id) else {
            return;
        };
        let Some(drop_fn) = self.layout.infos()[column].drop_fn else {
            return;
        };
        for chunk in &self.chunks {
            for row in 0..chunk.count() {
                unsafe { drop_fn(chunk.element_ptr(&self.layout, column, row)) };
            }
        }
    }

    /// Drops every live component value and marks all chunks empty.
    pub(crate) fn clear_dropping(&mut self) {
        for chunk in &self.chunks {
            let rows = chunk.count();
            for (column, info) in self.layout.infos().iter().enumerate() {
                let Some(drop_fn) = info.drop_fn else { continue };
                for row in 0..rows {
                    unsafe { drop_fn(chunk.element_ptr(&self.layout, column, row)) };
                }
            }
        }
        self.reset_counts();
    }

    // ── row initialization and teardown ─────────────────────────────────

    /// Default-constructs every component of the row at `(chunk, row)`.
    pub(crate) fn default_init_row(&mut self, chunk: ChunkIndex, row: RowIndex) {
        let chunk = &self.chunks[chunk as usize];
        for (column, info) in self.layout.infos().iter().enumerate() {
            unsafe { (info.default_fn)(chunk.element_ptr(&self.layout, column, row as usize)) };
        }
    }

    /// Default-constructs the single component `column` of the row at
    /// `(chunk, row)`, which must be uninitialized.
    pub(crate) fn default_init_component(&mut self, chunk: ChunkIndex, row: RowIndex, column: usize) {
        let info = &self.layout.infos()[column];
        let chunk = &self.chunks[chunk as usize];
        unsafe { (info.default_fn)(chunk.element_ptr(&self.layout, column, row as usize)) };
    }

    /// Drops every component value of the row at `(chunk, row)`.
    pub(crate) fn drop_row(&mut self, chunk: ChunkIndex, row: RowIndex) {
        let chunk = &self.chunks[chunk as usize];
        for (column, info) in self.layout.infos().iter().enumerate() {
            if let Some(drop_fn) = info.drop_fn {
                unsafe { drop_fn(chunk.element_ptr(&self.layout, column, row as usize)) };
            }
        }
    }

    /// Drops the single component `column` of the row at `(chunk, row)`.
    pub(crate) fn drop_component_at(&mut self, chunk: ChunkIndex, row: RowIndex, column: usize) {
        let info = &self.layout.infos()[column];
        if let Some(drop_fn) = info.drop_fn {
            let chunk = &self.chunks[chunk as usize];
            unsafe { drop_fn(chunk.element_ptr(&self.layout, column, row as usize)) };
        }
    }

    /// Moves a type-erased boxed value into component `column` of the row at
    /// `(chunk, row)`, which must be uninitialized. Returns `false` on type
    /// mismatch, leaving the slot uninitialized.
    pub(crate) fn write_boxed(
        &mut self,
        chunk: ChunkIndex,
        row: RowIndex,
        column: usize,
        value: Box<dyn std::any::Any + Send>,
    ) -> bool {
        let info = &self.layout.infos()[column];
        let chunk = &self.chunks[chunk as usize];
        unsafe { (info.write_boxed_fn)(chunk.element_ptr(&self.layout, column, row as usize), value) }
    }

    /// Writes `value` into an uninitialized slot of component `T`.
    pub(crate) fn write_value<T: 'static>(
        &mut self,
        chunk: ChunkIndex,
        row: RowIndex,
        column: usize,
        value: T,
    ) {
        let info = &self.layout.infos()[column];
        debug_assert_eq!(info.type_id, TypeId::of::<T>());
        let chunk = &self.chunks[chunk as usize];
        unsafe {
            (chunk.element_ptr(&self.layout, column, row as usize) as *mut T).write(value);
        }
    }

    // ── typed access ────────────────────────────────────────────────────

    /// Index of `component_id` within this archetype's columns.
    #[inline]
    pub(crate) fn column_of(&self, component_id: ComponentId) -> Option<usize> {
        self.layout.column_of(component_id)
    }

    /// Live rows of component `T` in chunk `chunk_index`.
    ///
    /// Returns `None` when the component is absent or `T` does not match the
    /// registered type.
    pub fn column_slice<T: 'static>(
        &self,
        component_id: ComponentId,
        chunk_index: usize,
    ) -> Option<&[T]> {
        let column = self.layout.column_of(component_id)?;
        let info = &self.layout.infos()[column];
        if info.type_id != TypeId::of::<T>() {
            return None;
        }
        let chunk = self.chunks.get(chunk_index)?;
        let ptr = chunk.column_ptr(&self.layout, column) as *const T;
        Some(unsafe { std::slice::from_raw_parts(ptr, chunk.count()) })
    }

    /// Mutable live rows of component `T` in chunk `chunk_index`.
    pub fn column_slice_mut<T: 'static>(
        &mut self,
        component_id: ComponentId,
        chunk_index: usize,
    ) -> Option<&mut [T]> {
        let column = self.layout.column_of(component_id)?;
        let info = &self.layout.infos()[column];
        if info.type_id != TypeId::of::<T>() {
            return None;
        }
        let chunk = self.chunks.get(chunk_index)?;
        let ptr = chunk.column_ptr(&self.layout, column) as *mut T;
        Some(unsafe { std::slice::from_raw_parts_mut(ptr, chunk.count()) })
    }

    /// Borrow of the `T` stored for the row at `(chunk, row)`.
    pub(crate) fn get<T: 'static>(&self, component_id: ComponentId, chunk: ChunkIndex, row: RowIndex) -> Option<&T> {
        let column = self.layout.column_of(component_id)?;
        let info = &self.layout.infos()[column];
        if info.type_id != TypeId::of::<T>() {
            return None;
        }
        let chunk = self.chunks.get(chunk as usize)?;
        debug_assert!((row as usize) < chunk.count());
        Some(unsafe { &*(chunk.element_ptr(&self.layout, column, row as usize) as *const T) })
    }

    /// Mutable borrow of the `T` stored for the row at `(chunk, row)`.
    pub(crate) fn get_mut<T: 'static>(
        &mut self,
        component_id: ComponentId,
        chunk: ChunkIndex,
        row: RowIndex,
    ) -> Option<&mut T> {
        let column = self.layout.column_of(component_id)?;
        let info = &self.layout.infos()[column];
        if info.type_id != TypeId::of::<T>() {
            return None;
        }
        let chunk = self.chunks.get(chunk as usize)?;
        debug_assert!((row as usize) < chunk.count());
        Some(unsafe { &mut *(chunk.element_ptr(&self.layout, column, row as usize) as *mut T) })
    }

    // ── transition edges ────────────────────────────────────────────────

    /// Cached `+component` transition target, if resolved.
    #[inline]
    pub(crate) fn edge_add(&self, component_id: ComponentId) -> Option<ArchetypeId> {
        self.edges_add.get(&component_id).copied()
    }

    /// Cached `-component` transition target, if resolved.
    #[inline]
    pub(crate) fn edge_remove(&self, component_id: ComponentId) -> Option<ArchetypeId> {
        self.edges_remove.get(&component_id).copied()
    }

    pub(crate) fn cache_edge_add(&mut self, component_id: ComponentId, target: ArchetypeId) {
        self.edges_add.insert(component_id, target);
    }

    pub(crate) fn cache_edge_remove(&mut self, component_id: ComponentId, target: ArchetypeId) {
        self.edges_remove.insert(component_id, target);
    }

    /// Drops every cached edge. Used after archetype ids are remapped.
    pub(crate) fn clear_edges(&mut self) {
        self.edges_add.clear();
        self.edges_remove.clear();
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        self.clear_dropping();
    }
}

/// Moves the component row at `(src_chunk, src_row)` of `src` into the
/// uninitialized row at `(dst_chunk, dst_row)` of `dst`.
///
/// For each component common to both signatures the value is relocated by
/// byte copy. Components present only in the destination are
/// default-constructed, except `skip_default`, whose slot is left
/// uninitialized for the caller to fill immediately. Components present only
/// in the source are dropped. The source row is left logically dead and must
/// be removed with [`Archetype::remove`] afterwards (which will not drop it
/// again).
pub(crate) fn move_row_components(
    src: &mut Archetype,
    src_chunk: ChunkIndex,
    src_row: RowIndex,
    dst: &mut Archetype,
    dst_chunk: ChunkIndex,
    dst_row: RowIndex,
    skip_default: Option<ComponentId>,
) {
    let src_infos = src.layout.infos();
    let dst_infos = dst.layout.infos();
    let src_chunk_ref = &src.chunks[src_chunk as usize];
    let dst_chunk_ref = &dst.chunks[dst_chunk as usize];

    let mut s = 0;
    let mut d = 0;
    while s < src_infos.len() || d < dst_infos.len() {
        let src_id = src_infos.get(s).map(|info| info.component_id);
        let dst_id = dst_infos.get(d).map(|info| info.component_id);

        match (src_id, dst_id) {
            (Some(a), Some(b)) if a == b => {
                let size = src_infos[s].size;
                if size > 0 {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            src_chunk_ref.element_ptr(&src.layout, s, src_row as usize),
                            dst_chunk_ref.element_ptr(&dst.layout, d, dst_row as usize),
                            size,
                        );
                    }
                }
                s += 1;
                d += 1;
            }
            (Some(a), Some(b)) if a < b => {
                // Source-only component: dropped with the move.
                if let Some(drop_fn) = src_infos[s].drop_fn {
                    unsafe { drop_fn(src_chunk_ref.element_ptr(&src.layout, s, src_row as usize)) };
                }
                s += 1;
            }
            (Some(_), None) => {
                if let Some(drop_fn) = src_infos[s].drop_fn {
                    unsafe { drop_fn(src_chunk_ref.element_ptr(&src.layout, s, src_row as usize)) };
                }
                s += 1;
            }
            _ => {
                // Destination-only component: default state unless the
                // caller supplies the value itself.
                if skip_default != Some(dst_infos[d].component_id) {
                    unsafe {
                        (dst_infos[d].default_fn)(
                            dst_chunk_ref.element_ptr(&dst.layout, d, dst_row as usize),
                        )
                    };
                }
                d += 1;
            }
        }
    }
}

/// Appends every row of `src` to the tail of `dst` by whole-column copies.
///
/// Columns present in both archetypes are relocated by byte copy in runs
/// bounded by chunk boundaries on either side. A column present only in the
/// destination must be `default_component` and is default-constructed for
/// every appended row. Columns present only in the source are **not**
/// touched; the caller drops their values beforehand.
///
/// `dst` must have been reserved for `dst.len() + src.len()` rows. The source
/// is left logically intact; the caller clears its counts afterwards (the
/// values have been moved out, so no drops run).
pub(crate) fn bulk_move_rows(
    src: &Archetype,
    dst: &mut Archetype,
    default_component: Option<ComponentId>,
) {
    let n = src.len();
    if n == 0 {
        return;
    }
    let src_capacity = src.layout.capacity();
    let dst_capacity = dst.layout.capacity();
    let dst_start = dst.len;
    debug_assert!(
        dst.chunks.len() * dst_capacity >= dst_start + n,
        "destination archetype not reserved for bulk append"
    );

    let mut moved = 0usize;
    while moved < n {
        let src_chunk_index = moved / src_capacity;
        let src_row = moved % src_capacity;
        let dst_global = dst_start + moved;
        let dst_chunk_index = dst_global / dst_capacity;
        let dst_row = dst_global % dst_capacity;
        let run = (src_capacity - src_row)
            .min(dst_capacity - dst_row)
            .min(n - moved);

        let src_chunk = &src.chunks[src_chunk_index];
        let dst_chunk = &dst.chunks[dst_chunk_index];

        for (dst_column, info) in dst.layout.infos().iter().enumerate() {
            match src.layout.column_of(info.component_id) {
                Some(src_column) => {
                    if info.size > 0 {
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                src_chunk.element_ptr(&src.layout, src_column, src_row),
                                dst_chunk.element_ptr(&dst.layout, dst_column, dst_row),
                                info.size * run,
                            );
                        }
                    }
                }
                None => {
                    debug_assert_eq!(Some(info.component_id), default_component);
                    for offset in 0..run {
                        unsafe {
                            (info.default_fn)(dst_chunk.element_ptr(
                                &dst.layout,
                                dst_column,
                                dst_row + offset,
                            ))
                        };
                    }
                }
            }
        }

        unsafe {
            std::ptr::copy_nonoverlapping(
                src_chunk.entity_ptr(&src.layout, src_row),
                dst_chunk.entity_ptr(&dst.layout, dst_row),
                run,
            );
        }

        moved += run;
    }

    dst.set_len_and_counts(dst_start + n);
}
