//! # Entity Directory
//!
//! The directory maps a live entity id to its storage location and
//! generation. It backs liveness checks, version-validated references, and
//! O(1) component lookup.
//!
//! ## Design
//! - Storage is dense and index-addressable: parallel vectors of locations,
//!   versions, and liveness flags, indexed by entity id.
//! - Versions are written when an id is (re)issued; destruction only marks
//!   the slot dead, deferring the increment to the recycling queue.
//!
//! ## Invariants
//! - `versions.len() == alive.len() == locations.len()`.
//! - If `alive[i]` is `true`, then `locations[i]` names the chunk row whose
//!   entity-id column stores `i`.
//! - Slot storage never shrinks; capacity growth is driven by the world's
//!   chunk accounting so ids always stay in bounds.

use crate::types::{ChunkIndex, EntityId, EntityLocation, RowIndex, Version};

/// Dense growable table of entity slots, indexed by entity id.
#[derive(Default)]
pub struct EntityDirectory {
    locations: Vec<EntityLocation>,
    versions: Vec<Version>,
    alive: Vec<bool>,
}

impl EntityDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots currently backed by storage.
    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns `true` if no slots are backed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Grows backing storage so ids `< n` are addressable.
    pub fn ensure_capacity(&mut self, n: usize) {
        if n <= self.versions.len() {
            return;
        }
        self.locations.resize(n, EntityLocation::default());
        self.versions.resize(n, 0);
        self.alive.resize(n, false);
    }

    /// Records a newly issued id with its generation and location.
    ///
    /// ## Invariants
    /// The slot must be backed (see [`ensure_capacity`](Self::ensure_capacity))
    /// and not currently alive.
    pub fn add(&mut self, id: EntityId, version: Version, location: EntityLocation) {
        let index = id as usize;
        debug_assert!(index < self.versions.len(), "directory slot not backed");
        debug_assert!(!self.alive[index], "directory slot already alive");
        self.locations[index] = location;
        self.versions[index] = version;
        self.alive[index] = true;
    }

    /// Returns the storage location of a live id.
    #[inline]
    pub fn get_slot(&self, id: EntityId) -> Option<EntityLocation> {
        let index = id as usize;
        if self.alive.get(index).copied().unwrap_or(false) {
            Some(self.locations[index])
        } else {
            None
        }
    }

    /// Current generation stored for `id`.
    ///
    /// ## Panics
    /// Debug-asserts that the slot is backed; release builds return 0 for
    /// out-of-range ids.
    #[inline]
    pub fn get_version(&self, id: EntityId) -> Version {
        debug_assert!((id as usize) < self.versions.len());
        self.versions.get(id as usize).copied().unwrap_or(0)
    }

    /// Current generation for `id`, or `None` when the slot was never backed.
    #[inline]
    pub fn try_get_version(&self, id: EntityId) -> Option<Version> {
        self.versions.get(id as usize).copied()
    }

    /// Returns `true` iff `id` is alive and its generation equals `version`.
    #[inline]
    pub fn is_alive(&self, id: EntityId, version: Version) -> bool {
        let index = id as usize;
        self.alive.get(index).copied().unwrap_or(false) && self.versions[index] == version
    }

    /// Returns `true` iff `id` is alive at any generation.
    #[inline]
    pub fn is_current(&self, id: EntityId) -> bool {
        self.alive.get(id as usize).copied().unwrap_or(false)
    }

    /// Rewrites the full location of a live id after an archetype move.
    #[inline]
    pub fn move_to(&mut self, id: EntityId, location: EntityLocation) {
        let index = id as usize;
        debug_assert!(self.alive.get(index).copied().unwrap_or(false));
        self.locations[index] = location;
    }

    /// Rewrites the chunk slot of a live id within its current archetype.
    #[inline]
    pub fn move_row(&mut self, id: EntityId, chunk: ChunkIndex, row: RowIndex) {
        let index = id as usize;
        debug_assert!(self.alive.get(index).copied().unwrap_or(false));
        self.locations[index].chunk = chunk;
        self.locations[index].row = row;
    }

    /// Marks `id` dead. The generation is left in place; it advances when the
    /// id is recycled.
    pub fn remove(&mut self, id: EntityId) {
        let index = id as usize;
        debug_assert!(self.alive.get(index).copied().unwrap_or(false));
        self.alive[index] = false;
        self.locations[index] = EntityLocation::default();
    }

    /// Rewrites the archetype id of every live slot after the archetype list
    /// was compacted. `remap[old]` is the surviving id, or `None` for a
    /// destroyed archetype (which can hold no live entities).
    pub(crate) fn remap_archetypes(&mut self, remap: &[Option<crate::types::ArchetypeId>]) {
        for index in 0..self.locations.len() {
            if !self.alive[index] {
                continue;
            }
            let old = self.locations[index].archetype as usize;
            debug_assert!(remap[old].is_some(), "live entity in destroyed archetype");
            if let Some(new) = remap.get(old).copied().flatten() {
                self.locations[index].archetype = new;
            }
        }
    }

    /// Drops every slot. Used by `World::clear`.
    pub fn reset(&mut self) {
        self.locations.clear();
        self.versions.clear();
        self.alive.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_tracks_version_and_flag() {
        let mut directory = EntityDirectory::new();
        directory.ensure_capacity(4);
        directory.add(2, 1, EntityLocation::default());

        assert!(directory.is_alive(2, 1));
        assert!(!directory.is_alive(2, 2));
        assert!(!directory.is_alive(3, 0));

        directory.remove(2);
        assert!(!directory.is_alive(2, 1));
        assert_eq!(directory.get_version(2), 1);

        directory.add(2, 2, EntityLocation::default());
        assert!(directory.is_alive(2, 2));
        assert!(!directory.is_alive(2, 1));
    }

    #[test]
    fn move_row_updates_slot_in_place() {
        let mut directory = EntityDirectory::new();
        directory.ensure_capacity(1);
        directory.add(
            0,
            1,
            EntityLocation {
                archetype: 3,
                chunk: 0,
                row: 7,
            },
        );
        directory.move_row(0, 1, 0);
        let slot = directory.get_slot(0).unwrap();
        assert_eq!((slot.archetype, slot.chunk, slot.row), (3, 1, 0));
    }
}
