//! # Archetype graph
//!
//! A hash-keyed index from signature fingerprint to archetype, plus the
//! cached add/remove transition edges between neighboring archetypes.
//!
//! ## Design
//! - The map is keyed by the signature's content fingerprint. Fingerprints
//!   may collide, so every bucket hit re-checks signature equality; the hash
//!   is never trusted as identity.
//! - Edges are resolved lazily: the first `transition_add`/`transition_remove`
//!   through a pair of archetypes caches both directions. Resolution is
//!   idempotent and always agrees with the fingerprint lookup (the edge cache
//!   is a shortcut, not a second source of truth).
//! - A generation counter is bumped whenever the archetype set changes;
//!   query caches re-validate against it.

use std::collections::HashMap;

use log::debug;

use crate::archetype::Archetype;
use crate::bitset::{Signature, SpanBitSet};
use crate::error::EcsResult;
use crate::registry::component_info;
use crate::types::ArchetypeId;
use crate::types::ComponentId;

/// Owns the world's archetypes and their fingerprint index.
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_fingerprint: HashMap<u64, Vec<ArchetypeId>>,
    generation: u64,
    chunk_bytes: usize,
}

impl ArchetypeGraph {
    /// Creates an empty graph; `chunk_bytes` is the chunk byte budget handed
    /// to every archetype constructed through it.
    pub(crate) fn new(chunk_bytes: usize) -> Self {
        Self {
            archetypes: Vec::new(),
            by_fingerprint: HashMap::new(),
            generation: 0,
            chunk_bytes,
        }
    }

    /// All archetypes in creation order.
    #[inline]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    #[inline]
    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    /// Number of archetypes currently in the graph.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Returns `true` when the graph holds no archetypes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Monotonic counter of archetype-set changes.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Borrow of archetype `id`.
    #[inline]
    pub fn get(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id as usize]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id as usize]
    }

    /// Mutable borrows of two distinct archetypes.
    pub(crate) fn pair_mut(
        &mut self,
        a: ArchetypeId,
        b: ArchetypeId,
    ) -> (&mut Archetype, &mut Archetype) {
        assert!(a != b, "source and destination archetype must differ");
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.archetypes.split_at_mut(high as usize);
        let low_ref = &mut head[low as usize];
        let high_ref = &mut tail[0];
        if a < b {
            (low_ref, high_ref)
        } else {
            (high_ref, low_ref)
        }
    }

    /// Resolves `signature` to an existing archetype by fingerprint,
    /// re-checking signature equality on every candidate.
    pub fn lookup(&self, signature: &Signature) -> Option<ArchetypeId> {
        let bucket = self.by_fingerprint.get(&signature.fingerprint())?;
        bucket
            .iter()
            .copied()
            .find(|&id| self.archetypes[id as usize].signature() == signature)
    }

    /// Resolves a span-backed component set without materializing a
    /// `Signature`. Used by dynamic entry points.
    pub fn lookup_span(&self, span: &SpanBitSet<'_>) -> Option<ArchetypeId> {
        let bucket = self.by_fingerprint.get(&span.fingerprint())?;
        bucket
            .iter()
            .copied()
            .find(|&id| span.equals(self.archetypes[id as usize].signature()))
    }

    /// Returns the archetype for `signature`, constructing it on first
    /// demand with its first chunk allocated.
    ///
    /// The boolean reports whether a new archetype (and therefore one chunk
    /// of capacity) was created, so the world can grow its accounting.
    pub(crate) fn get_or_create(&mut self, signature: &Signature) -> EcsResult<(ArchetypeId, bool)> {
        if let Some(id) = self.lookup(signature) {
            return Ok((id, false));
        }

        let mut infos = Vec::with_capacity(signature.len());
        for component_id in signature.iter() {
            infos.push(component_info(component_id)?);
        }

        let id = self.archetypes.len() as ArchetypeId;
        let archetype = Archetype::new(id, *signature, infos, self.chunk_bytes);
        debug!(
            "archetype {} created ({} components, {} rows/chunk)",
            id,
            signature.len(),
            archetype.entities_per_chunk()
        );
        self.by_fingerprint
            .entry(signature.fingerprint())
            .or_default()
            .push(id);
        self.archetypes.push(archetype);
        self.generation += 1;
        Ok((id, true))
    }

    /// Resolves the archetype reached from `from` by adding `component`.
    ///
    /// Consults the edge cache first; on a miss the transformed signature is
    /// resolved through the map and both directions of the edge are cached.
    pub(crate) fn transition_add(
        &mut self,
        from: ArchetypeId,
        component: ComponentId,
    ) -> EcsResult<(ArchetypeId, bool)> {
        if let Some(target) = self.archetypes[from as usize].edge_add(component) {
            return Ok((target, false));
        }

        let mut signature = *self.archetypes[from as usize].signature();
        signature.set(component);
        let (target, created) = self.get_or_create(&signature)?;

        self.archetypes[from as usize].cache_edge_add(component, target);
        self.archetypes[target as usize].cache_edge_remove(component, from);
        Ok((target, created))
    }

    /// Resolves the archetype reached from `from` by removing `component`.
    pub(crate) fn transition_remove(
        &mut self,
        from: ArchetypeId,
        component: ComponentId,
    ) -> EcsResult<(ArchetypeId, bool)> {
        if let Some(target) = self.archetypes[from as usize].edge_remove(component) {
            return Ok((target, false));
        }

        let mut signature = *self.archetypes[from as usize].signature();
        signature.clear(component);
        let (target, created) = self.get_or_create(&signature)?;

        self.archetypes[from as usize].cache_edge_remove(component, target);
        self.archetypes[target as usize].cache_edge_add(component, from);
        Ok((target, created))
    }

    /// Destroys every empty archetype, compacting ids.
    ///
    /// Returns `None` when nothing was destroyed. Otherwise returns the
    /// old-id → new-id remap table; the caller rewrites directory slots with
    /// it. All edge caches are dropped (they hold ids from before the
    /// compaction) and the fingerprint map is rebuilt.
    pub(crate) fn destroy_empty(&mut self) -> Option<Vec<Option<ArchetypeId>>> {
        if self.archetypes.iter().all(|archetype| !archetype.is_empty()) {
            return None;
        }

        let mut remap: Vec<Option<ArchetypeId>> = vec![None; self.archetypes.len()];
        let mut next: ArchetypeId = 0;
        for (old, archetype) in self.archetypes.iter().enumerate() {
            if !archetype.is_empty() {
                remap[old] = Some(next);
                next += 1;
            }
        }

        let destroyed = self.archetypes.len() - next as usize;
        let survivors = std::mem::take(&mut self.archetypes)
            .into_iter()
            .enumerate()
            .filter_map(|(old, mut archetype)| {
                let new_id = remap[old]?;
                archetype.set_id(new_id);
                archetype.clear_edges();
                Some(archetype)
            })
            .collect::<Vec<_>>();
        self.archetypes = survivors;

        self.by_fingerprint.clear();
        for archetype in &self.archetypes {
            self.by_fingerprint
                .entry(archetype.signature().fingerprint())
                .or_default()
                .push(archetype.id());
        }

        self.generation += 1;
        debug!("trim destroyed {} empty archetypes", destroyed);
        Some(remap)
    }

    /// Releases every archetype.
    pub(crate) fn clear(&mut self) {
        self.archetypes.clear();
        self.by_fingerprint.clear();
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::register;
    use crate::types::CHUNK_BYTES;

    #[derive(Default, Clone, Copy)]
    struct Left(#[allow(dead_code)] u64);
    #[derive(Default, Clone, Copy)]
    struct Right(#[allow(dead_code)] u32);

    fn graph_with_base() -> (ArchetypeGraph, ComponentId, ComponentId, ArchetypeId) {
        let left = register::<Left>().unwrap();
        let right = register::<Right>().unwrap();
        let mut graph = ArchetypeGraph::new(CHUNK_BYTES);
        let (base, created) = graph
            .get_or_create(&Signature::from_components(&[left]))
            .unwrap();
        assert!(created);
        (graph, left, right, base)
    }

    #[test]
    fn get_or_create_is_idempotent_per_signature() {
        let (mut graph, left, _right, base) = graph_with_base();
        let (again, created) = graph
            .get_or_create(&Signature::from_components(&[left]))
            .unwrap();
        assert_eq!(again, base);
        assert!(!created);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn cached_edges_agree_with_fingerprint_lookup() {
        let (mut graph, left, right, base) = graph_with_base();

        let (target, _) = graph.transition_add(base, right).unwrap();
        let mut expected = Signature::from_components(&[left]);
        expected.set(right);
        assert_eq!(graph.lookup(&expected), Some(target));

        // Second traversal hits the cache and resolves identically; the
        // reverse edge was filled opportunistically.
        let (cached, created) = graph.transition_add(base, right).unwrap();
        assert_eq!(cached, target);
        assert!(!created);
        let (back, created) = graph.transition_remove(target, right).unwrap();
        assert_eq!(back, base);
        assert!(!created);
    }

    #[test]
    fn generation_bumps_on_archetype_set_changes() {
        let (mut graph, _left, right, base) = graph_with_base();
        let before = graph.generation();
        graph.transition_add(base, right).unwrap();
        assert!(graph.generation() > before);
    }
}
