//! Core ECS Types and Identifiers
//!
//! This module defines the **fundamental types and identifiers** shared across
//! all subsystems of the ECS: entity handles, component and archetype
//! identifiers, and the capacity constants that fix bit-level layouts.
//!
//! ## Design Philosophy
//!
//! The ECS is designed around:
//!
//! - **Dense storage**
//! - **Bitset-based signatures**
//! - **Stable numeric identifiers**
//! - **Explicit liveness via versioning**
//!
//! ## Entity Representation
//!
//! An [`Entity`] is a plain `(id, world)` pair. The pair alone is not safe
//! against dangling use across id recycling; the generation counter lives in
//! the entity directory, and [`EntityReference`] captures it for stale-handle
//! detection. This keeps `Entity` freely copyable plain data while still
//! supporting use-after-destroy checks where callers need them.
//!
//! ## Components and Archetypes
//!
//! Components are identified by compact [`ComponentId`] values assigned at
//! registration. Archetypes are identified by [`ArchetypeId`] indices into the
//! world's archetype list; their identity is the signature bitset defined in
//! the `bitset` module.
//!
//! All capacity constants are chosen to fit cache-friendly structures and are
//! validated with static assertions.

/// Numeric identifier of an entity within a world.
pub type EntityId = u32;
/// Small integer tag identifying the owning world, chosen by the caller.
pub type WorldId = u16;
/// Generation counter used to detect stale entity handles.
pub type Version = u32;
/// Count of live entities.
pub type EntityCount = u32;

/// Unique identifier for a registered component type.
pub type ComponentId = u16;
/// Index of an archetype within the world's archetype list.
pub type ArchetypeId = u16;
/// Chunk index within an archetype.
pub type ChunkIndex = u32;
/// Row index within a chunk.
pub type RowIndex = u32;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 1024;
/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_WORDS: usize = (COMPONENT_CAP + 63) / 64;

/// Default byte budget for a single chunk buffer.
pub const CHUNK_BYTES: usize = 16 * 1024;

const _: [(); 1] = [(); (COMPONENT_CAP % 64 == 0) as usize];
const _: [(); 1] = [(); (COMPONENT_CAP <= ComponentId::MAX as usize + 1) as usize];

/// Opaque handle to an entity.
///
/// ## Purpose
/// `Entity` uniquely names a live entity within a process: `id` indexes the
/// owning world's entity directory, `world` tags which world issued it.
///
/// ## Invariants
/// - Two entities with equal `(id, world)` refer to the same directory slot.
/// - `Entity` says nothing about liveness; pair it with a version via
///   [`EntityReference`] when a handle may outlive the entity.
///
/// ## Notes
/// `Entity` values are cheap to copy and compare and are safe to pass across
/// threads.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Entity {
    /// Slot index within the owning world's entity directory.
    pub id: EntityId,

    /// Tag of the world that issued this entity.
    pub world: WorldId,
}

impl Entity {
    /// Creates an entity handle from its raw parts.
    #[inline]
    pub const fn new(id: EntityId, world: WorldId) -> Self {
        Self { id, world }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity {}@{}", self.id, self.world)
    }
}

/// Weak, version-validated handle to an entity.
///
/// ## Purpose
/// Captures the directory version current at the time the reference was
/// taken. The reference is valid iff the directory still stores the same
/// version for `entity.id`; after the id is recycled the stored version is
/// strictly greater (modulo wrap) and the reference resolves to "not alive".
///
/// ## Notes
/// An `EntityReference` is never an owner; it is plain data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EntityReference {
    /// The referenced entity.
    pub entity: Entity,

    /// Directory version observed when the reference was created.
    pub version: Version,
}

/// A freed entity id awaiting reuse.
///
/// Stored in the world's FIFO recycling queue. On reuse the id is handed out
/// again with `version` as its new generation, which is strictly greater
/// (modulo wrap) than any version previously issued for the id.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RecycledEntity {
    /// The freed id.
    pub id: EntityId,

    /// Generation the id will carry when recycled.
    pub version: Version,
}

/// Physical storage location of an entity within archetype storage.
///
/// ## Invariants
/// - Must always reflect the true location of the entity's component row.
/// - Updated atomically with archetype row moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype containing the entity.
    pub archetype: ArchetypeId,

    /// Chunk index within the archetype.
    pub chunk: ChunkIndex,

    /// Row index within the chunk.
    pub row: RowIndex,
}
