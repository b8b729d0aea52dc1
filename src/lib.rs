//! # strata
//!
//! Archetype-based Entity-Component-System (ECS) core with chunked,
//! column-major storage.
//!
//! ## Design Goals
//! - Archetype-based storage for cache efficiency
//! - Fast structural mutation through cached archetype transitions
//! - Bulk archetype-level operations without per-entity indirection
//! - Safe, explicit data access: structural changes take `&mut World`,
//!   read-only iteration takes `&World`
//!
//! Entities are grouped by their exact component set into archetypes; each
//! archetype packs its entities into fixed-capacity chunks of parallel
//! component columns. Queries match archetypes by signature predicates and
//! iterate chunk by chunk.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod archetype;
pub mod bitset;
pub mod chunk;
pub mod commands;
pub mod directory;
pub mod error;
pub mod events;
pub mod graph;
pub mod query;
pub mod registry;
pub mod types;
pub mod world;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use archetype::Archetype;
pub use bitset::{required_words, Signature, SpanBitSet};
pub use commands::{Bundle, CommandBuffer};
pub use directory::EntityDirectory;
pub use error::{CapacityError, EcsError, EcsResult, PreconditionViolation, RegistryError};
pub use events::EventSink;
pub use query::{ChunkView, Query, QueryDescription};
pub use registry::{component_id_of, component_info, register, Component, ComponentInfo};
pub use types::{
    ArchetypeId, ComponentId, Entity, EntityId, EntityLocation, EntityReference, RecycledEntity,
    Version, WorldId,
};
pub use world::{World, WorldConfig};

/// Commonly used ECS types.
///
/// Import with:
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        component_id_of, register, Bundle, CommandBuffer, Component, Entity, EntityReference,
        EventSink, Query, QueryDescription, Signature, World, WorldConfig,
    };
}
