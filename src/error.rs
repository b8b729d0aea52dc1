//! Error types for the ECS core.
//!
//! This module declares focused, composable error types used across the
//! storage and structural-change pipeline. Each error carries enough context
//! to make failures actionable while remaining small and cheap to pass around
//! or convert into the aggregate [`EcsError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g.
//!   precondition violations, registry capacity, poisoned registry locks).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`EcsError`].
//! * **Actionability:** Structured fields (offending entity, component id,
//!   requested vs. available capacity) make logs useful without reproducing
//!   the issue.
//!
//! ## Taxonomy
//! The taxonomy is intentionally narrow. Precondition violations are
//! programming errors: the operation aborts without partially mutating data
//! invariants, and debug builds additionally assert. Allocator exhaustion is
//! fatal and not modeled here. Contention is not an error class; the query
//! cache latch either grants or waits.

use std::any::TypeId;
use std::fmt;

use crate::types::{ComponentId, Entity};

/// Returned when the system cannot satisfy a request to create or place
/// additional entities because the target container has insufficient
/// capacity.
///
/// ### Fields
/// * `entities_needed` — Total number of entities the operation attempted to
///   create or accommodate.
/// * `capacity` — The current upper bound that prevented the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    /// Total entities the operation attempted to allocate.
    pub entities_needed: u64,

    /// Current capacity limiting the operation.
    pub capacity: u64,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity limit reached ({} needed; capacity {})",
            self.entities_needed, self.capacity
        )
    }
}

impl std::error::Error for CapacityError {}

/// Errors raised by the global component registry.
///
/// ### Variants
/// * `CapacityExceeded` — the dense id space is exhausted.
/// * `NotRegistered` — a type was used before `register::<T>()` ran.
/// * `PoisonedLock` — the registry lock was poisoned by a panicking thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// No more component ids can be allocated.
    CapacityExceeded {
        /// Maximum number of registrable component types.
        cap: usize,
    },

    /// The component type was never registered.
    NotRegistered {
        /// Runtime type identifier of the unregistered component.
        type_id: TypeId,

        /// Human-readable component type name.
        name: &'static str,
    },

    /// A component id was used that was never assigned.
    UnknownId {
        /// The offending id.
        component_id: ComponentId,
    },

    /// The registry lock was poisoned.
    PoisonedLock,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::CapacityExceeded { cap } => {
                write!(f, "component registry full ({} types)", cap)
            }
            RegistryError::NotRegistered { name, .. } => {
                write!(f, "component type not registered: {}", name)
            }
            RegistryError::UnknownId { component_id } => {
                write!(f, "component id {} was never assigned", component_id)
            }
            RegistryError::PoisonedLock => f.write_str("component registry lock poisoned"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// A structural operation was invoked with inputs that violate its contract.
///
/// ## Context
/// These are programming errors, not runtime conditions: operating on a dead
/// entity, adding a component the entity already has, removing one it does
/// not, or requesting a transition between identical signatures. The
/// offending operation aborts before mutating any invariant; debug builds
/// assert loudly at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionViolation {
    /// The entity is dead, stale, or was never created in this world.
    DeadEntity {
        /// Offending handle.
        entity: Entity,
    },

    /// The entity already has the component being added.
    ComponentPresent {
        /// Offending handle.
        entity: Entity,

        /// Component that is already part of the entity's signature.
        component: ComponentId,
    },

    /// The entity does not have the component being removed or read.
    ComponentAbsent {
        /// Offending handle.
        entity: Entity,

        /// Component missing from the entity's signature.
        component: ComponentId,
    },

    /// Source and destination signatures of a move are identical.
    SameSignature,
}

impl fmt::Display for PreconditionViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionViolation::DeadEntity { entity } => {
                write!(f, "operation on dead {}", entity)
            }
            PreconditionViolation::ComponentPresent { entity, component } => {
                write!(f, "{} already has component {}", entity, component)
            }
            PreconditionViolation::ComponentAbsent { entity, component } => {
                write!(f, "{} does not have component {}", entity, component)
            }
            PreconditionViolation::SameSignature => {
                f.write_str("source and destination archetypes are identical")
            }
        }
    }
}

impl std::error::Error for PreconditionViolation {}

/// Aggregate error for all fallible ECS operations.
///
/// `From<T>` conversions allow `?` from low-level operations:
/// ```ignore
/// fn add_velocity(world: &mut World, entity: Entity) -> EcsResult<()> {
///     world.add::<Velocity>(entity)?; // Precondition -> EcsError
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A registry lookup or registration failed.
    Registry(RegistryError),

    /// A structural operation violated its contract.
    Precondition(PreconditionViolation),

    /// Entity capacity was exhausted.
    Capacity(CapacityError),

    /// An internal invariant failed to hold.
    ///
    /// This indicates a bug in the ECS itself rather than in the caller.
    Internal(&'static str),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::Registry(e) => write!(f, "{e}"),
            EcsError::Precondition(e) => write!(f, "{e}"),
            EcsError::Capacity(e) => write!(f, "{e}"),
            EcsError::Internal(what) => write!(f, "internal invariant violated: {}", what),
        }
    }
}

impl std::error::Error for EcsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EcsError::Registry(e) => Some(e),
            EcsError::Precondition(e) => Some(e),
            EcsError::Capacity(e) => Some(e),
            EcsError::Internal(_) => None,
        }
    }
}

impl From<RegistryError> for EcsError {
    fn from(e: RegistryError) -> Self {
        EcsError::Registry(e)
    }
}

impl From<PreconditionViolation> for EcsError {
    fn from(e: PreconditionViolation) -> Self {
        EcsError::Precondition(e)
    }
}

impl From<CapacityError> for EcsError {
    fn from(e: CapacityError) -> Self {
        EcsError::Capacity(e)
    }
}

/// Result alias used across the crate.
pub type EcsResult<T> = Result<T, EcsError>;
