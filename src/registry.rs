//! # Component Registry
//!
//! This module provides a global registry that assigns stable [`ComponentId`]
//! values to Rust component types and exposes the per-type metadata archetype
//! storage needs: byte size, alignment, and monomorphized drop / default /
//! boxed-write functions.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size)
//! from runtime storage, enabling archetypes to carve heterogeneous component
//! columns out of raw chunk buffers. The typed and runtime-id code paths both
//! go through the same [`ComponentInfo`], so they read and write the same
//! bytes.
//!
//! ## Design
//! - Components are registered once and assigned a compact `ComponentId` in
//!   `[0, COMPONENT_CAP)`. Registration is monotonic; ids are never reused
//!   within a process.
//! - Per-type behavior (drop, default construction, writing a type-erased
//!   boxed value) is captured at registration as plain function pointers.
//!
//! ## Concurrency
//! The registry is protected by `RwLock` for concurrent reads and serialized
//! writes. Hot paths never take the lock: archetypes copy the
//! `ComponentInfo` values they need at construction time, so lookup by id
//! during iteration and structural change is lock-free.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::mem::{align_of, needs_drop, size_of};
use std::sync::{OnceLock, RwLock};

use crate::error::{EcsResult, RegistryError};
use crate::types::{ComponentId, COMPONENT_CAP};

/// Marker trait for component types.
///
/// `Default` backs the default-state columns produced by `create`, default
/// `add`, and bulk add; `Send + Sync` lets chunk storage cross worker
/// threads. The blanket impl makes any eligible type a component once
/// registered.
pub trait Component: Default + Send + Sync + 'static {}

impl<T: Default + Send + Sync + 'static> Component for T {}

/// Writes `T::default()` into uninitialized storage at `ptr`.
///
/// ## Safety
/// `ptr` must be valid for writes of `T` and properly aligned; the slot must
/// not hold a live value (it is overwritten without dropping).
unsafe fn write_default<T: Component>(ptr: *mut u8) {
    unsafe { (ptr as *mut T).write(T::default()) }
}

/// Drops the `T` stored at `ptr` in place.
///
/// ## Safety
/// `ptr` must point at a live, properly aligned `T`.
unsafe fn drop_in_place<T>(ptr: *mut u8) {
    unsafe { std::ptr::drop_in_place(ptr as *mut T) }
}

/// Moves a type-erased boxed value into uninitialized storage at `ptr`.
///
/// Returns `false` (and leaves the slot untouched) if the value is not a `T`.
///
/// ## Safety
/// Same contract as [`write_default`].
unsafe fn write_boxed<T: Component>(ptr: *mut u8, value: Box<dyn Any + Send>) -> bool {
    match value.downcast::<T>() {
        Ok(value) => {
            unsafe { (ptr as *mut T).write(*value) };
            true
        }
        Err(_) => false,
    }
}

/// Describes a registered component type.
///
/// ## Purpose
/// The unit of type knowledge carried by archetypes: enough to lay out a
/// column, move values by bytes, drop them, and construct defaults, without
/// ever naming the Rust type again.
///
/// ## Notes
/// `ComponentInfo` is `Copy` and safe to cache freely; archetypes hold copies
/// so the registry lock stays off hot paths.
#[derive(Copy, Clone, Debug)]
pub struct ComponentInfo {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentId,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// Size of the component type in bytes. Zero-sized components are
    /// permitted and occupy no chunk storage.
    pub size: usize,

    /// Alignment of the component type in bytes.
    pub align: usize,

    /// Drops a live value in place; `None` when `T` needs no drop.
    pub drop_fn: Option<unsafe fn(*mut u8)>,

    /// Writes `T::default()` into an uninitialized slot.
    pub default_fn: unsafe fn(*mut u8),

    /// Moves a boxed value into an uninitialized slot; `false` on type
    /// mismatch.
    pub write_boxed_fn: unsafe fn(*mut u8, Box<dyn Any + Send>) -> bool,
}

impl ComponentInfo {
    fn of<T: Component>(component_id: ComponentId) -> Self {
        Self {
            component_id,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            drop_fn: if needs_drop::<T>() {
                Some(drop_in_place::<T>)
            } else {
                None
            },
            default_fn: write_default::<T>,
            write_boxed_fn: write_boxed::<T>,
        }
    }
}

/// Global mapping between Rust component types and compact `ComponentId`s.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching `by_id[id]`.
/// - Ids are allocated sequentially and never reused.
struct ComponentRegistry {
    next_id: ComponentId,
    by_type: HashMap<TypeId, ComponentId>,
    by_id: Vec<Option<ComponentInfo>>,
}

static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();

fn component_registry() -> &'static RwLock<ComponentRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(ComponentRegistry {
            next_id: 0,
            by_type: HashMap::new(),
            by_id: vec![None; COMPONENT_CAP],
        })
    })
}

impl ComponentRegistry {
    fn register<T: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok(existing);
        }

        let id = self.next_id;
        if (id as usize) >= COMPONENT_CAP {
            return Err(RegistryError::CapacityExceeded { cap: COMPONENT_CAP });
        }
        self.next_id = id.wrapping_add(1);

        self.by_type.insert(type_id, id);
        self.by_id[id as usize] = Some(ComponentInfo::of::<T>(id));
        Ok(id)
    }
}

/// Registers component type `T` and returns its assigned id.
///
/// ## Behavior
/// - If `T` is already registered, returns the existing id.
/// - Registration may be called concurrently with itself; writes are
///   serialized by the registry lock.
///
/// ## Errors
/// `CapacityExceeded` once `COMPONENT_CAP` distinct types are registered;
/// `PoisonedLock` if a registering thread panicked.
pub fn register<T: Component>() -> EcsResult<ComponentId> {
    let mut registry = component_registry()
        .write()
        .map_err(|_| RegistryError::PoisonedLock)?;
    Ok(registry.register::<T>()?)
}

/// Returns the registered id for type `T`.
///
/// ## Errors
/// `NotRegistered` if `register::<T>()` was never called.
pub fn component_id_of<T: Component>() -> EcsResult<ComponentId> {
    let registry = component_registry()
        .read()
        .map_err(|_| RegistryError::PoisonedLock)?;
    registry
        .by_type
        .get(&TypeId::of::<T>())
        .copied()
        .ok_or_else(|| {
            RegistryError::NotRegistered {
                type_id: TypeId::of::<T>(),
                name: type_name::<T>(),
            }
            .into()
        })
}

/// Returns a copy of the descriptor for `component_id`.
///
/// ## Errors
/// `NotRegistered` if the id was never assigned.
pub fn component_info(component_id: ComponentId) -> EcsResult<ComponentInfo> {
    let registry = component_registry()
        .read()
        .map_err(|_| RegistryError::PoisonedLock)?;
    registry
        .by_id
        .get(component_id as usize)
        .and_then(|slot| *slot)
        .ok_or_else(|| RegistryError::UnknownId { component_id }.into())
}

/// Highest component id assigned so far, if any.
///
/// Used by dynamic callers to size [`SpanBitSet`](crate::bitset::SpanBitSet)
/// storage via [`required_words`](crate::bitset::required_words).
pub fn max_component_id() -> Option<ComponentId> {
    let registry = component_registry().read().ok()?;
    registry.next_id.checked_sub(1)
}
