//! Deferred structural mutation: bundles and command buffers.
//!
//! A [`Bundle`] groups type-erased component values for entity creation. A
//! [`CommandBuffer`] records structural changes while iteration is in flight
//! and applies them in one pass during [`CommandBuffer::playback`], which is
//! a single structural-change window on the world.

use std::any::Any;

use crate::bitset::Signature;
use crate::error::EcsResult;
use crate::registry::{component_id_of, Component};
use crate::types::{ComponentId, Entity};
use crate::world::World;

/// Type-erased container of component values, used when spawning.
///
/// The bundle's signature is derived from the inserted values, so a created
/// entity's archetype is exactly the set of components placed here.
#[derive(Default)]
pub struct Bundle {
    signature: Signature,
    values: Vec<(ComponentId, Box<dyn Any + Send>)>,
}

impl Bundle {
    /// Creates an empty bundle.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all stored component values.
    #[inline]
    pub fn clear(&mut self) {
        self.signature = Signature::default();
        self.values.clear();
    }

    /// Inserts a component value; `T` must be registered.
    #[inline]
    pub fn insert<T: Component>(&mut self, value: T) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        self.insert_by_id(component, Box::new(value));
        Ok(())
    }

    /// Inserts a type-erased value for `component`.
    ///
    /// The boxed value's type must match the component's registered type;
    /// a mismatch surfaces as an error at creation time.
    #[inline]
    pub fn insert_by_id(&mut self, component: ComponentId, value: Box<dyn Any + Send>) {
        self.signature.set(component);
        self.values.push((component, value));
    }

    /// The component set represented by this bundle.
    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Removes and returns the value for `component`, if present.
    pub(crate) fn take(&mut self, component: ComponentId) -> Option<Box<dyn Any + Send>> {
        let index = self
            .values
            .iter()
            .position(|(id, _)| *id == component)?;
        let (_, value) = self.values.swap_remove(index);
        Some(value)
    }
}

enum Command {
    Create {
        bundle: Bundle,
    },
    Destroy {
        entity: Entity,
    },
    Add {
        entity: Entity,
        component: ComponentId,
        value: Option<Box<dyn Any + Send>>,
    },
    Remove {
        entity: Entity,
        component: ComponentId,
    },
    Set {
        entity: Entity,
        component: ComponentId,
        value: Box<dyn Any + Send>,
    },
}

/// Records structural changes for deferred application.
///
/// Commands are applied in recording order by [`playback`](Self::playback);
/// the first failing command aborts playback and returns its error, leaving
/// later commands recorded.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` when nothing is recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops all recorded commands without applying them.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Records entity creation from `bundle`.
    pub fn create(&mut self, bundle: Bundle) {
        self.commands.push(Command::Create { bundle });
    }

    /// Records destruction of `entity`.
    pub fn destroy(&mut self, entity: Entity) {
        self.commands.push(Command::Destroy { entity });
    }

    /// Records adding component `T` with `value` to `entity`.
    pub fn add<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        self.commands.push(Command::Add {
            entity,
            component,
            value: Some(Box::new(value)),
        });
        Ok(())
    }

    /// Records adding `component` at its default state to `entity`.
    pub fn add_default(&mut self, entity: Entity, component: ComponentId) {
        self.commands.push(Command::Add {
            entity,
            component,
            value: None,
        });
    }

    /// Records removing component `T` from `entity`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        self.remove_by_id(entity, component);
        Ok(())
    }

    /// Records removing `component` from `entity`.
    pub fn remove_by_id(&mut self, entity: Entity, component: ComponentId) {
        self.commands.push(Command::Remove { entity, component });
    }

    /// Records overwriting the `T` of `entity` with `value`.
    pub fn set<T: Component>(&mut self, entity: Entity, value: T) -> EcsResult<()> {
        let component = component_id_of::<T>()?;
        self.commands.push(Command::Set {
            entity,
            component,
            value: Box::new(value),
        });
        Ok(())
    }

    /// Applies all recorded commands to `world` in recording order.
    ///
    /// Playback is one structural-change window: the caller holds the world
    /// exclusively for its duration.
    pub fn playback(&mut self, world: &mut World) -> EcsResult<()> {
        for command in self.commands.drain(..) {
            match command {
                Command::Create { bundle } => {
                    world.create_with(bundle)?;
                }
                Command::Destroy { entity } => world.destroy(entity)?,
                Command::Add {
                    entity,
                    component,
                    value: Some(value),
                } => world.add_boxed(entity, component, value)?,
                Command::Add {
                    entity,
                    component,
                    value: None,
                } => world.add_by_id(entity, component)?,
                Command::Remove { entity, component } => world.remove_by_id(entity, component)?,
                Command::Set {
                    entity,
                    component,
                    value,
                } => world.set_boxed(entity, component, value)?,
            }
        }
        Ok(())
    }
}
