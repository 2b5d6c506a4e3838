//! Deferred structural operations.
//!
//! While a world-lock is held, structural changes are described as
//! [DeferredOp] values and queued instead of applied. The queue is drained
//! in FIFO order when the last lock is released, so operations observe each
//! other in exactly the order they were requested.

use crate::expression::TypeExpression;
use crate::identity::Identity;
use crate::storage::archetype::ArchetypeIndex;
use crate::storage::component::{Component, ComponentTypeId};
use crate::storage::{Column, ErasedColumn};

/// A component value whose concrete type has been erased so it can sit in
/// the deferred queue.
///
/// Implemented for every component type; a deferred add carries
/// `Box<dyn ErasedComponent>` and pushes itself into the destination column
/// when the queue is drained.
pub trait ErasedComponent: Send + Sync + 'static {
    /// The component type of the erased value.
    fn component_type(&self) -> ComponentTypeId;

    /// Consumes the value, appending it to `column`. The column must store
    /// this component type.
    fn push_into(self: Box<Self>, column: &mut dyn ErasedColumn);
}

impl<T: Component> ErasedComponent for T {
    fn component_type(&self) -> ComponentTypeId {
        ComponentTypeId::of::<T>()
    }

    fn push_into(self: Box<Self>, column: &mut dyn ErasedColumn) {
        column
            .downcast_mut::<Column<T>>()
            .expect("deferred value pushed into column of different component type")
            .push(*self);
    }
}

/// A structural change queued while the world was locked.
pub(crate) enum DeferredOp {
    /// Insert a reserved entity into the empty archetype.
    Spawn(Identity),
    /// Remove an entity and recycle its slot.
    Despawn(Identity),
    /// Add a component value under an expression.
    Add(Identity, TypeExpression, Box<dyn ErasedComponent>),
    /// Remove the component under an expression.
    Remove(Identity, TypeExpression),
    /// Despawn an archetype's rows beyond a maximum count.
    Truncate(ArchetypeIndex, usize),
}

impl std::fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeferredOp::Spawn(id) => write!(f, "Spawn({})", id),
            DeferredOp::Despawn(id) => write!(f, "Despawn({})", id),
            DeferredOp::Add(id, expr, _) => write!(f, "Add({}, {})", id, expr),
            DeferredOp::Remove(id, expr) => write!(f, "Remove({}, {})", id, expr),
            DeferredOp::Truncate(archetype, max) => {
                write!(f, "Truncate({:?}, {})", archetype, max)
            }
        }
    }
}
