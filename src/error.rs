//! The error type shared by all fallible world, storage and query operations.

use crate::expression::TypeExpression;
use crate::identity::{Identity, IdentityKind};
use thiserror::Error;

/// An error type which describes why a world, storage or query operation failed.
///
/// Usage errors (dead entities, duplicate or missing components, bad identity
/// kinds) fail fast and leave the world unmodified. A
/// [`StructurallyModifiedDuringIteration`](EcsError::StructurallyModifiedDuringIteration)
/// error indicates the concurrency contract was violated: an archetype was
/// structurally mutated while an iterator had its version snapshotted.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The entity is dead, belongs to another world, or was never spawned.
    #[error("entity {0} is not alive in this world")]
    EntityNotAlive(Identity),

    /// The entity already has a component under the given expression.
    #[error("component {0} is already present on the entity")]
    ComponentAlreadyPresent(TypeExpression),

    /// The entity has no component under the given expression.
    #[error("component {0} is not present on the entity")]
    ComponentNotPresent(TypeExpression),

    /// A dynamically-typed component value did not contain a value of the
    /// component type named by its expression.
    #[error("the value supplied for {0} is not a component of that type")]
    NullComponentValue(TypeExpression),

    /// A component add named a wildcard expression. Wildcards match
    /// stored expressions in queries; they never identify a storage slot.
    #[error("component values cannot be stored under the wildcard expression {0}")]
    WildcardNotStorable(TypeExpression),

    /// An archetype was structurally modified while it was being iterated
    /// outside of a world-lock scope.
    #[error("archetype was structurally modified during iteration")]
    StructurallyModifiedDuringIteration,

    /// The operation is only defined for a different kind of identity.
    #[error("operation is not defined for {0} identities")]
    InvalidIdentityKind(IdentityKind),

    /// A row index was out of bounds for a storage column.
    #[error("row {row} out of bounds for column of length {len}")]
    RowOutOfBounds {
        /// The row that was addressed.
        row: usize,
        /// The length of the column at the time of access.
        len: usize,
    },
}
