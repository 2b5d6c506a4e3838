//! Cohort is an archetype-based entity component system with entity
//! relations and wildcard queries.
//!
//! Entities are packed 64-bit [identities](identity::Identity) carrying a
//! slot and a generation. Components are addressed by a
//! [type expression](expression::TypeExpression): a component type plus an
//! optional secondary key, which may be a target entity (a relation), an
//! object link or a typed hash key. Entities sharing the same set of
//! expressions live together in an [archetype](storage::archetype::Archetype),
//! stored column-wise so queries iterate dense slices.
//!
//! Queries select archetypes by structural predicate and stream rows
//! through typed [streams](query::stream::Stream); wildcard match keys
//! expand into a cross-join over all matching columns. Structural changes
//! requested during iteration are deferred through a
//! [world-lock](world::WorldLock) and applied in FIFO order when the lock
//! releases.
//!
//! # Example
//!
//! ```
//! use cohort::prelude::*;
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! let entity = world.spawn();
//! world.add_component(entity, SecondaryKey::None, Position { x: 0.0, y: 0.0 }).unwrap();
//! world.add_component(entity, SecondaryKey::None, Velocity { dx: 1.0, dy: 2.0 }).unwrap();
//!
//! let mut query = QueryBuilder::new().has::<Position>().has::<Velocity>().compile();
//! query
//!     .stream::<(Position, Velocity)>()
//!     .for_each(&mut world, |_entity, pos, vel| {
//!         pos.x += vel.dx;
//!         pos.y += vel.dy;
//!     })
//!     .unwrap();
//!
//! let pos = world.get_component::<Position>(entity, SecondaryKey::None).unwrap();
//! assert_eq!(pos.x, 1.0);
//! ```

pub mod command;
pub mod error;
pub mod expression;
pub mod hash;
pub mod identity;
pub mod query;
pub mod signature;
pub mod storage;
pub mod world;

pub use crate::command::ErasedComponent;
pub use crate::error::EcsError;
pub use crate::expression::{SecondaryKey, TypeExpression};
pub use crate::identity::{Generation, Identity, IdentityKind, WorldIndex};
pub use crate::query::stream::{Stream, StreamTypes};
pub use crate::query::{Mask, Query, QueryBuilder};
pub use crate::signature::Signature;
pub use crate::storage::archetype::{Archetype, ArchetypeIndex};
pub use crate::storage::component::{Component, ComponentTypeId, KeyTypeId};
pub use crate::storage::{Column, ErasedColumn};
pub use crate::world::{EntityLocation, World, WorldLock};

/// The commonly used types, for glob import.
pub mod prelude {
    pub use crate::error::EcsError;
    pub use crate::expression::{SecondaryKey, TypeExpression};
    pub use crate::identity::{Identity, IdentityKind};
    pub use crate::query::stream::Stream;
    pub use crate::query::{Mask, Query, QueryBuilder};
    pub use crate::signature::Signature;
    pub use crate::storage::component::Component;
    pub use crate::world::{World, WorldLock};
}
