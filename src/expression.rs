//! Type expressions: the (component type, secondary key) pairs which name
//! component slots.
//!
//! A stored component is addressed by its component type plus an optional
//! secondary key: nothing (a plain component), a target entity (a
//! relation), an object link, or a typed hash key. Query-side expressions
//! may instead carry a wildcard key which matches several concrete keys at
//! once. Matching is deliberately non-commutative: a plain query expression
//! matches only plain storage, so keyed and plain variants of one component
//! can coexist in an archetype without being double-iterated unless a query
//! opts in with a wildcard.
//!
//! An expression packs into 64 bits:
//!
//! | bits   | field                                               |
//! |--------|-----------------------------------------------------|
//! | 0..32  | key payload (entity slot / object hash / key hash)  |
//! | 32..48 | component type id                                   |
//! | 48..56 | key kind                                            |
//! | 56..64 | key qualifier (target generation or key type id)    |

use crate::identity::{self, Identity, IdentityKind, WorldIndex};
use crate::storage::component::{Component, ComponentTypeId};
use std::fmt::{self, Debug, Display};

const PAYLOAD_MASK: u64 = 0xFFFF_FFFF;
const TYPE_SHIFT: u64 = 32;
const KIND_SHIFT: u64 = 48;
const QUAL_SHIFT: u64 = 56;

mod kind {
    pub const PLAIN: u8 = 0;
    pub const ENTITY: u8 = 1;
    pub const OBJECT: u8 = 2;
    pub const HASH: u8 = 3;
    pub const ANY_OBJECT: u8 = 0xFA;
    pub const ANY_ENTITY: u8 = 0xFB;
    pub const ANY_TARGET: u8 = 0xFC;
    pub const ANY: u8 = 0xFD;
}

/// The secondary key of a type expression, in unpacked form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SecondaryKey {
    /// No key: the plain form of the component.
    None,
    /// A relation to a target entity.
    Entity(Identity),
    /// A link to an external object, by hash identity.
    Object(Identity),
    /// A strongly-typed hash key.
    Hash(Identity),
    /// Matches any key, including plain.
    Any,
    /// Matches any non-plain key.
    AnyTarget,
    /// Matches any entity-relation key.
    AnyEntity,
    /// Matches any object-link key.
    AnyObject,
}

impl From<Identity> for SecondaryKey {
    fn from(id: Identity) -> Self {
        match id.kind() {
            IdentityKind::None => SecondaryKey::None,
            IdentityKind::Entity => SecondaryKey::Entity(id),
            IdentityKind::Object => SecondaryKey::Object(id),
            IdentityKind::Hash => SecondaryKey::Hash(id),
            IdentityKind::Wildcard => match id.wildcard_kind() {
                Some(identity::wild::ANY) => SecondaryKey::Any,
                Some(identity::wild::ANY_TARGET) => SecondaryKey::AnyTarget,
                Some(identity::wild::ANY_ENTITY) => SecondaryKey::AnyEntity,
                Some(identity::wild::ANY_OBJECT) => SecondaryKey::AnyObject,
                _ => SecondaryKey::None,
            },
        }
    }
}

/// A packed (component type, secondary key) pair naming one component slot,
/// or, with a wildcard key, a family of slots.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TypeExpression(u64);

impl TypeExpression {
    /// The plain expression for component type `T`.
    pub fn of<T: Component>() -> Self {
        Self::from_parts(ComponentTypeId::of::<T>(), SecondaryKey::None)
    }

    /// The expression for component type `T` under the given key.
    pub fn with_key<T: Component>(key: SecondaryKey) -> Self {
        Self::from_parts(ComponentTypeId::of::<T>(), key)
    }

    /// The relation expression for component type `T` targeting `target`.
    pub fn rel<T: Component>(target: Identity) -> Self {
        Self::with_key::<T>(SecondaryKey::Entity(target))
    }

    /// Wildcard: `T` under any key, including plain.
    pub fn any<T: Component>() -> Self {
        Self::with_key::<T>(SecondaryKey::Any)
    }

    /// Wildcard: `T` under any non-plain key.
    pub fn any_target<T: Component>() -> Self {
        Self::with_key::<T>(SecondaryKey::AnyTarget)
    }

    /// Wildcard: `T` under any entity-relation key.
    pub fn any_entity<T: Component>() -> Self {
        Self::with_key::<T>(SecondaryKey::AnyEntity)
    }

    /// Wildcard: `T` under any object-link key.
    pub fn any_object<T: Component>() -> Self {
        Self::with_key::<T>(SecondaryKey::AnyObject)
    }

    /// Builds an expression from a component type id and an unpacked key.
    ///
    /// Entity keys keep the target's slot and generation; the target's
    /// world index is not stored and is re-attached by the world decoding
    /// the key.
    pub fn from_parts(component_type: ComponentTypeId, key: SecondaryKey) -> Self {
        let (key_kind, payload, qualifier) = match key {
            SecondaryKey::None => (kind::PLAIN, 0, 0),
            SecondaryKey::Entity(id) => {
                debug_assert_eq!(id.kind(), IdentityKind::Entity);
                (kind::ENTITY, id.index(), id.generation())
            }
            SecondaryKey::Object(id) => {
                debug_assert_eq!(id.kind(), IdentityKind::Object);
                (kind::OBJECT, id.index(), id.generation())
            }
            SecondaryKey::Hash(id) => {
                debug_assert_eq!(id.kind(), IdentityKind::Hash);
                (kind::HASH, id.index(), id.generation())
            }
            SecondaryKey::Any => (kind::ANY, 0, 0),
            SecondaryKey::AnyTarget => (kind::ANY_TARGET, 0, 0),
            SecondaryKey::AnyEntity => (kind::ANY_ENTITY, 0, 0),
            SecondaryKey::AnyObject => (kind::ANY_OBJECT, 0, 0),
        };
        TypeExpression(
            payload as u64
                | ((component_type.raw() as u64) << TYPE_SHIFT)
                | ((key_kind as u64) << KIND_SHIFT)
                | ((qualifier as u64) << QUAL_SHIFT),
        )
    }

    /// The primary component type of the expression.
    pub fn component_type(self) -> ComponentTypeId {
        ComponentTypeId::from_raw(((self.0 >> TYPE_SHIFT) & 0xFFFF) as u16)
    }

    fn key_kind(self) -> u8 {
        ((self.0 >> KIND_SHIFT) & 0xFF) as u8
    }

    fn payload(self) -> u32 {
        (self.0 & PAYLOAD_MASK) as u32
    }

    fn qualifier(self) -> u8 {
        ((self.0 >> QUAL_SHIFT) & 0xFF) as u8
    }

    /// Returns `true` if the expression carries a wildcard key. Wildcard
    /// expressions appear only in queries, never in archetype signatures.
    pub fn is_wildcard(self) -> bool {
        self.key_kind() >= kind::ANY_OBJECT
    }

    /// Returns `true` if the expression is the plain (keyless) form.
    pub fn is_plain(self) -> bool {
        self.key_kind() == kind::PLAIN
    }

    /// Decodes the secondary key, re-attaching `world` to entity-relation
    /// targets.
    pub fn key(self, world: WorldIndex) -> SecondaryKey {
        match self.key_kind() {
            kind::PLAIN => SecondaryKey::None,
            kind::ENTITY => {
                SecondaryKey::Entity(Identity::entity(world, self.payload(), self.qualifier()))
            }
            kind::OBJECT => SecondaryKey::Object(Identity::object_raw(
                self.payload(),
                self.qualifier(),
            )),
            kind::HASH => {
                SecondaryKey::Hash(Identity::hash_raw(self.payload(), self.qualifier()))
            }
            kind::ANY => SecondaryKey::Any,
            kind::ANY_TARGET => SecondaryKey::AnyTarget,
            kind::ANY_ENTITY => SecondaryKey::AnyEntity,
            kind::ANY_OBJECT => SecondaryKey::AnyObject,
            _ => SecondaryKey::None,
        }
    }

    /// Returns `true` if this (possibly wildcard) query expression matches
    /// the given stored expression.
    ///
    /// The relation is non-commutative: the stored side is always concrete,
    /// the query side chooses how wide to match. The component type must be
    /// equal in all cases.
    pub fn matches(self, stored: TypeExpression) -> bool {
        debug_assert!(!stored.is_wildcard(), "wildcards are never stored");
        if self.component_type() != stored.component_type() {
            return false;
        }
        match self.key_kind() {
            kind::PLAIN => stored.key_kind() == kind::PLAIN,
            kind::ENTITY | kind::OBJECT | kind::HASH => self.0 == stored.0,
            kind::ANY => true,
            kind::ANY_TARGET => stored.key_kind() != kind::PLAIN,
            kind::ANY_ENTITY => stored.key_kind() == kind::ENTITY,
            kind::ANY_OBJECT => stored.key_kind() == kind::OBJECT,
            _ => false,
        }
    }

    /// The raw packed bits.
    pub fn bits(self) -> u64 {
        self.0
    }
}

// The signature sort order: by component type, then key kind, then key
// payload, then qualifier.
impl Ord for TypeExpression {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (
            self.component_type(),
            self.key_kind(),
            self.payload(),
            self.qualifier(),
        )
            .cmp(&(
                other.component_type(),
                other.key_kind(),
                other.payload(),
                other.qualifier(),
            ))
    }
}

impl PartialOrd for TypeExpression {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for TypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.component_type().name();
        match self.key_kind() {
            kind::PLAIN => f.write_str(name),
            kind::ENTITY => write!(f, "{}({}#{})", name, self.payload(), self.qualifier()),
            kind::OBJECT => write!(f, "{}(obj:{:08x})", name, self.payload()),
            kind::HASH => write!(f, "{}(key:{:08x})", name, self.payload()),
            kind::ANY => write!(f, "{}(*)", name),
            kind::ANY_TARGET => write!(f, "{}(*target)", name),
            kind::ANY_ENTITY => write!(f, "{}(*entity)", name),
            kind::ANY_OBJECT => write!(f, "{}(*object)", name),
            _ => write!(f, "{}(?)", name),
        }
    }
}

impl Debug for TypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeExpression({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Likes;

    #[test]
    fn expression_is_64_bits() {
        assert_eq!(std::mem::size_of::<TypeExpression>(), 8);
    }

    #[test]
    fn plain_matches_only_plain() {
        let plain = TypeExpression::of::<Likes>();
        let rel = TypeExpression::rel::<Likes>(Identity::entity(0, 4, 1));

        assert!(plain.matches(plain));
        assert!(!plain.matches(rel));
    }

    #[test]
    fn any_matches_everything_of_its_type() {
        let any = TypeExpression::any::<Likes>();
        let plain = TypeExpression::of::<Likes>();
        let rel = TypeExpression::rel::<Likes>(Identity::entity(0, 4, 1));
        let link = TypeExpression::with_key::<Likes>(SecondaryKey::Object(
            Identity::object_link(&"door"),
        ));

        assert!(any.matches(plain));
        assert!(any.matches(rel));
        assert!(any.matches(link));
        assert!(!any.matches(TypeExpression::of::<Position>()));
    }

    #[test]
    fn any_target_excludes_plain() {
        let any_target = TypeExpression::any_target::<Likes>();
        let plain = TypeExpression::of::<Likes>();
        let rel = TypeExpression::rel::<Likes>(Identity::entity(0, 4, 1));
        let link = TypeExpression::with_key::<Likes>(SecondaryKey::Object(
            Identity::object_link(&"door"),
        ));

        assert!(!any_target.matches(plain));
        assert!(any_target.matches(rel));
        assert!(any_target.matches(link));
    }

    #[test]
    fn entity_keys_match_exactly() {
        let a = TypeExpression::rel::<Likes>(Identity::entity(0, 4, 1));
        let a2 = TypeExpression::rel::<Likes>(Identity::entity(0, 4, 1));
        let b = TypeExpression::rel::<Likes>(Identity::entity(0, 5, 1));
        let stale = TypeExpression::rel::<Likes>(Identity::entity(0, 4, 2));

        assert!(a.matches(a2));
        assert!(!a.matches(b));
        assert!(!a.matches(stale));
    }

    #[test]
    fn any_entity_excludes_object_links() {
        let any_entity = TypeExpression::any_entity::<Likes>();
        let rel = TypeExpression::rel::<Likes>(Identity::entity(0, 4, 1));
        let link = TypeExpression::with_key::<Likes>(SecondaryKey::Object(
            Identity::object_link(&"door"),
        ));

        assert!(any_entity.matches(rel));
        assert!(!any_entity.matches(link));
        assert!(TypeExpression::any_object::<Likes>().matches(link));
        assert!(!TypeExpression::any_object::<Likes>().matches(rel));
    }

    #[test]
    fn ordering_groups_by_component_type() {
        let plain = TypeExpression::of::<Likes>();
        let rel_a = TypeExpression::rel::<Likes>(Identity::entity(0, 1, 1));
        let rel_b = TypeExpression::rel::<Likes>(Identity::entity(0, 2, 1));

        assert!(plain < rel_a);
        assert!(rel_a < rel_b);
    }

    #[test]
    fn key_round_trips() {
        let target = Identity::entity(7, 42, 3);
        let rel = TypeExpression::rel::<Likes>(target);
        assert_eq!(rel.key(7), SecondaryKey::Entity(target));
        assert_eq!(TypeExpression::of::<Likes>().key(7), SecondaryKey::None);
    }
}
