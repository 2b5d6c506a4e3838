//! Packed 64-bit identities.
//!
//! An [Identity] is an opaque handle discriminating five kinds of value:
//! live entities, object links, typed hash keys, query wildcards and the
//! null identity. All kinds share one bit layout so that identities can be
//! stored, compared and hashed as plain integers:
//!
//! | bits   | field                                                      |
//! |--------|------------------------------------------------------------|
//! | 0..32  | index: entity slot, object hash or key hash                |
//! | 32..40 | world index (0..=254), or 255 for globals                  |
//! | 40..48 | flags                                                      |
//! | 48..56 | secondary-key tag                                          |
//! | 56..64 | generation (entities), key type id (links), wildcard kind  |

use crate::error::EcsError;
use crate::storage::component::KeyTypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};

/// The index of a world within the process, 0..=254.
pub type WorldIndex = u8;

/// An entity generation. Live entities always have a non-zero generation.
pub type Generation = u8;

const INDEX_MASK: u64 = 0xFFFF_FFFF;
const WORLD_SHIFT: u64 = 32;
const FLAGS_SHIFT: u64 = 40;
const TAG_SHIFT: u64 = 48;
const GEN_SHIFT: u64 = 56;

/// World byte used by identities which do not belong to any world.
pub(crate) const WORLD_GLOBAL: u8 = 0xFF;

const FLAG_WILDCARD: u8 = 0b1;

/// The largest generation value. Generations cycle through 1..=254.
pub const MAX_GENERATION: Generation = 255;

/// Secondary-key tags. Tag 0 is reserved for the null identity.
pub(crate) mod tag {
    pub const ENTITY: u8 = 1;
    pub const OBJECT: u8 = 2;
    pub const HASH: u8 = 3;
}

/// Wildcard kinds stored in the generation byte of global identities.
pub(crate) mod wild {
    pub const ANY: u8 = 1;
    pub const ANY_TARGET: u8 = 2;
    pub const ANY_ENTITY: u8 = 3;
    pub const ANY_OBJECT: u8 = 4;
    pub const PLAIN: u8 = 5;
}

/// Advances a generation, wrapping within 1..=254 so that a live entity
/// never carries generation zero.
pub(crate) fn next_generation(generation: Generation) -> Generation {
    (generation % (MAX_GENERATION - 1)) + 1
}

/// The logical kind of an [Identity].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// The null identity.
    None,
    /// A live entity slot plus generation.
    Entity,
    /// A hashed link to an external object.
    Object,
    /// A strongly-typed hash key.
    Hash,
    /// A match-only query wildcard.
    Wildcard,
}

impl Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityKind::None => "none",
            IdentityKind::Entity => "entity",
            IdentityKind::Object => "object",
            IdentityKind::Hash => "hash",
            IdentityKind::Wildcard => "wildcard",
        };
        f.write_str(name)
    }
}

/// An opaque 64-bit identifier for an entity, object link, hash key or
/// query wildcard.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Identity(u64);

impl Identity {
    /// The null identity.
    pub const NONE: Identity = Identity(0);

    /// Matches any secondary key, including plain.
    pub const ANY: Identity = Identity::wildcard(wild::ANY);

    /// Matches any non-plain secondary key.
    pub const ANY_TARGET: Identity = Identity::wildcard(wild::ANY_TARGET);

    /// Matches any entity-relation secondary key.
    pub const ANY_ENTITY: Identity = Identity::wildcard(wild::ANY_ENTITY);

    /// Matches any object-link secondary key.
    pub const ANY_OBJECT: Identity = Identity::wildcard(wild::ANY_OBJECT);

    /// Matches only the plain (keyless) form of a component.
    pub const ANY_PLAIN: Identity = Identity::wildcard(wild::PLAIN);

    const fn wildcard(kind: u8) -> Identity {
        Identity(
            ((WORLD_GLOBAL as u64) << WORLD_SHIFT)
                | ((FLAG_WILDCARD as u64) << FLAGS_SHIFT)
                | ((kind as u64) << GEN_SHIFT),
        )
    }

    /// Constructs an entity identity from its world, slot and generation.
    pub fn entity(world: WorldIndex, slot: u32, generation: Generation) -> Identity {
        debug_assert!(world != WORLD_GLOBAL, "world index 255 is reserved");
        debug_assert!(generation != 0, "live entities have non-zero generations");
        Identity(
            slot as u64
                | ((world as u64) << WORLD_SHIFT)
                | ((tag::ENTITY as u64) << TAG_SHIFT)
                | ((generation as u64) << GEN_SHIFT),
        )
    }

    /// Constructs an object-link identity from the hash of an external
    /// object. The link stores only the object's hash-derived identity and
    /// never dereferences the object itself.
    pub fn object_link<T: Hash + 'static>(object: &T) -> Identity {
        let key_type = KeyTypeId::of::<T>();
        Identity(
            hash32(object) as u64
                | ((WORLD_GLOBAL as u64) << WORLD_SHIFT)
                | ((tag::OBJECT as u64) << TAG_SHIFT)
                | ((key_type.0 as u64) << GEN_SHIFT),
        )
    }

    /// Constructs a strongly-typed hash key identity.
    pub fn hash_key<K: Hash + 'static>(key: &K) -> Identity {
        let key_type = KeyTypeId::of::<K>();
        Identity(
            hash32(key) as u64
                | ((WORLD_GLOBAL as u64) << WORLD_SHIFT)
                | ((tag::HASH as u64) << TAG_SHIFT)
                | ((key_type.0 as u64) << GEN_SHIFT),
        )
    }

    /// Reconstructs an object-link identity from its packed parts.
    pub(crate) fn object_raw(hash: u32, key_type: u8) -> Identity {
        Identity(
            hash as u64
                | ((WORLD_GLOBAL as u64) << WORLD_SHIFT)
                | ((tag::OBJECT as u64) << TAG_SHIFT)
                | ((key_type as u64) << GEN_SHIFT),
        )
    }

    /// Reconstructs a hash-key identity from its packed parts.
    pub(crate) fn hash_raw(hash: u32, key_type: u8) -> Identity {
        Identity(
            hash as u64
                | ((WORLD_GLOBAL as u64) << WORLD_SHIFT)
                | ((tag::HASH as u64) << TAG_SHIFT)
                | ((key_type as u64) << GEN_SHIFT),
        )
    }

    /// Returns the logical kind of this identity.
    pub fn kind(self) -> IdentityKind {
        if self.0 == 0 {
            IdentityKind::None
        } else if self.flags() & FLAG_WILDCARD != 0 {
            IdentityKind::Wildcard
        } else if self.world() != WORLD_GLOBAL {
            IdentityKind::Entity
        } else {
            match self.key_tag() {
                tag::OBJECT => IdentityKind::Object,
                tag::HASH => IdentityKind::Hash,
                _ => IdentityKind::None,
            }
        }
    }

    /// The entity slot, object hash or key hash.
    pub fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    /// The world index, or 255 for global identities.
    pub fn world(self) -> WorldIndex {
        ((self.0 >> WORLD_SHIFT) & 0xFF) as u8
    }

    fn flags(self) -> u8 {
        ((self.0 >> FLAGS_SHIFT) & 0xFF) as u8
    }

    pub(crate) fn key_tag(self) -> u8 {
        ((self.0 >> TAG_SHIFT) & 0xFF) as u8
    }

    /// The generation byte. Only meaningful for entities; for object links
    /// and hash keys this byte holds the key type id, and for wildcards the
    /// wildcard kind.
    pub fn generation(self) -> Generation {
        ((self.0 >> GEN_SHIFT) & 0xFF) as u8
    }

    pub(crate) fn wildcard_kind(self) -> Option<u8> {
        if self.kind() == IdentityKind::Wildcard {
            Some(self.generation())
        } else {
            None
        }
    }

    /// Returns `true` for the null identity.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns the identity that will be assigned to this entity's slot the
    /// next time it is recycled. Generations cycle through 1..=254 and are
    /// never zero, so a despawned handle can always be told apart from its
    /// successor.
    pub fn successor(self) -> Result<Identity, EcsError> {
        match self.kind() {
            IdentityKind::Entity => Ok(Identity::entity(
                self.world(),
                self.index(),
                next_generation(self.generation()),
            )),
            kind => Err(EcsError::InvalidIdentityKind(kind)),
        }
    }

    /// The raw packed bits.
    pub fn bits(self) -> u64 {
        self.0
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity::NONE
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            IdentityKind::None => f.write_str("-"),
            IdentityKind::Entity => write!(f, "{}#{}", self.index(), self.generation()),
            IdentityKind::Object => write!(f, "obj:{}:{:08x}", self.generation(), self.index()),
            IdentityKind::Hash => write!(f, "key:{}:{:08x}", self.generation(), self.index()),
            IdentityKind::Wildcard => {
                let name = match self.generation() {
                    wild::ANY => "*",
                    wild::ANY_TARGET => "*target",
                    wild::ANY_ENTITY => "*entity",
                    wild::ANY_OBJECT => "*object",
                    wild::PLAIN => "*plain",
                    _ => "*?",
                };
                f.write_str(name)
            }
        }
    }
}

impl Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}, {:#018x})", self, self.0)
    }
}

fn hash32<T: Hash>(value: &T) -> u32 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    let hash = hasher.finish();
    (hash ^ (hash >> 32)) as u32
}
