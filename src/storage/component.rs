//! Contains types related to component types and their process-wide
//! registration.
//!
//! Component types are assigned small monotonic ids the first time they are
//! seen so that type information fits inside packed type expressions. The
//! registry also records, for each component type, a constructor for its
//! erased storage column, which archetypes use to build their columns
//! without knowing concrete types.

use super::ErasedColumn;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

/// A marker trait for all types which can be attached to an entity as a
/// component value.
///
/// This trait has a blanket impl for all applicable types.
pub trait Component: 'static + Sized + Send + Sync {}
impl<T: 'static + Sized + Send + Sync> Component for T {}

/// A unique, process-wide id for a component type. Ids are assigned
/// monotonically at first use and are stable for the lifetime of the
/// process.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct ComponentTypeId(pub(crate) u16);

impl ComponentTypeId {
    /// Returns the component type id for `T`, registering it on first use.
    pub fn of<T: Component>() -> Self {
        let registry = components();
        let type_id = TypeId::of::<T>();
        if let Some(&id) = registry.read().by_type.get(&type_id) {
            return ComponentTypeId(id);
        }

        let mut registry = registry.write();
        let next = registry.entries.len();
        assert!(next <= u16::MAX as usize, "component type space exhausted");
        let id = *registry.by_type.entry(type_id).or_insert(next as u16);
        if id as usize == next {
            registry.entries.push(ComponentEntry {
                name: std::any::type_name::<T>(),
                new_column: new_column_of::<T>,
            });
        }
        ComponentTypeId(id)
    }

    /// The type name recorded at registration.
    pub fn name(self) -> &'static str {
        components().read().entries[self.0 as usize].name
    }

    pub(crate) fn raw(self) -> u16 {
        self.0
    }

    pub(crate) fn from_raw(raw: u16) -> Self {
        ComponentTypeId(raw)
    }
}

impl Display for ComponentTypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A unique, process-wide id for a type used as an object-link or hash-key
/// type. Key type ids share one byte of the packed identity encoding.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct KeyTypeId(pub(crate) u8);

impl KeyTypeId {
    /// Returns the key type id for `T`, registering it on first use.
    pub fn of<T: 'static>() -> Self {
        let registry = key_types();
        let type_id = TypeId::of::<T>();
        if let Some(&id) = registry.read().get(&type_id) {
            return KeyTypeId(id);
        }

        let mut registry = registry.write();
        let next = registry.len();
        assert!(next < u8::MAX as usize, "key type space exhausted");
        let id = *registry.entry(type_id).or_insert(next as u8);
        KeyTypeId(id)
    }
}

/// Constructs a new empty erased column for the given component type.
pub(crate) fn new_column(type_id: ComponentTypeId) -> Box<dyn ErasedColumn> {
    let constructor = components().read().entries[type_id.0 as usize].new_column;
    constructor()
}

fn new_column_of<T: Component>() -> Box<dyn ErasedColumn> {
    Box::new(super::Column::<T>::default())
}

struct ComponentEntry {
    name: &'static str,
    new_column: fn() -> Box<dyn ErasedColumn>,
}

#[derive(Default)]
struct ComponentRegistry {
    by_type: HashMap<TypeId, u16>,
    entries: Vec<ComponentEntry>,
}

fn components() -> &'static RwLock<ComponentRegistry> {
    static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(ComponentRegistry::default()))
}

fn key_types() -> &'static RwLock<HashMap<TypeId, u8>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TypeId, u8>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn ids_are_stable() {
        assert_eq!(ComponentTypeId::of::<Alpha>(), ComponentTypeId::of::<Alpha>());
        assert_ne!(ComponentTypeId::of::<Alpha>(), ComponentTypeId::of::<Beta>());
    }

    #[test]
    fn names_are_recorded() {
        assert!(ComponentTypeId::of::<Alpha>().name().ends_with("Alpha"));
    }

    #[test]
    fn key_type_ids_are_stable() {
        assert_eq!(KeyTypeId::of::<Alpha>(), KeyTypeId::of::<Alpha>());
        assert_ne!(KeyTypeId::of::<Alpha>(), KeyTypeId::of::<Beta>());
    }

    #[test]
    fn constructed_columns_are_empty() {
        let column = new_column(ComponentTypeId::of::<u32>());
        assert_eq!(column.len(), 0);
    }
}
