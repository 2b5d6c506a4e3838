//! Contains the [World] entity collection and the deferred-mutation lock.

use crate::command::{DeferredOp, ErasedComponent};
use crate::error::EcsError;
use crate::expression::{SecondaryKey, TypeExpression};
use crate::hash::U64HasherBuilder;
use crate::identity::{next_generation, Generation, Identity, IdentityKind, WorldIndex};
use crate::query::QueryBuilder;
use crate::signature::Signature;
use crate::storage::archetype::{Archetype, ArchetypeIndex};
use crate::storage::component::Component;
use crate::storage::{Column, ErasedColumn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, trace, warn};

static WORLD_COUNTER: AtomicU32 = AtomicU32::new(0);

fn next_world_index() -> WorldIndex {
    // 255 is the global sentinel and never a world index.
    (WORLD_COUNTER.fetch_add(1, Ordering::Relaxed) % 255) as WorldIndex
}

const EMPTY_ARCHETYPE: ArchetypeIndex = ArchetypeIndex(0);

type ExpressionMap<V> = HashMap<TypeExpression, V, U64HasherBuilder>;

/// The storage location of an entity's data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntityLocation(ArchetypeIndex, usize);

impl EntityLocation {
    /// Returns the entity's archetype index.
    pub fn archetype(&self) -> ArchetypeIndex {
        self.0
    }

    /// Returns the entity's row within its archetype.
    pub fn row(&self) -> usize {
        self.1
    }
}

/// Allocates entity slots and tracks which (slot, generation) pairs are
/// live. Slots are recycled with an advanced generation so stale handles
/// can always be detected.
#[derive(Debug, Default)]
struct EntityPool {
    generations: Vec<Generation>,
    alive: Vec<bool>,
    free: Vec<u32>,
    live: usize,
}

impl EntityPool {
    fn allocate(&mut self) -> (u32, Generation) {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            self.alive[slot as usize] = true;
            (slot, self.generations[slot as usize])
        } else {
            let slot = self.generations.len() as u32;
            self.generations.push(1);
            self.alive.push(true);
            (slot, 1)
        }
    }

    fn release(&mut self, slot: u32) {
        let index = slot as usize;
        debug_assert!(self.alive[index]);
        self.generations[index] = next_generation(self.generations[index]);
        self.alive[index] = false;
        self.free.push(slot);
        self.live -= 1;
    }

    fn is_alive(&self, slot: u32, generation: Generation) -> bool {
        let index = slot as usize;
        index < self.generations.len() && self.alive[index] && self.generations[index] == generation
    }
}

/// A map of entity slots to their storage locations.
#[derive(Debug, Default)]
struct LocationMap {
    slots: Vec<Option<EntityLocation>>,
}

impl LocationMap {
    fn set(&mut self, slot: u32, location: EntityLocation) {
        let index = slot as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(location);
    }

    fn get(&self, slot: u32) -> Option<EntityLocation> {
        *self.slots.get(slot as usize)?
    }

    fn clear(&mut self, slot: u32) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            *entry = None;
        }
    }
}

/// A collection of entities and their components.
///
/// The world owns every archetype, mediates all structural changes, and
/// interns archetypes by signature so that each signature maps to exactly
/// one archetype. Structural operations require `&mut World`; while a
/// [WorldLock] is held they are queued instead and applied in FIFO order
/// when the last lock is released.
pub struct World {
    index: WorldIndex,
    pool: Mutex<EntityPool>,
    locations: LocationMap,
    archetypes: Vec<Archetype>,
    archetype_index: HashMap<Signature, ArchetypeIndex>,
    add_edges: Vec<ExpressionMap<ArchetypeIndex>>,
    remove_edges: Vec<ExpressionMap<ArchetypeIndex>>,
    deferred: Mutex<VecDeque<DeferredOp>>,
    lock_count: AtomicU32,
    spawn_buffer: Vec<Identity>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Constructs a new empty world.
    pub fn new() -> Self {
        let mut world = World {
            index: next_world_index(),
            pool: Mutex::new(EntityPool::default()),
            locations: LocationMap::default(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            add_edges: Vec::new(),
            remove_edges: Vec::new(),
            deferred: Mutex::new(VecDeque::new()),
            lock_count: AtomicU32::new(0),
            spawn_buffer: Vec::new(),
        };
        let empty = world.get_or_create_archetype(Signature::empty());
        debug_assert_eq!(empty, EMPTY_ARCHETYPE);
        world
    }

    /// The index of this world within the process.
    pub fn index(&self) -> WorldIndex {
        self.index
    }

    /// The number of live entities.
    pub fn len(&self) -> usize {
        self.pool.lock().live
    }

    /// Returns `true` if the world contains no live entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All archetypes, indexable by [ArchetypeIndex].
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    /// Starts building a query against this world.
    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Returns `true` if `entity` refers to a live entity of this world.
    pub fn is_alive(&self, entity: Identity) -> bool {
        entity.kind() == IdentityKind::Entity
            && entity.world() == self.index
            && self
                .pool
                .lock()
                .is_alive(entity.index(), entity.generation())
    }

    /// Returns the archetype and row currently holding the entity's data.
    /// The location is invalidated by any structural change affecting the
    /// entity or its archetype.
    pub fn location_of(&self, entity: Identity) -> Result<EntityLocation, EcsError> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotAlive(entity));
        }
        self.locations
            .get(entity.index())
            .ok_or(EcsError::EntityNotAlive(entity))
    }

    fn reserve(&self) -> Identity {
        let (slot, generation) = self.pool.lock().allocate();
        Identity::entity(self.index, slot, generation)
    }

    fn insert_reserved(&mut self, entity: Identity) {
        let row = self.archetypes[EMPTY_ARCHETYPE].push(entity);
        self.locations
            .set(entity.index(), EntityLocation(EMPTY_ARCHETYPE, row));
    }

    /// Spawns a new entity with no components.
    pub fn spawn(&mut self) -> Identity {
        let entity = self.reserve();
        self.insert_reserved(entity);
        trace!(entity = %entity, "spawned entity");
        entity
    }

    /// Spawns `count` entities, returning their identities. The returned
    /// slice is valid until the next `spawn_n` call.
    pub fn spawn_n(&mut self, count: usize) -> &[Identity] {
        self.spawn_buffer.clear();
        for _ in 0..count {
            let entity = self.reserve();
            self.insert_reserved(entity);
            self.spawn_buffer.push(entity);
        }
        trace!(count, "spawned entities");
        &self.spawn_buffer
    }

    /// Despawns an entity, removing its row and recycling its slot under
    /// an advanced generation.
    pub fn despawn(&mut self, entity: Identity) -> Result<(), EcsError> {
        let location = self.location_of(entity)?;
        self.remove_row(location);
        self.locations.clear(entity.index());
        self.pool.get_mut().release(entity.index());
        trace!(entity = %entity, "despawned entity");
        Ok(())
    }

    fn remove_row(&mut self, location: EntityLocation) {
        let swapped = self.archetypes[location.archetype()].swap_remove(location.row());
        if let Some(swapped) = swapped {
            self.locations.set(swapped.index(), location);
        }
    }

    /// Adds a component value to an entity under the given secondary key,
    /// migrating the entity to the archetype with the grown signature.
    pub fn add_component<T: Component>(
        &mut self,
        entity: Identity,
        key: SecondaryKey,
        value: T,
    ) -> Result<(), EcsError> {
        let expr = TypeExpression::with_key::<T>(key);
        self.add_with(entity, expr, move |column| {
            column
                .downcast_mut::<Column<T>>()
                .expect("archetype column diverged from its signature")
                .push(value)
        })
    }

    /// Adds a dynamically-typed component value. Fails with
    /// [EcsError::NullComponentValue] if the value is not of the component
    /// type named by `expr`.
    pub fn add_component_erased(
        &mut self,
        entity: Identity,
        expr: TypeExpression,
        value: Box<dyn ErasedComponent>,
    ) -> Result<(), EcsError> {
        if value.component_type() != expr.component_type() {
            return Err(EcsError::NullComponentValue(expr));
        }
        self.add_with(entity, expr, move |column| value.push_into(column))
    }

    fn add_with(
        &mut self,
        entity: Identity,
        expr: TypeExpression,
        fill: impl FnOnce(&mut dyn ErasedColumn),
    ) -> Result<(), EcsError> {
        if expr.is_wildcard() {
            return Err(EcsError::WildcardNotStorable(expr));
        }
        let location = self.location_of(entity)?;
        let src = location.archetype();
        if self.archetypes[src].signature().contains(expr) {
            return Err(EcsError::ComponentAlreadyPresent(expr));
        }
        let dst = self.add_edge(src, expr);
        self.move_entity(location, dst);
        let column = self.archetypes[dst]
            .signature()
            .position(expr)
            .expect("destination archetype missing the added expression");
        self.archetypes[dst].fill_column(column, fill);
        if cfg!(debug_assertions) {
            self.archetypes[src].validate_coherence();
            self.archetypes[dst].validate_coherence();
        }
        Ok(())
    }

    /// Removes the component stored under the given secondary key,
    /// migrating the entity to the archetype with the shrunk signature.
    pub fn remove_component<T: Component>(
        &mut self,
        entity: Identity,
        key: SecondaryKey,
    ) -> Result<(), EcsError> {
        self.remove_component_expr(entity, TypeExpression::with_key::<T>(key))
    }

    /// Removes the component stored under `expr`.
    pub fn remove_component_expr(
        &mut self,
        entity: Identity,
        expr: TypeExpression,
    ) -> Result<(), EcsError> {
        let location = self.location_of(entity)?;
        let src = location.archetype();
        if !self.archetypes[src].signature().contains(expr) {
            return Err(EcsError::ComponentNotPresent(expr));
        }
        let dst = self.remove_edge(src, expr);
        self.move_entity(location, dst);
        if cfg!(debug_assertions) {
            self.archetypes[src].validate_coherence();
            self.archetypes[dst].validate_coherence();
        }
        Ok(())
    }

    /// Returns a reference to the component stored under the given key.
    pub fn get_component<T: Component>(
        &self,
        entity: Identity,
        key: SecondaryKey,
    ) -> Result<&T, EcsError> {
        let expr = TypeExpression::with_key::<T>(key);
        let location = self.location_of(entity)?;
        let archetype = &self.archetypes[location.archetype()];
        let column = archetype
            .signature()
            .position(expr)
            .ok_or(EcsError::ComponentNotPresent(expr))?;
        let slice = archetype
            .typed_slice::<T>(column)
            .expect("archetype column diverged from its signature");
        Ok(&slice[location.row()])
    }

    /// Returns a mutable reference to the component stored under the given
    /// key. The reference is invalidated by any structural change affecting
    /// the entity's archetype.
    pub fn get_component_mut<T: Component>(
        &mut self,
        entity: Identity,
        key: SecondaryKey,
    ) -> Result<&mut T, EcsError> {
        let expr = TypeExpression::with_key::<T>(key);
        let location = self.location_of(entity)?;
        let archetype = &mut self.archetypes[location.archetype()];
        let column = archetype
            .signature()
            .position(expr)
            .ok_or(EcsError::ComponentNotPresent(expr))?;
        archetype
            .typed_column_mut::<T>(column)
            .expect("archetype column diverged from its signature")
            .get_mut(location.row())
    }

    /// Returns `true` if the entity is alive and has a component under the
    /// given key.
    pub fn has_component<T: Component>(&self, entity: Identity, key: SecondaryKey) -> bool {
        self.get_component::<T>(entity, key).is_ok()
    }

    /// Returns every component of type `T` on the entity whose expression
    /// is matched by the (possibly wildcard) query expression, together
    /// with the matched expressions.
    pub fn get_all<T: Component>(
        &self,
        entity: Identity,
        query: TypeExpression,
    ) -> Result<Vec<(TypeExpression, &T)>, EcsError> {
        let location = self.location_of(entity)?;
        let archetype = &self.archetypes[location.archetype()];
        let mut values = Vec::new();
        for column in archetype.match_columns(query) {
            if let Some(slice) = archetype.typed_slice::<T>(column) {
                values.push((archetype.signature().exprs()[column], &slice[location.row()]));
            }
        }
        Ok(values)
    }

    /// Returns the signature of the entity's archetype.
    pub fn signature_of(&self, entity: Identity) -> Result<&Signature, EcsError> {
        let location = self.location_of(entity)?;
        Ok(self.archetypes[location.archetype()].signature())
    }

    /// Despawns rows from the end of an archetype until it holds at most
    /// `max_rows`.
    pub fn truncate_archetype(&mut self, archetype: ArchetypeIndex, max_rows: usize) {
        while self.archetypes[archetype].len() > max_rows {
            let entity = *self.archetypes[archetype]
                .entities()
                .last()
                .expect("archetype with rows has a last entity");
            self.despawn(entity)
                .expect("archetype row referenced a dead entity");
        }
    }

    /// Returns the archetype interned for `signature`, creating it on
    /// first use.
    pub fn get_or_create_archetype(&mut self, signature: Signature) -> ArchetypeIndex {
        if let Some(&index) = self.archetype_index.get(&signature) {
            return index;
        }
        let index = ArchetypeIndex(self.archetypes.len() as u32);
        debug!(archetype = index.0, signature = %signature, "created archetype");
        self.archetypes.push(Archetype::new(index, signature.clone()));
        self.archetype_index.insert(signature, index);
        self.add_edges.push(ExpressionMap::default());
        self.remove_edges.push(ExpressionMap::default());
        index
    }

    fn add_edge(&mut self, src: ArchetypeIndex, expr: TypeExpression) -> ArchetypeIndex {
        if let Some(&dst) = self.add_edges[src.0 as usize].get(&expr) {
            return dst;
        }
        let signature = self.archetypes[src].signature().with(expr);
        let dst = self.get_or_create_archetype(signature);
        self.add_edges[src.0 as usize].insert(expr, dst);
        dst
    }

    fn remove_edge(&mut self, src: ArchetypeIndex, expr: TypeExpression) -> ArchetypeIndex {
        if let Some(&dst) = self.remove_edges[src.0 as usize].get(&expr) {
            return dst;
        }
        let signature = self.archetypes[src].signature().without(expr);
        let dst = self.get_or_create_archetype(signature);
        self.remove_edges[src.0 as usize].insert(expr, dst);
        dst
    }

    fn move_entity(&mut self, location: EntityLocation, dst: ArchetypeIndex) -> usize {
        let src = location.archetype();
        let (src_archetype, dst_archetype) = pair_mut(&mut self.archetypes, src, dst);
        let entity = src_archetype.entities()[location.row()];
        let new_row = src_archetype.migrate_row(location.row(), dst_archetype);
        if let Some(swapped) = src_archetype.entities().get(location.row()).copied() {
            self.locations.set(swapped.index(), location);
        }
        self.locations
            .set(entity.index(), EntityLocation(dst, new_row));
        new_row
    }

    /// Locks the world, entering deferred mode. Structural operations
    /// requested through the returned guard are queued and applied in FIFO
    /// order when the last lock is released.
    pub fn lock(&mut self) -> WorldLock<'_> {
        self.lock_count.fetch_add(1, Ordering::AcqRel);
        WorldLock {
            world: NonNull::from(self),
            _marker: PhantomData,
        }
    }

    /// Returns `true` while any world-lock is held.
    pub fn is_locked(&self) -> bool {
        self.lock_count.load(Ordering::Acquire) > 0
    }

    fn drain_deferred(&mut self) {
        loop {
            let op = match self.deferred.get_mut().pop_front() {
                Some(op) => op,
                None => break,
            };
            trace!(op = ?op, "applying deferred operation");
            self.apply(op);
        }
    }

    // Deferred operations were validated when they were enqueued; a
    // preceding deferred operation may still have invalidated them (for
    // example a despawn queued before an add to the same entity). Such
    // stale operations are skipped.
    fn apply(&mut self, op: DeferredOp) {
        match op {
            DeferredOp::Spawn(entity) => self.insert_reserved(entity),
            DeferredOp::Despawn(entity) => {
                if let Err(error) = self.despawn(entity) {
                    trace!(entity = %entity, %error, "skipped stale deferred despawn");
                }
            }
            DeferredOp::Add(entity, expr, value) => {
                if let Err(error) = self.add_component_erased(entity, expr, value) {
                    warn!(entity = %entity, %expr, %error, "skipped stale deferred add");
                }
            }
            DeferredOp::Remove(entity, expr) => {
                if let Err(error) = self.remove_component_expr(entity, expr) {
                    warn!(entity = %entity, %expr, %error, "skipped stale deferred remove");
                }
            }
            DeferredOp::Truncate(archetype, max_rows) => {
                self.truncate_archetype(archetype, max_rows)
            }
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("index", &self.index)
            .field("entities", &self.len())
            .field("archetypes", &self.archetypes.len())
            .finish()
    }
}

fn pair_mut(
    archetypes: &mut [Archetype],
    a: ArchetypeIndex,
    b: ArchetypeIndex,
) -> (&mut Archetype, &mut Archetype) {
    let (a, b) = (a.0 as usize, b.0 as usize);
    debug_assert_ne!(a, b, "entity migrated into its own archetype");
    if a < b {
        let (head, tail) = archetypes.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = archetypes.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}

/// A scoped guard which holds the world in deferred-mutation mode.
///
/// The guard parks the `&mut World` it was created from: reads remain
/// available through [Deref], and structural operations become queueing
/// operations on `&self`, safe to call from inside iteration closures.
/// Locks are counted and reentrant via [relock](WorldLock::relock); the
/// queue is drained when the last guard drops.
pub struct WorldLock<'a> {
    world: NonNull<World>,
    _marker: PhantomData<&'a mut World>,
}

impl<'a> WorldLock<'a> {
    pub(crate) fn world(&self) -> &World {
        // Safety: the guard owns the exclusive borrow it was created from,
        // and only ever reborrows it shared until the final drop.
        unsafe { self.world.as_ref() }
    }

    /// Reserves and returns a new entity identity. The entity is live
    /// immediately; its (empty) row is inserted when the lock releases.
    pub fn spawn(&self) -> Identity {
        let world = self.world();
        let entity = world.reserve();
        world.deferred.lock().push_back(DeferredOp::Spawn(entity));
        entity
    }

    /// Queues a despawn of the entity.
    pub fn despawn(&self, entity: Identity) -> Result<(), EcsError> {
        let world = self.world();
        if !world.is_alive(entity) {
            return Err(EcsError::EntityNotAlive(entity));
        }
        world.deferred.lock().push_back(DeferredOp::Despawn(entity));
        Ok(())
    }

    /// Queues adding a component value under the given secondary key.
    pub fn add_component<T: Component>(
        &self,
        entity: Identity,
        key: SecondaryKey,
        value: T,
    ) -> Result<(), EcsError> {
        self.add_component_erased(entity, TypeExpression::with_key::<T>(key), Box::new(value))
    }

    /// Queues adding a dynamically-typed component value.
    pub fn add_component_erased(
        &self,
        entity: Identity,
        expr: TypeExpression,
        value: Box<dyn ErasedComponent>,
    ) -> Result<(), EcsError> {
        if expr.is_wildcard() {
            return Err(EcsError::WildcardNotStorable(expr));
        }
        if value.component_type() != expr.component_type() {
            return Err(EcsError::NullComponentValue(expr));
        }
        let world = self.world();
        if !world.is_alive(entity) {
            return Err(EcsError::EntityNotAlive(entity));
        }
        world
            .deferred
            .lock()
            .push_back(DeferredOp::Add(entity, expr, value));
        Ok(())
    }

    /// Queues removal of the component under the given secondary key.
    pub fn remove_component<T: Component>(
        &self,
        entity: Identity,
        key: SecondaryKey,
    ) -> Result<(), EcsError> {
        self.remove_component_expr(entity, TypeExpression::with_key::<T>(key))
    }

    /// Queues removal of the component under `expr`.
    pub fn remove_component_expr(
        &self,
        entity: Identity,
        expr: TypeExpression,
    ) -> Result<(), EcsError> {
        let world = self.world();
        if !world.is_alive(entity) {
            return Err(EcsError::EntityNotAlive(entity));
        }
        world
            .deferred
            .lock()
            .push_back(DeferredOp::Remove(entity, expr));
        Ok(())
    }

    /// Queues truncation of an archetype to at most `max_rows` rows.
    pub fn truncate_archetype(&self, archetype: ArchetypeIndex, max_rows: usize) {
        self.world()
            .deferred
            .lock()
            .push_back(DeferredOp::Truncate(archetype, max_rows));
    }

    /// Acquires a nested lock. The deferred queue drains only when the
    /// outermost lock releases.
    pub fn relock(&self) -> WorldLock<'_> {
        self.world().lock_count.fetch_add(1, Ordering::AcqRel);
        WorldLock {
            world: self.world,
            _marker: PhantomData,
        }
    }

    /// The number of operations currently queued.
    pub fn pending(&self) -> usize {
        self.world().deferred.lock().len()
    }
}

impl Deref for WorldLock<'_> {
    type Target = World;

    fn deref(&self) -> &World {
        self.world()
    }
}

impl Drop for WorldLock<'_> {
    fn drop(&mut self) {
        if self.world().lock_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Safety: this was the last lock, so the exclusive borrow the
            // outermost guard parked is no longer shared with anything.
            let world = unsafe { self.world.as_mut() };
            world.drain_deferred();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Pos(f32, f32);
    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Hp(u32);

    #[test]
    fn spawned_entities_are_alive_and_empty() {
        let mut world = World::new();
        let entity = world.spawn();
        assert!(world.is_alive(entity));
        assert!(world.signature_of(entity).unwrap().is_empty());
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn add_then_remove_restores_signature() {
        let mut world = World::new();
        let entity = world.spawn();
        let original = world.signature_of(entity).unwrap().clone();

        world
            .add_component(entity, SecondaryKey::None, Pos(1.0, 2.0))
            .unwrap();
        assert!(world.has_component::<Pos>(entity, SecondaryKey::None));

        world
            .remove_component::<Pos>(entity, SecondaryKey::None)
            .unwrap();
        assert_eq!(world.signature_of(entity).unwrap(), &original);
        assert!(!world.has_component::<Pos>(entity, SecondaryKey::None));
    }

    #[test]
    fn duplicate_add_fails_without_mutation() {
        let mut world = World::new();
        let entity = world.spawn();
        world
            .add_component(entity, SecondaryKey::None, Hp(10))
            .unwrap();
        let signature = world.signature_of(entity).unwrap().clone();

        let result = world.add_component(entity, SecondaryKey::None, Hp(99));
        assert!(matches!(result, Err(EcsError::ComponentAlreadyPresent(_))));
        assert_eq!(world.signature_of(entity).unwrap(), &signature);
        assert_eq!(
            world.get_component::<Hp>(entity, SecondaryKey::None).unwrap(),
            &Hp(10)
        );
    }

    #[test]
    fn remove_absent_fails() {
        let mut world = World::new();
        let entity = world.spawn();
        let result = world.remove_component::<Hp>(entity, SecondaryKey::None);
        assert!(matches!(result, Err(EcsError::ComponentNotPresent(_))));
    }

    #[test]
    fn despawned_handles_go_stale() {
        let mut world = World::new();
        let entity = world.spawn();
        world.despawn(entity).unwrap();

        assert!(!world.is_alive(entity));
        assert!(matches!(
            world.despawn(entity),
            Err(EcsError::EntityNotAlive(_))
        ));
        assert!(matches!(
            world.get_component::<Hp>(entity, SecondaryKey::None),
            Err(EcsError::EntityNotAlive(_))
        ));
    }

    #[test]
    fn slots_recycle_with_advanced_generation() {
        let mut world = World::new();
        let first = world.spawn();
        world.despawn(first).unwrap();
        let second = world.spawn();

        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert_ne!(first, second);
        assert!(!world.is_alive(first));
        assert!(world.is_alive(second));
    }

    #[test]
    fn signatures_intern_to_one_archetype() {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        world.add_component(a, SecondaryKey::None, Pos(0.0, 0.0)).unwrap();
        world.add_component(b, SecondaryKey::None, Pos(1.0, 1.0)).unwrap();

        assert_eq!(
            world.signature_of(a).unwrap(),
            world.signature_of(b).unwrap()
        );
        let sig_a = world.locations.get(a.index()).unwrap().archetype();
        let sig_b = world.locations.get(b.index()).unwrap().archetype();
        assert_eq!(sig_a, sig_b);
    }

    #[test]
    fn meta_stays_coherent_across_swap_removal() {
        let mut world = World::new();
        let entities: Vec<Identity> = (0..4).map(|_| world.spawn()).collect();
        for (i, entity) in entities.iter().enumerate() {
            world
                .add_component(*entity, SecondaryKey::None, Hp(i as u32))
                .unwrap();
        }

        // despawning the first forces a tail swap in its archetype
        world.despawn(entities[0]).unwrap();
        for (i, entity) in entities.iter().enumerate().skip(1) {
            let location = world.location_of(*entity).unwrap();
            let archetype = &world.archetypes[location.archetype()];
            assert_eq!(archetype.entities()[location.row()], *entity);
            assert_eq!(
                world.get_component::<Hp>(*entity, SecondaryKey::None).unwrap(),
                &Hp(i as u32)
            );
        }
    }

    #[test]
    fn relations_store_separately_from_plain() {
        let mut world = World::new();
        let target_a = world.spawn();
        let target_b = world.spawn();
        let entity = world.spawn();

        #[derive(Clone, Copy, Debug, PartialEq)]
        struct Likes(u8);

        world
            .add_component(entity, SecondaryKey::Entity(target_a), Likes(1))
            .unwrap();
        world
            .add_component(entity, SecondaryKey::Entity(target_b), Likes(2))
            .unwrap();
        world
            .add_component(entity, SecondaryKey::None, Likes(0))
            .unwrap();

        assert_eq!(world.signature_of(entity).unwrap().len(), 3);
        let keyed = world
            .get_all::<Likes>(entity, TypeExpression::any_target::<Likes>())
            .unwrap();
        assert_eq!(keyed.len(), 2);
        let all = world
            .get_all::<Likes>(entity, TypeExpression::any::<Likes>())
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(
            world
                .get_component::<Likes>(entity, SecondaryKey::Entity(target_a))
                .unwrap(),
            &Likes(1)
        );
    }

    #[test]
    fn erased_add_rejects_mismatched_values() {
        let mut world = World::new();
        let entity = world.spawn();
        let expr = TypeExpression::of::<Hp>();
        let result = world.add_component_erased(entity, expr, Box::new(Pos(0.0, 0.0)));
        assert_eq!(result, Err(EcsError::NullComponentValue(expr)));
        assert!(world.signature_of(entity).unwrap().is_empty());
    }

    #[test]
    fn truncate_despawns_the_tail() {
        let mut world = World::new();
        let entities: Vec<Identity> = world.spawn_n(5).to_vec();
        let archetype = world.location_of(entities[0]).unwrap().archetype();

        world.truncate_archetype(archetype, 2);
        assert_eq!(world.archetypes[archetype].len(), 2);
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn deferred_operations_apply_in_fifo_order() {
        let mut world = World::new();
        let entity = world.spawn();

        let lock = world.lock();
        assert!(lock.is_locked());
        lock.add_component(entity, SecondaryKey::None, Hp(5)).unwrap();
        let spawned = lock.spawn();
        assert!(lock.is_alive(spawned));
        lock.despawn(entity).unwrap();
        assert_eq!(lock.pending(), 3);
        drop(lock);

        assert!(!world.is_locked());
        assert!(!world.is_alive(entity));
        assert!(world.is_alive(spawned));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn nested_locks_drain_once_at_the_end() {
        let mut world = World::new();
        let entity = world.spawn();

        let outer = world.lock();
        {
            let inner = outer.relock();
            inner.despawn(entity).unwrap();
            drop(inner);
            // still deferred: the outer lock is held
            assert!(outer.is_alive(entity));
        }
        drop(outer);
        assert!(!world.is_alive(entity));
    }

    #[test]
    fn deferred_add_after_despawn_is_skipped() {
        let mut world = World::new();
        let entity = world.spawn();

        let lock = world.lock();
        lock.despawn(entity).unwrap();
        lock.add_component(entity, SecondaryKey::None, Hp(1)).unwrap();
        drop(lock);

        assert!(!world.is_alive(entity));
        assert_eq!(world.len(), 0);
    }
}
