//! Typed streams over queries.
//!
//! A stream views a query through an ordered list of stream types, each
//! with a match key. For every matched archetype, each slot independently
//! matches a set of columns (one for a concrete key, possibly several for
//! a wildcard), and the stream iterates the Cartesian product of those
//! sets: slot 0 is the outer axis, the last slot the inner. Rows are then
//! visited in the archetype's current order.
//!
//! Streams exist for arities 1 through 5. Slots must name distinct
//! component types, which guarantees that no column is ever claimed by two
//! slots of one combination.

use super::join::CrossJoin;
use super::Query;
use crate::error::EcsError;
use crate::expression::TypeExpression;
use crate::identity::Identity;
use crate::storage::component::{Component, ComponentTypeId};
use crate::world::{World, WorldLock};
use itertools::izip;
use smallvec::{smallvec, SmallVec};
use std::marker::PhantomData;

/// A tuple of component types defining the slots of a [Stream].
pub trait StreamTypes: 'static {
    /// The component type of each slot, in order.
    fn component_types() -> SmallVec<[ComponentTypeId; 5]>;

    /// The plain expression for each slot.
    fn plain_expressions() -> SmallVec<[TypeExpression; 5]>;
}

/// A query viewed through ordered stream types; see the module docs.
pub struct Stream<'q, V: StreamTypes> {
    query: &'q mut Query,
    exprs: SmallVec<[TypeExpression; 5]>,
    _marker: PhantomData<V>,
}

impl<'q, V: StreamTypes> Stream<'q, V> {
    pub(crate) fn new(query: &'q mut Query, exprs: SmallVec<[TypeExpression; 5]>) -> Self {
        let types = V::component_types();
        for (i, a) in types.iter().enumerate() {
            for b in &types[i + 1..] {
                assert_ne!(
                    a, b,
                    "stream slots must name distinct component types"
                );
            }
        }
        debug_assert_eq!(exprs.len(), types.len());
        Stream {
            query,
            exprs,
            _marker: PhantomData,
        }
    }

    /// The per-slot match expressions.
    pub fn expressions(&self) -> &[TypeExpression] {
        &self.exprs
    }
}

macro_rules! impl_stream {
    ($( $ty:ident : $slice:ident => $idx:tt ),*) => {
        impl<$( $ty: Component ),*> StreamTypes for ($( $ty, )*) {
            fn component_types() -> SmallVec<[ComponentTypeId; 5]> {
                smallvec![$( ComponentTypeId::of::<$ty>() ),*]
            }

            fn plain_expressions() -> SmallVec<[TypeExpression; 5]> {
                smallvec![$( TypeExpression::of::<$ty>() ),*]
            }
        }

        impl<'q, $( $ty: Component ),*> Stream<'q, ($( $ty, )*)> {
            /// Yields column slices for every archetype and cross-join
            /// combination, without any structural-safety guarantees.
            ///
            /// # Safety
            /// The caller must ensure that no other access to the claimed
            /// columns is alive while `f` runs, and that no structural
            /// change is applied to the world during iteration other than
            /// through a world-lock.
            pub unsafe fn fold_raw_unchecked<F>(
                &mut self,
                world: &World,
                mut f: F,
            ) -> Result<(), EcsError>
            where
                F: FnMut(&[Identity], $( &mut [$ty] ),*),
            {
                self.query.update_cache(world);
                let archetypes = world.archetypes();
                for &index in self.query.matched() {
                    let archetype = &archetypes[index];
                    let version = archetype.version();
                    let join = CrossJoin::new(smallvec![
                        $( archetype.match_columns(self.exprs[$idx]) ),*
                    ]);
                    for combo in join {
                        // Safety: slots name distinct component types, so
                        // the claimed columns are pairwise distinct.
                        $(
                            let $slice = archetype
                                .claim_column_mut::<$ty>(combo[$idx])
                                .expect("matched column stores the slot's component type");
                        )*
                        f(archetype.entities(), $( $slice ),*);
                    }
                    if archetype.version() != version {
                        return Err(EcsError::StructurallyModifiedDuringIteration);
                    }
                }
                Ok(())
            }

            /// Calls `f` once per archetype and cross-join combination with
            /// the identity column and one mutable column slice per slot.
            pub fn raw<F>(&mut self, world: &mut World, f: F) -> Result<(), EcsError>
            where
                F: FnMut(&[Identity], $( &mut [$ty] ),*),
            {
                // Safety: exclusive world access.
                unsafe { self.fold_raw_unchecked(world, f) }
            }

            /// As [raw](Self::raw), with an extra by-value parameter.
            pub fn raw_uniform<U: Copy, F>(
                &mut self,
                world: &mut World,
                uniform: U,
                mut f: F,
            ) -> Result<(), EcsError>
            where
                F: FnMut(&[Identity], $( &mut [$ty], )* U),
            {
                self.raw(world, |entities, $( $slice ),*| {
                    f(entities, $( $slice, )* uniform)
                })
            }

            /// Sequentially visits every matching row as
            /// `(entity, component references)`.
            pub fn for_each<F>(&mut self, world: &mut World, mut f: F) -> Result<(), EcsError>
            where
                F: FnMut(Identity, $( &mut $ty ),*),
            {
                // Safety: exclusive world access.
                unsafe {
                    self.fold_raw_unchecked(world, |entities, $( $slice ),*| {
                        for row in 0..entities.len() {
                            f(entities[row], $( &mut $slice[row] ),*);
                        }
                    })
                }
            }

            /// As [for_each](Self::for_each), through a world-lock.
            /// Structural operations requested on the lock from inside `f`
            /// are deferred until the lock releases, so the iteration
            /// itself never observes a structural change.
            pub fn for_each_deferred<F>(
                &mut self,
                lock: &WorldLock<'_>,
                mut f: F,
            ) -> Result<(), EcsError>
            where
                F: FnMut(Identity, $( &mut $ty ),*),
            {
                let _guard = lock.relock();
                // Safety: the lock defers all structural changes, and slots
                // claim distinct columns. Nesting two streams over
                // overlapping columns inside one lock is a documented
                // aliasing contract violation.
                unsafe {
                    self.fold_raw_unchecked(lock.world(), |entities, $( $slice ),*| {
                        for row in 0..entities.len() {
                            f(entities[row], $( &mut $slice[row] ),*);
                        }
                    })
                }
            }

            /// As [for_each](Self::for_each), with an extra by-value
            /// parameter passed to every call.
            pub fn for_each_uniform<U: Copy, F>(
                &mut self,
                world: &mut World,
                uniform: U,
                mut f: F,
            ) -> Result<(), EcsError>
            where
                F: FnMut(Identity, $( &mut $ty, )* U),
            {
                self.for_each(world, |entity, $( $slice ),*| {
                    f(entity, $( $slice, )* uniform)
                })
            }

            /// Visits rows in parallel, fanning chunks of `chunk_size` rows
            /// out to the worker pool and joining before returning. The
            /// default chunk size divides each combination's rows evenly
            /// across the pool. Workers receive disjoint row ranges; `f`
            /// must not touch structural state.
            #[cfg(feature = "parallel")]
            pub fn par_for_each<F>(
                &mut self,
                world: &mut World,
                chunk_size: Option<usize>,
                f: F,
            ) -> Result<(), EcsError>
            where
                F: Fn(Identity, $( &mut $ty ),*) + Send + Sync,
            {
                use rayon::prelude::*;

                let f = &f;
                // Safety: exclusive world access; workers receive disjoint
                // row ranges of the claimed columns.
                unsafe {
                    self.fold_raw_unchecked(world, |entities, $( $slice ),*| {
                        if entities.is_empty() {
                            return;
                        }
                        let chunk = chunk_size
                            .unwrap_or_else(|| entities.len() / rayon::current_num_threads())
                            .max(1);
                        let batches: Vec<_> = izip!(
                            entities.chunks(chunk)
                            $(, $slice.chunks_mut(chunk) )*
                        )
                        .collect();
                        batches.into_par_iter().for_each(|(entities, $( $slice ),*)| {
                            for row in 0..entities.len() {
                                f(entities[row], $( &mut $slice[row] ),*);
                            }
                        });
                    })
                }
            }

            /// As [par_for_each](Self::par_for_each), with an extra
            /// by-value parameter.
            #[cfg(feature = "parallel")]
            pub fn par_for_each_uniform<U, F>(
                &mut self,
                world: &mut World,
                chunk_size: Option<usize>,
                uniform: U,
                f: F,
            ) -> Result<(), EcsError>
            where
                U: Copy + Send + Sync,
                F: Fn(Identity, $( &mut $ty, )* U) + Send + Sync,
            {
                self.par_for_each(world, chunk_size, move |entity, $( $slice ),*| {
                    f(entity, $( $slice, )* uniform)
                })
            }

            /// Returns a read-only iterator over matching rows.
            pub fn iter<'w>(
                &mut self,
                world: &'w World,
            ) -> impl Iterator<Item = (Identity, $( &'w $ty ),*)> {
                self.query.update_cache(world);
                let matched = self.query.matched().to_vec();
                let exprs = self.exprs.clone();
                let archetypes = world.archetypes();
                matched.into_iter().flat_map(move |index| {
                    let archetype = &archetypes[index];
                    let join = CrossJoin::new(smallvec![
                        $( archetype.match_columns(exprs[$idx]) ),*
                    ]);
                    join.flat_map(move |combo| {
                        $(
                            let $slice = archetype
                                .typed_slice::<$ty>(combo[$idx])
                                .expect("matched column stores the slot's component type");
                        )*
                        izip!(
                            archetype.entities().iter().copied()
                            $(, $slice.iter() )*
                        )
                    })
                })
            }
        }
    };
}

impl_stream!(A: a => 0);
impl_stream!(A: a => 0, B: b => 1);
impl_stream!(A: a => 0, B: b => 1, C: c => 2);
impl_stream!(A: a => 0, B: b => 1, C: c => 2, D: d => 3);
impl_stream!(A: a => 0, B: b => 1, C: c => 2, D: d => 3, E: e => 4);
