//! Archetypes are tables of entities which all carry exactly the same set
//! of type expressions.
//!
//! Entities in one archetype have each of their component slots stored in
//! a dense column, all columns sharing row order, so queries can iterate
//! zipped column slices. All query filtering happens at the archetype
//! level; decisions are never made per-entity.

use super::component::{self, Component};
use super::{Column, ErasedColumn};
use crate::expression::TypeExpression;
use crate::identity::Identity;
use crate::signature::Signature;
use smallvec::SmallVec;
use std::fmt::{self, Debug};
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// The index of an archetype in a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ArchetypeIndex(pub u32);

impl Index<ArchetypeIndex> for [Archetype] {
    type Output = Archetype;

    fn index(&self, index: ArchetypeIndex) -> &Self::Output {
        &self[index.0 as usize]
    }
}

impl IndexMut<ArchetypeIndex> for [Archetype] {
    fn index_mut(&mut self, index: ArchetypeIndex) -> &mut Self::Output {
        &mut self[index.0 as usize]
    }
}

impl Index<ArchetypeIndex> for Vec<Archetype> {
    type Output = Archetype;

    fn index(&self, index: ArchetypeIndex) -> &Self::Output {
        &self[index.0 as usize]
    }
}

impl IndexMut<ArchetypeIndex> for Vec<Archetype> {
    fn index_mut(&mut self, index: ArchetypeIndex) -> &mut Self::Output {
        &mut self[index.0 as usize]
    }
}

/// A table of entities sharing one signature, one storage column per type
/// expression plus an implicit identity column.
///
/// Every structural mutation (row added, removed or migrated, column
/// backfilled) increments the archetype's version. Iterators snapshot the
/// version and detect structural modification by comparing against it.
pub struct Archetype {
    index: ArchetypeIndex,
    signature: Signature,
    entities: Vec<Identity>,
    columns: Vec<Box<dyn ErasedColumn>>,
    version: AtomicU64,
}

impl Archetype {
    pub(crate) fn new(index: ArchetypeIndex, signature: Signature) -> Self {
        let columns = signature
            .exprs()
            .iter()
            .map(|expr| component::new_column(expr.component_type()))
            .collect();
        Self {
            index,
            signature,
            entities: Vec::new(),
            columns,
            version: AtomicU64::new(0),
        }
    }

    /// Returns the index of the archetype.
    pub fn index(&self) -> ArchetypeIndex {
        self.index
    }

    /// Returns the archetype's signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns a slice of entity identities, one per row.
    pub fn entities(&self) -> &[Identity] {
        &self.entities
    }

    /// The number of rows in the archetype.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the archetype holds no rows.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The current structural version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Appends a row for `entity`, leaving value columns untouched. The
    /// caller must fill every column before the next structural operation;
    /// spawning into the empty archetype has none to fill.
    pub(crate) fn push(&mut self, entity: Identity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        self.bump_version();
        row
    }

    /// Removes the row by swapping the last row into its place across all
    /// columns. Returns the identity now occupying `row`, if any.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Identity> {
        for column in self.columns.iter_mut() {
            column.swap_remove(row);
        }
        self.entities.swap_remove(row);
        self.bump_version();
        self.entities.get(row).copied()
    }

    /// Moves the row to `target`, which may have a different signature.
    ///
    /// Expressions present in both signatures have their values moved
    /// column-to-column; values only in the source are dropped; columns
    /// only in the target are left one row short for the caller to
    /// backfill. Returns the row index within `target`.
    pub(crate) fn migrate_row(&mut self, row: usize, target: &mut Archetype) -> usize {
        let entity = self.entities.swap_remove(row);

        let src_exprs = self.signature.exprs();
        let dst_exprs = target.signature.exprs();
        let (mut s, mut d) = (0, 0);
        while s < src_exprs.len() {
            if d < dst_exprs.len() {
                match src_exprs[s].cmp(&dst_exprs[d]) {
                    std::cmp::Ordering::Equal => {
                        self.columns[s].move_row_to(row, &mut *target.columns[d]);
                        s += 1;
                        d += 1;
                    }
                    std::cmp::Ordering::Less => {
                        self.columns[s].swap_remove(row);
                        s += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        d += 1;
                    }
                }
            } else {
                self.columns[s].swap_remove(row);
                s += 1;
            }
        }

        let new_row = target.entities.len();
        target.entities.push(entity);
        self.bump_version();
        target.bump_version();
        new_row
    }

    /// Backfills one column after a migration left it a row short.
    pub(crate) fn fill_column(&mut self, column: usize, fill: impl FnOnce(&mut dyn ErasedColumn)) {
        fill(&mut *self.columns[column]);
        self.bump_version();
        debug_assert_eq!(
            self.columns[column].len(),
            self.entities.len(),
            "column backfill left the archetype incoherent"
        );
    }

    /// Returns the indices of every column whose expression is matched by
    /// the (possibly wildcard) query expression.
    pub fn match_columns(&self, query: TypeExpression) -> SmallVec<[usize; 4]> {
        self.signature
            .exprs()
            .iter()
            .enumerate()
            .filter(|(_, stored)| query.matches(**stored))
            .map(|(column, _)| column)
            .collect()
    }

    /// Returns the erased column at `column`.
    pub fn column(&self, column: usize) -> &dyn ErasedColumn {
        &*self.columns[column]
    }

    /// Returns a shared typed view of the column at `column`, or `None` if
    /// the column stores a different component type.
    pub fn typed_slice<T: Component>(&self, column: usize) -> Option<&[T]> {
        self.columns
            .get(column)?
            .downcast_ref::<Column<T>>()
            .map(Column::slice)
    }

    pub(crate) fn typed_column_mut<T: Component>(&mut self, column: usize) -> Option<&mut Column<T>> {
        self.columns.get_mut(column)?.downcast_mut::<Column<T>>()
    }

    pub(crate) fn column_mut(&mut self, column: usize) -> &mut dyn ErasedColumn {
        &mut *self.columns[column]
    }

    /// Claims a mutable typed view of one column through a shared
    /// archetype reference.
    ///
    /// # Safety
    /// The caller must guarantee that the claim is exclusive for the
    /// returned lifetime: no other claim of the same column may be alive,
    /// except claims over disjoint row ranges handed to parallel workers.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn claim_column_mut<T: Component>(&self, column: usize) -> Option<&mut [T]> {
        self.columns
            .get(column)?
            .downcast_ref::<Column<T>>()
            .map(|c| c.claim_mut())
    }

    // Runs after every migration in debug builds.
    pub(crate) fn validate_coherence(&self) {
        for (column, expr) in self.columns.iter().zip(self.signature.exprs()) {
            assert_eq!(
                column.len(),
                self.entities.len(),
                "column {} length diverged from row count",
                expr
            );
        }
    }
}

impl Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("index", &self.index)
            .field("signature", &self.signature)
            .field("rows", &self.entities.len())
            .field("version", &self.version())
            .finish()
    }
}
