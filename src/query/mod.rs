//! Queries select archetypes by structural predicates over their
//! signatures; streams iterate the selected rows.

use crate::expression::{SecondaryKey, TypeExpression};
use crate::signature::Signature;
use crate::storage::archetype::ArchetypeIndex;
use crate::storage::component::Component;
use crate::world::World;
use smallvec::SmallVec;
use self::stream::{Stream, StreamTypes};

pub(crate) mod join;
pub mod stream;

/// The structural predicate of a query.
///
/// A signature matches when every `has` expression matches some stored
/// expression, no `not` expression matches any, and, if `any` is
/// non-empty, at least one `any` expression matches.
#[derive(Clone, Debug, Default)]
pub struct Mask {
    has: SmallVec<[TypeExpression; 4]>,
    not: SmallVec<[TypeExpression; 4]>,
    any: SmallVec<[TypeExpression; 4]>,
}

impl Mask {
    /// Evaluates the predicate against a signature.
    pub fn matches(&self, signature: &Signature) -> bool {
        self.has.iter().all(|expr| signature.contains_match(*expr))
            && !self.not.iter().any(|expr| signature.contains_match(*expr))
            && (self.any.is_empty()
                || self.any.iter().any(|expr| signature.contains_match(*expr)))
    }
}

/// A fluent collector for the three expression lists of a [Mask].
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    mask: Mask,
}

impl QueryBuilder {
    /// Starts an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the plain form of component `T`.
    pub fn has<T: Component>(self) -> Self {
        self.has_expr(TypeExpression::of::<T>())
    }

    /// Requires a match for the given (possibly wildcard) expression.
    pub fn has_expr(mut self, expr: TypeExpression) -> Self {
        self.mask.has.push(expr);
        self
    }

    /// Excludes archetypes containing the plain form of component `T`.
    pub fn not<T: Component>(self) -> Self {
        self.not_expr(TypeExpression::of::<T>())
    }

    /// Excludes archetypes matching the given expression.
    pub fn not_expr(mut self, expr: TypeExpression) -> Self {
        self.mask.not.push(expr);
        self
    }

    /// Requires at least one of the `any` expressions to match.
    pub fn any_expr(mut self, expr: TypeExpression) -> Self {
        self.mask.any.push(expr);
        self
    }

    /// Compiles the collected mask into a query.
    pub fn compile(self) -> Query {
        Query::new(self.mask)
    }
}

/// A compiled query with a cached set of matched archetypes.
///
/// The cache carries a watermark of how many archetypes it has inspected
/// and catches up on archetypes created since, so matching cost is paid
/// once per archetype over the query's lifetime.
pub struct Query {
    mask: Mask,
    matched: Vec<ArchetypeIndex>,
    seen: usize,
}

impl Query {
    /// Constructs a query from a mask.
    pub fn new(mask: Mask) -> Self {
        Query {
            mask,
            matched: Vec::new(),
            seen: 0,
        }
    }

    /// The query's mask.
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub(crate) fn update_cache(&mut self, world: &World) {
        let archetypes = world.archetypes();
        for archetype in &archetypes[self.seen..] {
            if self.mask.matches(archetype.signature()) {
                self.matched.push(archetype.index());
            }
        }
        self.seen = archetypes.len();
    }

    pub(crate) fn matched(&self) -> &[ArchetypeIndex] {
        &self.matched
    }

    /// The archetypes currently matching the mask.
    pub fn matched_archetypes(&mut self, world: &World) -> &[ArchetypeIndex] {
        self.update_cache(world);
        &self.matched
    }

    /// The total number of rows across matched archetypes.
    pub fn count(&mut self, world: &World) -> usize {
        self.update_cache(world);
        self.matched
            .iter()
            .map(|&index| world.archetypes()[index].len())
            .sum()
    }

    /// Views the query through ordered stream types with plain match keys.
    pub fn stream<V: StreamTypes>(&mut self) -> Stream<'_, V> {
        let exprs = V::plain_expressions();
        Stream::new(self, exprs)
    }

    /// Views the query through ordered stream types, matching each slot
    /// under the corresponding secondary key. `keys` must hold one key per
    /// stream type.
    pub fn stream_with<V: StreamTypes>(&mut self, keys: &[SecondaryKey]) -> Stream<'_, V> {
        let types = V::component_types();
        assert_eq!(
            keys.len(),
            types.len(),
            "stream keys must match the stream arity"
        );
        let exprs = types
            .iter()
            .zip(keys)
            .map(|(ty, key)| TypeExpression::from_parts(*ty, *key))
            .collect();
        Stream::new(self, exprs)
    }

    /// Overwrites, across all matched archetypes, every column matching
    /// component `T` under `key` with copies of `value`. Returns the
    /// number of rows written.
    pub fn blit<T: Component + Clone>(
        &mut self,
        world: &mut World,
        key: SecondaryKey,
        value: T,
    ) -> usize {
        self.update_cache(world);
        let expr = TypeExpression::with_key::<T>(key);
        let mut rows = 0;
        for &index in &self.matched {
            let archetype = &mut world.archetypes_mut()[index];
            for column in archetype.match_columns(expr) {
                if let Some(column) = archetype.typed_column_mut::<T>(column) {
                    rows += column.len();
                    column.blit(value.clone());
                }
            }
        }
        rows
    }
}
