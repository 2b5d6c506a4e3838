//! Archetype signatures.

use crate::expression::TypeExpression;
use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt::{self, Debug, Display};

/// An immutable, sorted, deduplicated set of type expressions.
///
/// A signature uniquely identifies an archetype: two archetypes in one
/// world never share a signature. All producers (`with`, `without`,
/// `union`) return new signatures and leave the receiver untouched.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    exprs: SmallVec<[TypeExpression; 8]>,
}

impl Signature {
    /// The empty signature; the archetype of freshly spawned entities.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a signature from expressions in any order, sorting and
    /// deduplicating. Wildcard expressions may not be stored.
    pub fn new(exprs: impl IntoIterator<Item = TypeExpression>) -> Self {
        let mut exprs: SmallVec<[TypeExpression; 8]> = exprs.into_iter().collect();
        debug_assert!(exprs.iter().all(|e| !e.is_wildcard()));
        exprs.sort_unstable();
        exprs.dedup();
        Signature { exprs }
    }

    /// Returns this signature with `expr` added. Returns an identical
    /// signature if `expr` is already present.
    pub fn with(&self, expr: TypeExpression) -> Signature {
        debug_assert!(!expr.is_wildcard());
        match self.exprs.binary_search(&expr) {
            Ok(_) => self.clone(),
            Err(at) => {
                let mut exprs = self.exprs.clone();
                exprs.insert(at, expr);
                Signature { exprs }
            }
        }
    }

    /// Returns this signature with `expr` removed. Returns an identical
    /// signature if `expr` is absent.
    pub fn without(&self, expr: TypeExpression) -> Signature {
        match self.exprs.binary_search(&expr) {
            Ok(at) => {
                let mut exprs = self.exprs.clone();
                exprs.remove(at);
                Signature { exprs }
            }
            Err(_) => self.clone(),
        }
    }

    /// Returns the union of two signatures.
    pub fn union(&self, other: &Signature) -> Signature {
        let exprs = self
            .exprs
            .iter()
            .merge(other.exprs.iter())
            .copied()
            .dedup()
            .collect();
        Signature { exprs }
    }

    /// Returns `true` if the signature contains exactly `expr`.
    pub fn contains(&self, expr: TypeExpression) -> bool {
        self.exprs.binary_search(&expr).is_ok()
    }

    /// Returns `true` if any stored expression is matched by the (possibly
    /// wildcard) query expression.
    pub fn contains_match(&self, query: TypeExpression) -> bool {
        self.exprs.iter().any(|stored| query.matches(*stored))
    }

    /// Returns `true` if the two signatures share any expression.
    pub fn intersects(&self, other: &Signature) -> bool {
        // Both sides are sorted; walk them in step.
        let mut a = self.exprs.iter().peekable();
        let mut b = other.exprs.iter().peekable();
        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            match x.cmp(y) {
                std::cmp::Ordering::Less => {
                    a.next();
                }
                std::cmp::Ordering::Greater => {
                    b.next();
                }
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// The position of `expr` within the sorted expression list. Column
    /// indices within an archetype correspond to these positions.
    pub fn position(&self, expr: TypeExpression) -> Option<usize> {
        self.exprs.binary_search(&expr).ok()
    }

    /// The sorted expressions.
    pub fn exprs(&self) -> &[TypeExpression] {
        &self.exprs
    }

    /// The number of expressions in the signature.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// Returns `true` for the empty signature.
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.exprs.iter().format(", "))
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}
