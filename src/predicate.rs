// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::document::Document;
use crate::entity::EntityId;
use crate::extraction::Field;
use crate::rule::{Atom, Rule};
use crate::rules::impingement::BoxUnimpinged;
use crate::rules::logical::{AllHold, AnyHolds, AreDisjoint, Negate, NonFatal, Nop, Penalize};
use crate::rules::numeric::{SumIsApproximately, SumIsAtLeast};
use crate::rules::semantic::{IsAddress, IsDate, IsDollarAmount, IsEntirePhrase, IsPersonName};
use crate::rules::spatial::{AreAligned, AreArranged, AreOnSamePage, IsInRegion, PageNumberIs};
use crate::rules::textual::{
    HaveUnequalText, LineCountIs, TextEquals, TextHasSubstring, TextMatchesPattern,
    TextPropertiesAre, WordCountIs,
};
use crate::spatial_formula::Formula;
use enum_dispatch::enum_dispatch;
use std::hash::{Hash, Hasher};

/// The number of fields a predicate can be applied to
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Degree {
    /// Exactly this many fields
    Fixed(usize),

    /// Any number of fields
    Any,
}

impl Degree {
    /// Returns `true` if the predicate accepts this many fields.
    #[must_use]
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Self::Fixed(d) => d == n,
            Self::Any => true,
        }
    }
}

/// A predicate's declared estimate of the fraction of candidate pairs it
/// admits
///
/// These are static guesses, used only to order the combine tree: lower
/// leniency means the predicate eliminates more, so joins constrained by it
/// are cheaper and get built first.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Leniency {
    /// Admits ~10% of candidate pairs
    Low,

    /// Admits ~30% of candidate pairs
    Medium,

    /// Admits ~50% of candidate pairs
    High,

    /// Not meaningful for this predicate (degree-1 predicates are already
    /// accounted for when leaf candidates are counted)
    NotApplicable,
}

impl Leniency {
    /// The numeric weight used by the combine-tree ordering.
    #[must_use]
    pub fn value(self) -> f64 {
        match self {
            Self::Low => 0.1,
            Self::Medium => 0.3,
            Self::High => 0.5,
            Self::NotApplicable => 1.0,
        }
    }
}

/// A rule predicate
///
/// For example: "is a date", or "are bottom-aligned". A predicate applied to
/// an appropriate number of fields gives a rule atom.
#[enum_dispatch]
pub trait Predicate {
    /// A short name for logging and display.
    fn name(&self) -> &'static str;

    /// The number of fields this predicate can be applied to.
    fn degree(&self) -> Degree;

    /// Scores the given entities, in `[0, 1]`.
    ///
    /// The i-th entity is the assignment of the i-th field the predicate was
    /// applied to.
    ///
    /// # Errors
    ///
    /// Fails for entities of a variant the predicate cannot handle (except
    /// the variant-discriminating predicates, which score 0 instead).
    fn score(&self, entities: &[EntityId], document: &Document) -> crate::Result<f64>;

    /// A formula which evaluates to true for any extraction for which this
    /// predicate has a positive score: a *weakening* of the predicate.
    fn phi(&self, fields: &[Field]) -> Formula {
        let _ = fields;
        Formula::Lit(true)
    }

    /// See [`Leniency`].
    fn leniency(&self) -> Leniency {
        Leniency::Medium
    }
}

/// The closed set of built-in predicates
///
/// Equality and hashing are by parameter value, so two syntactically
/// identical predicates share leaf-assignment cache entries.
#[enum_dispatch(Predicate)]
#[derive(Clone, Debug, Hash, PartialEq)]
#[allow(missing_docs)]
pub enum AnyPredicate {
    // Semantic
    IsAddress,
    IsDate,
    IsDollarAmount,
    IsEntirePhrase,
    IsPersonName,

    // Textual
    TextEquals,
    TextHasSubstring,
    TextMatchesPattern,
    TextPropertiesAre,
    LineCountIs,
    WordCountIs,
    HaveUnequalText,

    // Spatial
    AreAligned,
    AreArranged,
    IsInRegion,
    PageNumberIs,
    AreOnSamePage,

    // Impingement
    BoxUnimpinged,

    // Numeric
    SumIsApproximately,
    SumIsAtLeast,

    // Logical
    AreDisjoint,
    Nop,
    AllHold,
    AnyHolds,
    Negate,
    Penalize,
    NonFatal,
}

impl Eq for AnyPredicate {}

impl AnyPredicate {
    /// Builds a rule by applying this predicate to the given fields.
    ///
    /// # Errors
    ///
    /// Fails if the number of fields does not match the predicate's degree,
    /// or a field is repeated.
    pub fn applied_to(&self, fields: &[&str]) -> crate::Result<Rule> {
        Atom::new(fields, self.clone()).map(Rule::Atom)
    }
}

/// Hashes an `f64` parameter by its bit pattern.
///
/// Predicate parameters are validated at construction (no NaNs), so bitwise
/// equality lines up with `PartialEq`.
pub(crate) fn hash_f64<H: Hasher>(x: f64, state: &mut H) {
    state.write_u64(x.to_bits());
}

pub(crate) fn hash_opt_f64<H: Hasher>(x: Option<f64>, state: &mut H) {
    match x {
        Some(x) => {
            state.write_u8(1);
            hash_f64(x, state);
        }
        None => state.write_u8(0),
    }
}

pub(crate) fn hash_score_dict<H: Hasher>(
    dict: &std::collections::BTreeMap<i64, f64>,
    state: &mut H,
) {
    state.write_usize(dict.len());
    for (k, v) in dict {
        k.hash(state);
        hash_f64(*v, state);
    }
}
