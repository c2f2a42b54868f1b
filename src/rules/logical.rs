// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Logic-level predicate combinators.

use super::expect_two;
use crate::document::Document;
use crate::entity::EntityId;
use crate::extraction::Field;
use crate::predicate::{AnyPredicate, Degree, Leniency, Predicate};
use crate::spatial_formula::{simplify, Formula};
use crate::{Error, Result};
use rustc_hash::FxHashSet;
use std::hash::{Hash, Hasher};

/// Says that two fields' assignments have no words in common.
///
/// This does not compare strings: it checks whether the two assignments
/// share any actual typeset words on the page. Scores 0 on overlap, 1
/// otherwise.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AreDisjoint;

impl Predicate for AreDisjoint {
    fn name(&self) -> &'static str {
        "are_disjoint"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(2)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let (e1, e2) = expect_two(entities)?;
        let words1: FxHashSet<_> = document.entity_words(e1).into_iter().collect();
        let overlapping = document
            .entity_words(e2)
            .into_iter()
            .any(|w| words1.contains(&w));
        Ok(if overlapping { 0.0 } else { 1.0 })
    }
}

/// No-op predicate; always scores 1.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Nop;

impl Predicate for Nop {
    fn name(&self) -> &'static str {
        "nop"
    }

    fn degree(&self) -> Degree {
        Degree::Any
    }

    fn score(&self, _entities: &[EntityId], _document: &Document) -> Result<f64> {
        Ok(1.0)
    }
}

/// Says that all of the wrapped predicates hold: the analog of `and`.
///
/// The score is the product of the wrapped predicates' scores.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct AllHold {
    /// The wrapped predicates
    pub predicates: Vec<AnyPredicate>,

    /// The shared degree of the wrapped predicates
    pub degree: Degree,
}

impl Predicate for AllHold {
    fn name(&self) -> &'static str {
        "all_hold"
    }

    fn degree(&self) -> Degree {
        self.degree
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let mut score = 1.0;
        for predicate in &self.predicates {
            score *= predicate.score(entities, document)?;
        }
        Ok(score)
    }

    fn phi(&self, fields: &[Field]) -> Formula {
        simplify(&Formula::and(
            self.predicates.iter().map(|p| p.phi(fields)),
        ))
    }
}

/// Says that at least one of the wrapped predicates holds: the analog of
/// `or`.
///
/// The score is the maximum of the wrapped predicates' scores.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct AnyHolds {
    /// The wrapped predicates
    pub predicates: Vec<AnyPredicate>,

    /// The shared degree of the wrapped predicates
    pub degree: Degree,
}

impl Predicate for AnyHolds {
    fn name(&self) -> &'static str {
        "any_holds"
    }

    fn degree(&self) -> Degree {
        self.degree
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let mut score = 0.0f64;
        for predicate in &self.predicates {
            score = score.max(predicate.score(entities, document)?);
        }
        Ok(score)
    }

    fn phi(&self, fields: &[Field]) -> Formula {
        simplify(&Formula::or(
            self.predicates.iter().map(|p| p.phi(fields)),
        ))
    }
}

/// Inverts the wrapped predicate's score.
#[derive(Clone, Debug, Hash, PartialEq)]
pub struct Negate {
    /// The wrapped predicate
    pub inner: Box<AnyPredicate>,
}

impl Predicate for Negate {
    fn name(&self) -> &'static str {
        "negate"
    }

    fn degree(&self) -> Degree {
        self.inner.degree()
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        Ok(1.0 - self.inner.score(entities, document)?)
    }
}

/// Caps the wrapped predicate's score at a maximum.
#[derive(Clone, Debug, PartialEq)]
pub struct Penalize {
    /// The wrapped predicate
    pub inner: Box<AnyPredicate>,

    /// The cap
    pub max_score: f64,
}

impl Hash for Penalize {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
        crate::predicate::hash_f64(self.max_score, state);
    }
}

impl Predicate for Penalize {
    fn name(&self) -> &'static str {
        "penalize"
    }

    fn degree(&self) -> Degree {
        self.inner.degree()
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        Ok(self.inner.score(entities, document)?.min(self.max_score))
    }

    fn phi(&self, fields: &[Field]) -> Formula {
        self.inner.phi(fields)
    }

    fn leniency(&self) -> Leniency {
        self.inner.leniency()
    }
}

/// Raises the wrapped predicate's score to a minimum, so a bad match cannot
/// kill an extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct NonFatal {
    /// The wrapped predicate
    pub inner: Box<AnyPredicate>,

    /// The floor
    pub min_score: f64,
}

impl Hash for NonFatal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
        crate::predicate::hash_f64(self.min_score, state);
    }
}

impl Predicate for NonFatal {
    fn name(&self) -> &'static str {
        "non_fatal"
    }

    fn degree(&self) -> Degree {
        self.inner.degree()
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        Ok(self.inner.score(entities, document)?.max(self.min_score))
    }

    fn leniency(&self) -> Leniency {
        self.inner.leniency()
    }
}

fn shared_degree(predicates: &[AnyPredicate]) -> Result<Degree> {
    let mut fixed: Option<usize> = None;
    for predicate in predicates {
        if let Degree::Fixed(d) = predicate.degree() {
            match fixed {
                None => fixed = Some(d),
                Some(existing) if existing == d => {}
                Some(existing) => {
                    return Err(Error::InvalidParameter(format!(
                        "wrapped predicates must share a degree; got {existing} and {d}"
                    )));
                }
            }
        }
    }
    Ok(fixed.map_or(Degree::Any, Degree::Fixed))
}

/// Builds an [`AllHold`] over the given predicates.
///
/// # Errors
///
/// Fails if the predicates have conflicting fixed degrees, or none are
/// given.
pub fn all_hold(predicates: Vec<AnyPredicate>) -> Result<AnyPredicate> {
    if predicates.is_empty() {
        return Err(Error::InvalidParameter(
            "all_hold needs at least one predicate".into(),
        ));
    }
    let degree = shared_degree(&predicates)?;
    Ok(AllHold { predicates, degree }.into())
}

/// Builds an [`AnyHolds`] over the given predicates.
///
/// # Errors
///
/// Fails if the predicates have conflicting fixed degrees, or none are
/// given.
pub fn any_holds(predicates: Vec<AnyPredicate>) -> Result<AnyPredicate> {
    if predicates.is_empty() {
        return Err(Error::InvalidParameter(
            "any_holds needs at least one predicate".into(),
        ));
    }
    let degree = shared_degree(&predicates)?;
    Ok(AnyHolds { predicates, degree }.into())
}

/// See [`Negate`].
#[must_use]
pub fn negate(inner: AnyPredicate) -> AnyPredicate {
    Negate {
        inner: Box::new(inner),
    }
    .into()
}

/// See [`Penalize`].
#[must_use]
pub fn penalize(inner: AnyPredicate, max_score: f64) -> AnyPredicate {
    Penalize {
        inner: Box::new(inner),
        max_score,
    }
    .into()
}

/// See [`NonFatal`].
#[must_use]
pub fn non_fatal(inner: AnyPredicate, min_score: f64) -> AnyPredicate {
    NonFatal {
        inner: Box::new(inner),
        min_score,
    }
    .into()
}

/// See [`Nop`].
#[must_use]
pub fn nop() -> AnyPredicate {
    Nop.into()
}

/// See [`AreDisjoint`].
#[must_use]
pub fn are_disjoint() -> AnyPredicate {
    AreDisjoint.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::spatial::{left_to_right_pair, top_down_pair};
    use crate::rules::textual::text_equals;
    use test_log::test;

    #[test]
    fn shared_degree_enforced() {
        assert!(all_hold(vec![left_to_right_pair(), top_down_pair()]).is_ok());
        assert!(all_hold(vec![left_to_right_pair(), text_equals("x")]).is_err());
        assert!(all_hold(vec![]).is_err());

        // Any-degree predicates do not constrain the shared degree
        let combined = all_hold(vec![nop(), top_down_pair()]).expect("degrees are compatible");
        assert_eq!(combined.degree(), Degree::Fixed(2));
    }
}
