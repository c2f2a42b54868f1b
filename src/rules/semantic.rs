// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Predicates over an entity's semantic type.
//!
//! Each of these reads the likeness (or maximality) score the document
//! builder attached to the entity, and scores 0 for entities of any other
//! variant.

use super::expect_one;
use crate::document::Document;
use crate::entity::{Entity, EntityId};
use crate::predicate::{AnyPredicate, Degree, Leniency, Predicate};

/// Says that a field is an address.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IsAddress;

impl Predicate for IsAddress {
    fn name(&self) -> &'static str {
        "is_address"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> crate::Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        match entity {
            Entity::Address { likeness_score, .. } => Ok(likeness_score.unwrap_or(0.0)),
            _ => Ok(0.0),
        }
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says that a field is a date.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IsDate;

impl Predicate for IsDate {
    fn name(&self) -> &'static str {
        "is_date"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> crate::Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        match entity {
            Entity::Date { likeness_score, .. } => Ok(likeness_score.unwrap_or(0.0)),
            _ => Ok(0.0),
        }
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says that a field is a dollar amount.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IsDollarAmount;

impl Predicate for IsDollarAmount {
    fn name(&self) -> &'static str {
        "is_dollar_amount"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> crate::Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        match entity {
            Entity::DollarAmount { likeness_score, .. } => Ok(likeness_score.unwrap_or(0.0)),
            _ => Ok(0.0),
        }
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says that a field's assignment is an entire horizontal phrase.
///
/// This prevents assigning a field to a word (or a sequence of words) which
/// is properly contained in a larger semantic phrase. The score is the
/// phrase's maximality score.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IsEntirePhrase;

impl Predicate for IsEntirePhrase {
    fn name(&self) -> &'static str {
        "is_entire_phrase"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> crate::Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        match entity {
            Entity::Text {
                maximality_score, ..
            } => Ok(maximality_score.unwrap_or(0.0)),
            _ => Ok(0.0),
        }
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says that a field is a person name.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IsPersonName;

impl Predicate for IsPersonName {
    fn name(&self) -> &'static str {
        "is_person_name"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> crate::Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        match entity {
            Entity::PersonName { likeness_score, .. } => Ok(likeness_score.unwrap_or(0.0)),
            _ => Ok(0.0),
        }
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// See [`IsAddress`].
#[must_use]
pub fn is_address() -> AnyPredicate {
    IsAddress.into()
}

/// See [`IsDate`].
#[must_use]
pub fn is_date() -> AnyPredicate {
    IsDate.into()
}

/// See [`IsDollarAmount`].
#[must_use]
pub fn is_dollar_amount() -> AnyPredicate {
    IsDollarAmount.into()
}

/// See [`IsEntirePhrase`].
#[must_use]
pub fn is_entire_phrase() -> AnyPredicate {
    IsEntirePhrase.into()
}

/// See [`IsPersonName`].
#[must_use]
pub fn is_person_name() -> AnyPredicate {
    IsPersonName.into()
}
