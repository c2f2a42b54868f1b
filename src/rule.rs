// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::document::Document;
use crate::extraction::{Extraction, Field};
use crate::predicate::{AnyPredicate, Predicate};
use crate::spatial_formula::Formula;
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use uuid::Uuid;

/// The score a rule produced for one extraction, with the breakdown for
/// connectives
#[derive(Clone, Debug)]
pub enum RuleScore {
    /// Score of a single atom
    Atom {
        /// The predicate score in `[0, 1]`
        score: f64,
    },

    /// Score of a conjunction (product of children)
    Conjunction {
        /// The combined score
        score: f64,

        /// Child scores by rule uuid
        children: FxHashMap<Uuid, RuleScore>,
    },

    /// Score of a disjunction (max of children)
    Disjunction {
        /// The combined score
        score: f64,

        /// Child scores by rule uuid
        children: FxHashMap<Uuid, RuleScore>,
    },
}

impl RuleScore {
    /// The scalar score.
    #[must_use]
    pub fn score(&self) -> f64 {
        match self {
            Self::Atom { score }
            | Self::Conjunction { score, .. }
            | Self::Disjunction { score, .. } => *score,
        }
    }
}

/// A predicate applied to a fixed tuple of fields; the smallest rule
#[derive(Clone, Debug)]
pub struct Atom {
    /// The fields this rule applies to
    pub fields: Box<[Field]>,

    /// This rule's predicate
    pub predicate: AnyPredicate,

    /// This rule's uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

impl Atom {
    /// Creates an atom, validating the field count against the predicate
    /// degree.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Degree`] on a field-count mismatch, or
    /// [`Error::OverlappingFields`] if a field is repeated.
    pub fn new(fields: &[&str], predicate: AnyPredicate) -> Result<Self> {
        Self::from_fields(fields.iter().map(|f| Field::from(*f)).collect(), predicate)
    }

    pub(crate) fn from_fields(fields: Vec<Field>, predicate: AnyPredicate) -> Result<Self> {
        if !predicate.degree().accepts(fields.len()) {
            return Err(Error::Degree {
                expected: predicate.degree(),
                got: fields.len(),
            });
        }

        let unique: BTreeSet<&Field> = fields.iter().collect();
        if unique.len() != fields.len() {
            return Err(Error::OverlappingFields(format!(
                "rule fields {fields:?} contain a repeat"
            )));
        }

        Ok(Self {
            fields: fields.into(),
            predicate,
            uuid: Uuid::new_v4(),
            name: None,
        })
    }

    /// The weakening formula of this atom.
    #[must_use]
    pub fn phi(&self) -> Formula {
        self.predicate.phi(&self.fields)
    }

    /// Computes the rule score of the given extraction.
    ///
    /// An atom whose fields are not all assigned scores 1 (it is not
    /// *decidable* yet, and must not penalise partial extractions).
    pub fn rule_score(&self, extraction: &Extraction, document: &Document) -> Result<RuleScore> {
        if self.fields.iter().any(|f| !extraction.contains(f)) {
            return Ok(RuleScore::Atom { score: 1.0 });
        }

        let entities: Vec<_> = self
            .fields
            .iter()
            .filter_map(|f| extraction.get(f))
            .collect();
        let score = self.predicate.score(&entities, document)?;
        Ok(RuleScore::Atom { score })
    }
}

/// A rule: an atom, or a connective over other rules
///
/// Conjunctions score as the product of their children, disjunctions as the
/// maximum.
#[derive(Clone, Debug)]
pub enum Rule {
    /// A single predicate application
    Atom(Atom),

    /// All child rules should hold
    Conjunction(Connective),

    /// At least one child rule should hold
    Disjunction(Connective),
}

/// The shared shape of conjunctions and disjunctions
#[derive(Clone, Debug)]
pub struct Connective {
    /// Child rules
    pub rules: Box<[Rule]>,

    /// This rule's uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

impl Connective {
    fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into(),
            uuid: Uuid::new_v4(),
            name: None,
        }
    }
}

/// Builds a conjunction of the given rules.
#[must_use]
pub fn conjunction(rules: Vec<Rule>) -> Rule {
    Rule::Conjunction(Connective::new(rules))
}

/// Builds a disjunction of the given rules.
#[must_use]
pub fn disjunction(rules: Vec<Rule>) -> Rule {
    Rule::Disjunction(Connective::new(rules))
}

impl Rule {
    /// This rule's uuid.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Atom(atom) => atom.uuid,
            Self::Conjunction(c) | Self::Disjunction(c) => c.uuid,
        }
    }

    /// The set of fields this rule applies to (for connectives, the union of
    /// the children's fields).
    #[must_use]
    pub fn fields(&self) -> BTreeSet<Field> {
        match self {
            Self::Atom(atom) => atom.fields.iter().cloned().collect(),
            Self::Conjunction(c) | Self::Disjunction(c) => {
                c.rules.iter().flat_map(Rule::fields).collect()
            }
        }
    }

    /// The atoms of this rule, recursively.
    #[must_use]
    pub fn atoms(&self) -> Vec<&Atom> {
        match self {
            Self::Atom(atom) => vec![atom],
            Self::Conjunction(c) | Self::Disjunction(c) => {
                c.rules.iter().flat_map(Rule::atoms).collect()
            }
        }
    }

    /// Returns `true` if every field of this rule is assigned by the
    /// extraction.
    #[must_use]
    pub fn is_decidable(&self, extraction: &Extraction) -> bool {
        self.fields().iter().all(|f| extraction.contains(f))
    }

    /// Computes the rule score of the given extraction.
    pub fn rule_score(&self, extraction: &Extraction, document: &Document) -> Result<RuleScore> {
        match self {
            Self::Atom(atom) => atom.rule_score(extraction, document),

            Self::Conjunction(c) => {
                let mut children = FxHashMap::default();
                let mut score = 1.0;
                for rule in &c.rules {
                    let sub = rule.rule_score(extraction, document)?;
                    score *= sub.score();
                    children.insert(rule.uuid(), sub);
                }
                Ok(RuleScore::Conjunction { score, children })
            }

            Self::Disjunction(c) => {
                let mut children = FxHashMap::default();
                let mut score = 0.0f64;
                for rule in &c.rules {
                    let sub = rule.rule_score(extraction, document)?;
                    score = score.max(sub.score());
                    children.insert(rule.uuid(), sub);
                }
                Ok(RuleScore::Disjunction { score, children })
            }
        }
    }

    /// The weakening formula of this rule: atoms delegate to their
    /// predicate, connectives to the matching logical connective.
    #[must_use]
    pub fn phi(&self) -> Formula {
        match self {
            Self::Atom(atom) => atom.phi(),
            Self::Conjunction(c) => crate::spatial_formula::simplify(&Formula::and(
                c.rules.iter().map(Rule::phi),
            )),
            Self::Disjunction(c) => crate::spatial_formula::simplify(&Formula::or(
                c.rules.iter().map(Rule::phi),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Degree;
    use crate::rules::textual::text_equals;
    use test_log::test;

    #[test]
    fn atom_degree_checked() {
        let predicate = text_equals("Total");
        assert!(predicate.applied_to(&["label"]).is_ok());
        assert!(matches!(
            predicate.applied_to(&["label", "value"]),
            Err(Error::Degree {
                expected: Degree::Fixed(1),
                ..
            })
        ));
    }

    #[test]
    fn repeated_fields_rejected() {
        let predicate = crate::rules::spatial::left_to_right_pair();
        assert!(matches!(
            predicate.applied_to(&["f", "f"]),
            Err(Error::OverlappingFields(_))
        ));
    }

    #[test]
    fn connective_fields_are_unions() -> crate::Result<()> {
        let rule = conjunction(vec![
            text_equals("a").applied_to(&["f1"])?,
            text_equals("b").applied_to(&["f2"])?,
        ]);
        let fields = rule.fields();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains("f1"));
        assert!(fields.contains("f2"));
        assert_eq!(rule.atoms().len(), 2);
        Ok(())
    }
}
