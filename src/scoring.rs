// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Scoring for extractions.
//!
//! A rule over fields F1..Fn is a score function over n entities returning a
//! number in `[0, 1]`. Given an extraction E and rules Rs, the *field score*
//! of F is the product of the scores of all rules touching F, and the
//! *extraction score* is `sum(field scores) / mass`, where the mass is a
//! scaling integer fixed by the bound node that emitted the extraction.

use crate::document::Document;
use crate::entity::EntityId;
use crate::extraction::{Extraction, Field};
use crate::rule::{Rule, RuleScore};
use crate::Result;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::rc::Rc;
use uuid::Uuid;

/// The strict lower bound on nontrivial field scores
///
/// Tolerances on individual rules encode "so misaligned that it scores 0";
/// this threshold additionally drops extractions where several rules score
/// badly without any single one hitting 0. It is strict so that setting it
/// to 0 would still discard zero-scoring assignments.
pub const MINIMUM_FIELD_SCORE: f64 = 0.1;

/// Is it valid to give a field this assignment, if the resulting field
/// score is this number?
#[must_use]
pub fn assignment_is_valid(assignment: Option<EntityId>, field_score: f64) -> bool {
    debug_assert!(
        assignment.is_some() || field_score == 0.0,
        "an unfilled assignment cannot have a nonzero field score"
    );
    assignment.is_none() || field_score > MINIMUM_FIELD_SCORE
}

/// The extraction score for these field scores at a node of this mass.
#[must_use]
pub fn extraction_score(field_scores: &BTreeMap<Field, f64>, mass: u32) -> f64 {
    field_scores.values().sum::<f64>() / f64::from(mass)
}

/// An extraction, plus metadata about its score and how it was computed
///
/// Ordering note: extractions are ranked from highest- to lowest-scoring,
/// so the heaps in the samplers are min-heaps producing best-first output.
#[derive(Clone, Debug)]
pub struct ScoredExtraction {
    /// The underlying assignment from fields to entities
    pub extraction: Extraction,

    /// The extraction score: `sum(field_scores) / mass`
    pub score: f64,

    /// Field score per field; fields explicitly left unfilled appear here
    /// with score 0 even though they carry no assignment
    pub field_scores: BTreeMap<Field, f64>,

    /// The rule scores that went into this extraction's score, by rule uuid
    pub rule_scores: FxHashMap<Uuid, RuleScore>,

    /// Mass of this extraction
    pub mass: u32,
}

impl ScoredExtraction {
    /// The empty extraction, with score 0.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            extraction: Extraction::empty(),
            score: 0.0,
            field_scores: BTreeMap::new(),
            rule_scores: FxHashMap::default(),
            mass: 1,
        }
    }

    /// Returns `true` if no field is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extraction.is_empty()
    }

    /// The entity assigned to this field, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<EntityId> {
        self.extraction.get(field)
    }

    /// The field score for this field.
    #[must_use]
    pub fn field_score(&self, field: &str) -> Option<f64> {
        self.field_scores.get(field).copied()
    }

    /// Is this field's assignment valid under its field score?
    #[must_use]
    pub fn field_is_valid(&self, field: &str) -> bool {
        let score = self.field_score(field).unwrap_or(0.0);
        assignment_is_valid(self.get(field), score)
    }

    /// An extraction is valid iff all its assigned fields are valid.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.extraction
            .fields()
            .all(|field| self.field_is_valid(field))
    }

    /// Re-derives the score under a different mass.
    #[must_use]
    pub fn normalize(&self, mass: u32) -> Self {
        Self {
            score: extraction_score(&self.field_scores, mass),
            ..self.clone()
        }
    }

    /// Rank-orders extractions from highest- to lowest-scoring.
    #[must_use]
    pub fn ranks_before(&self, other: &Self) -> bool {
        self.score > other.score
    }
}

fn cached_rule_score(
    rule: &Rule,
    extraction: &Extraction,
    score_cache: &FxHashMap<Uuid, RuleScore>,
    document: &Document,
) -> Result<RuleScore> {
    if let Some(score) = score_cache.get(&rule.uuid()) {
        return Ok(score.clone());
    }
    rule.rule_score(extraction, document)
}

/// An upper bound on the score a not-yet-decidable rule can reach.
///
/// Undecidable atoms are bounded by 1; connectives combine their children's
/// bounds. A bound of 0 means the rule is already doomed, whatever the
/// remaining fields get assigned.
fn upper_bound(
    rule: &Rule,
    extraction: &Extraction,
    score_cache: &FxHashMap<Uuid, RuleScore>,
    document: &Document,
) -> Result<f64> {
    if let Some(score) = score_cache.get(&rule.uuid()) {
        return Ok(score.score());
    }

    match rule {
        Rule::Atom(_) => {
            if rule.is_decidable(extraction) {
                Ok(rule.rule_score(extraction, document)?.score())
            } else {
                Ok(1.0)
            }
        }
        Rule::Disjunction(c) => {
            let mut bound: f64 = if c.rules.is_empty() { 1.0 } else { 0.0 };
            for sub_rule in &c.rules {
                bound = bound.max(upper_bound(sub_rule, extraction, score_cache, document)?);
            }
            Ok(bound)
        }
        Rule::Conjunction(c) => {
            let mut bound = 1.0;
            for sub_rule in &c.rules {
                bound *= upper_bound(sub_rule, extraction, score_cache, document)?;
            }
            Ok(bound)
        }
    }
}

/// Merges several scored extractions, applying the extra rules.
///
/// Rules decidable on the merged extraction multiply into the field scores
/// of their fields; non-decidable rules whose score upper bound is already 0
/// zero those fields out. Atom scores are cached by uuid across the inputs
/// so nothing is recomputed.
///
/// # Errors
///
/// Fails with [`OverlappingFields`](crate::Error::OverlappingFields) if the
/// inputs share any field, and propagates predicate scoring errors.
pub fn merge(
    parts: &[Rc<ScoredExtraction>],
    rules: &[Rule],
    mass: u32,
    document: &Document,
) -> Result<ScoredExtraction> {
    let extraction = Extraction::merge(parts.iter().map(|p| &p.extraction))?;

    let mut rule_scores: FxHashMap<Uuid, RuleScore> = FxHashMap::default();
    let mut field_scores: BTreeMap<Field, f64> = BTreeMap::new();
    for part in parts {
        rule_scores.extend(part.rule_scores.iter().map(|(k, v)| (*k, v.clone())));
        field_scores.extend(part.field_scores.iter().map(|(k, v)| (k.clone(), *v)));
    }

    // Score every decidable atom once, up front, so connective scoring can
    // reuse the results.
    let mut atom_scores: Vec<(Uuid, RuleScore)> = Vec::new();
    for rule in rules {
        for atom in rule.atoms() {
            if atom.fields.iter().all(|f| extraction.contains(f))
                && !rule_scores.contains_key(&atom.uuid)
            {
                let score = atom.rule_score(&extraction, document)?;
                atom_scores.push((atom.uuid, score));
            }
        }
    }
    rule_scores.extend(atom_scores);

    let (decidable, non_decidable): (Vec<&Rule>, Vec<&Rule>) =
        rules.iter().partition(|r| r.is_decidable(&extraction));

    let mut decidable_scores = Vec::with_capacity(decidable.len());
    for rule in decidable {
        let score = cached_rule_score(rule, &extraction, &rule_scores, document)?;
        decidable_scores.push((rule, score));
    }

    let mut early_exits = Vec::new();
    for rule in non_decidable {
        if upper_bound(rule, &extraction, &rule_scores, document)? == 0.0 {
            early_exits.push(rule);
        }
    }

    for (rule, score) in decidable_scores {
        for field in rule.fields() {
            if extraction.contains(&field) {
                if let Some(existing) = field_scores.get_mut(&field) {
                    *existing *= score.score();
                }
            }
        }
        rule_scores.insert(rule.uuid(), score);
    }

    for rule in early_exits {
        for field in rule.fields() {
            if extraction.contains(&field) {
                if let Some(existing) = field_scores.get_mut(&field) {
                    *existing = 0.0;
                }
            }
        }
    }

    let score = extraction_score(&field_scores, mass);
    Ok(ScoredExtraction {
        extraction,
        score,
        field_scores,
        rule_scores,
        mass,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn scored(fields: &[(&str, u32, f64)], mass: u32) -> ScoredExtraction {
        let extraction = Extraction::from_points(
            fields
                .iter()
                .map(|(f, i, _)| (Field::from(*f), EntityId(*i))),
        )
        .expect("unique fields");
        let field_scores: BTreeMap<Field, f64> = fields
            .iter()
            .map(|(f, _, s)| (Field::from(*f), *s))
            .collect();
        ScoredExtraction {
            score: extraction_score(&field_scores, mass),
            extraction,
            field_scores,
            rule_scores: FxHashMap::default(),
            mass,
        }
    }

    #[test]
    fn validity_threshold_is_strict() {
        let good = scored(&[("f", 0, 0.5)], 1);
        assert!(good.valid());

        let borderline = scored(&[("f", 0, MINIMUM_FIELD_SCORE)], 1);
        assert!(!borderline.valid());

        assert!(ScoredExtraction::empty().valid());
    }

    #[test]
    fn score_is_field_scores_over_mass() {
        let e = scored(&[("a", 0, 0.8), ("b", 1, 0.6)], 2);
        assert!((e.score - 0.7).abs() < 1e-9);

        let renormalized = e.normalize(4);
        assert!((renormalized.score - 0.35).abs() < 1e-9);
    }

    #[test]
    fn ranking_is_reversed() {
        let better = scored(&[("a", 0, 0.9)], 1);
        let worse = scored(&[("a", 1, 0.4)], 1);
        assert!(better.ranks_before(&worse));
        assert!(!worse.ranks_before(&better));
    }

    mod merge {
        use super::*;
        use crate::document::DocumentBuilder;
        use test_log::test;

        #[test]
        fn merging_overlapping_fields_fails() {
            let doc = DocumentBuilder::new("doc").finish();
            let a = Rc::new(scored(&[("f", 0, 0.9)], 1));
            let b = Rc::new(scored(&[("f", 1, 0.8)], 1));
            assert!(matches!(
                merge(&[a, b], &[], 2, &doc),
                Err(crate::Error::OverlappingFields(_))
            ));
        }

        #[test]
        fn merging_disjoint_fields_sums_scores() -> crate::Result<()> {
            let doc = DocumentBuilder::new("doc").finish();
            let a = Rc::new(scored(&[("a", 0, 0.9)], 1));
            let b = Rc::new(scored(&[("b", 1, 0.7)], 1));
            let merged = merge(&[a, b], &[], 2, &doc)?;
            assert!((merged.score - 0.8).abs() < 1e-9);
            assert_eq!(merged.extraction.len(), 2);
            Ok(())
        }
    }
}
