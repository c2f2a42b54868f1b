// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Propositional formulas over document regions.
//!
//! Predicates declare a *weakening* of themselves as one of these formulas:
//! a condition on where other fields' assignments are allowed to live that is
//! implied by the predicate scoring positively. The combine machinery turns
//! such formulas into region queries (see
//! [`doc_region_restriction`](crate::doc_region_restriction)).

use crate::document::Document;
use crate::extraction::Field;
use crate::geometry::{BBox, Interval};
use crate::rules::spatial::{AlignmentLine, Direction};
use std::collections::BTreeSet;

/// A geometric transformation attached to a document-region term
///
/// Terms usually name a field's bounding box directly; a transformation
/// instead derives a band from it (e.g. "the band within k line heights of
/// this bbox's right edge"). Lengths are in line-height units and multiplied
/// by the document's median line height when applied.
#[derive(Clone, Debug, PartialEq)]
pub enum RegionTransform {
    /// The band of the given radius around one of the bbox's alignment
    /// lines, spanning the document in the other axis
    AlignmentBand {
        /// Which alignment line the band is centred on
        anchors: AlignmentLine,

        /// Half-width of the band, in line heights
        radius: f64,
    },

    /// The half-plane-like region a second bbox must be *contained* in to
    /// lie in the given direction from this one
    ArrangementContainment {
        /// Direction from this bbox towards the other
        direction: Direction,

        /// Gap offset (minimum distance minus taper), in line heights
        distance: f64,
    },

    /// The region a second bbox must *intersect* for its gap to this one to
    /// stay below a maximum distance
    ArrangementIntersection {
        /// Direction from this bbox towards the other
        direction: Direction,

        /// Gap limit (maximum distance plus taper), in line heights
        distance: f64,
    },
}

impl RegionTransform {
    /// Applies the transformation to a concrete bbox.
    ///
    /// Returns `None` when the resulting region is empty.
    #[must_use]
    pub fn apply(&self, bbox: &BBox, document: &Document) -> Option<BBox> {
        let doc_bbox = document.bbox();
        let unit = document.median_line_height();

        match self {
            Self::AlignmentBand { anchors, radius } => {
                let radius = radius * unit;
                match anchors {
                    AlignmentLine::LeftSides
                    | AlignmentLine::RightSides
                    | AlignmentLine::VerticalMidlines => {
                        let x0 = match anchors {
                            AlignmentLine::LeftSides => bbox.ix.a,
                            AlignmentLine::RightSides => bbox.ix.b,
                            _ => bbox.ix.center(),
                        };
                        Some(BBox::new(
                            Interval::new(x0 - radius, x0 + radius),
                            doc_bbox.iy,
                        ))
                    }
                    AlignmentLine::Tops
                    | AlignmentLine::Bottoms
                    | AlignmentLine::HorizontalMidlines => {
                        let y0 = match anchors {
                            AlignmentLine::Tops => bbox.iy.a,
                            AlignmentLine::Bottoms => bbox.iy.b,
                            _ => bbox.iy.center(),
                        };
                        Some(BBox::new(
                            doc_bbox.ix,
                            Interval::new(y0 - radius, y0 + radius),
                        ))
                    }
                }
            }

            Self::ArrangementContainment {
                direction,
                distance,
            } => {
                let distance = distance * unit;
                match direction {
                    Direction::LeftToRight => BBox::build(
                        Interval::build(bbox.ix.b + distance, doc_bbox.ix.b),
                        Some(doc_bbox.iy),
                    ),
                    Direction::RightToLeft => BBox::build(
                        Interval::build(doc_bbox.ix.a, bbox.ix.a - distance),
                        Some(doc_bbox.iy),
                    ),
                    Direction::TopDown => BBox::build(
                        Some(doc_bbox.ix),
                        Interval::build(bbox.iy.b + distance, doc_bbox.iy.b),
                    ),
                    Direction::BottomUp => BBox::build(
                        Some(doc_bbox.ix),
                        Interval::build(doc_bbox.iy.a, bbox.iy.a - distance),
                    ),
                }
            }

            Self::ArrangementIntersection {
                direction,
                distance,
            } => {
                let distance = distance * unit;
                match direction {
                    Direction::LeftToRight => BBox::build(
                        Interval::build(doc_bbox.ix.a, bbox.ix.b + distance),
                        Some(doc_bbox.iy),
                    ),
                    Direction::RightToLeft => BBox::build(
                        Interval::build(bbox.ix.a - distance, doc_bbox.ix.b),
                        Some(doc_bbox.iy),
                    ),
                    Direction::TopDown => BBox::build(
                        Some(doc_bbox.ix),
                        Interval::build(doc_bbox.iy.a, bbox.iy.b + distance),
                    ),
                    Direction::BottomUp => BBox::build(
                        Some(doc_bbox.ix),
                        Interval::build(bbox.iy.a - distance, doc_bbox.iy.b),
                    ),
                }
            }
        }
    }
}

/// Names a field's document region, optionally post-composed with a
/// geometric transformation
#[derive(Clone, Debug, PartialEq)]
pub struct DocRegionTerm {
    /// The field whose assignment's bbox this term denotes
    pub field: Field,

    /// Optional transformation applied to that bbox
    pub transform: Option<RegionTransform>,
}

impl DocRegionTerm {
    /// A term naming the field's bbox directly.
    #[must_use]
    pub fn field(field: &Field) -> Self {
        Self {
            field: field.clone(),
            transform: None,
        }
    }

    /// A term naming a transformation of the field's bbox.
    #[must_use]
    pub fn transformed(field: &Field, transform: RegionTransform) -> Self {
        Self {
            field: field.clone(),
            transform: Some(transform),
        }
    }

    fn is_naked(&self, target: &Field) -> bool {
        self.field == *target && self.transform.is_none()
    }
}

/// A propositional formula whose literals constrain document regions
#[derive(Clone, Debug, PartialEq)]
pub enum Formula {
    /// A boolean constant
    Lit(bool),

    /// The intersection of the named regions is non-empty
    Intersect(Vec<DocRegionTerm>),

    /// The first region is contained in the second
    IsContained(DocRegionTerm, DocRegionTerm),

    /// All subformulas hold
    And(Vec<Formula>),

    /// At least one subformula holds
    Or(Vec<Formula>),
}

/// A formula literal, as found inside a [`Dnf`]
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// A boolean constant
    Const(bool),

    /// The intersection of the named regions is non-empty
    Intersect(Vec<DocRegionTerm>),

    /// The first region is contained in the second
    IsContained(DocRegionTerm, DocRegionTerm),
}

/// A formula in disjunctive normal form: a disjunction of conjunctions of
/// literals
#[derive(Clone, Debug, PartialEq)]
pub struct Dnf(pub Vec<Vec<Literal>>);

impl Formula {
    /// Conjunction over an iterator of formulas.
    pub fn and(formulas: impl IntoIterator<Item = Self>) -> Self {
        Self::And(formulas.into_iter().collect())
    }

    /// Disjunction over an iterator of formulas.
    pub fn or(formulas: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(formulas.into_iter().collect())
    }

    fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Lit(_) | Self::Intersect(_) | Self::IsContained(..)
        )
    }

    /// All document-region terms appearing in the formula, with multiplicity.
    #[must_use]
    pub fn terms(&self) -> Vec<&DocRegionTerm> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a DocRegionTerm>) {
        match self {
            Self::Lit(_) => {}
            Self::Intersect(terms) => out.extend(terms.iter()),
            Self::IsContained(lhs, rhs) => {
                out.push(lhs);
                out.push(rhs);
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_terms(out);
                }
            }
        }
    }

    /// Evaluates the formula against concrete field bboxes.
    ///
    /// A term referencing a field for which `lookup` returns `None` makes
    /// its literal `true` (the convention used throughout the prefilter
    /// machinery: unknown regions never eliminate anything).
    pub fn evaluate(&self, lookup: &impl Fn(&Field) -> Option<BBox>, document: &Document) -> bool {
        let resolve = |term: &DocRegionTerm| -> Option<Option<BBox>> {
            // Outer None: field unknown. Inner None: empty region.
            let bbox = lookup(&term.field)?;
            Some(match &term.transform {
                Some(t) => t.apply(&bbox, document),
                None => Some(bbox),
            })
        };

        match self {
            Self::Lit(b) => *b,
            Self::Intersect(terms) => {
                let mut regions = Vec::new();
                for term in terms {
                    match resolve(term) {
                        None => return true,
                        Some(None) => return false,
                        Some(Some(region)) => regions.push(region),
                    }
                }
                BBox::intersection(regions).is_some()
            }
            Self::IsContained(lhs, rhs) => {
                let (Some(lhs), Some(rhs)) = (resolve(lhs), resolve(rhs)) else {
                    return true;
                };
                match (lhs, rhs) {
                    (None, _) => true,
                    (Some(_), None) => false,
                    (Some(lhs), Some(rhs)) => rhs.contains_bbox(&lhs),
                }
            }
            Self::And(children) => children.iter().all(|c| c.evaluate(lookup, document)),
            Self::Or(children) => children.iter().any(|c| c.evaluate(lookup, document)),
        }
    }
}

/// Simplifies a formula: drops neutral constants, collapses absorbing ones,
/// flattens nested connectives of the same kind.
#[must_use]
pub fn simplify(f: &Formula) -> Formula {
    match f {
        Formula::Lit(_) | Formula::Intersect(_) | Formula::IsContained(..) => f.clone(),

        Formula::And(children) => {
            let mut terms: Vec<Formula> = Vec::new();
            for child in children.iter().map(simplify) {
                match child {
                    Formula::Lit(true) => {}
                    Formula::And(inner) => terms.extend(inner),
                    other => terms.push(other),
                }
            }
            if terms.iter().any(|t| matches!(t, Formula::Lit(false))) {
                return Formula::Lit(false);
            }
            match terms.len() {
                0 => Formula::Lit(true),
                1 => terms.remove(0),
                _ => Formula::And(terms),
            }
        }

        Formula::Or(children) => {
            let mut terms: Vec<Formula> = Vec::new();
            for child in children.iter().map(simplify) {
                match child {
                    Formula::Lit(false) => {}
                    Formula::Or(inner) => terms.extend(inner),
                    other => terms.push(other),
                }
            }
            if terms.iter().any(|t| matches!(t, Formula::Lit(true))) {
                return Formula::Lit(true);
            }
            match terms.len() {
                0 => Formula::Lit(false),
                1 => terms.remove(0),
                _ => Formula::Or(terms),
            }
        }
    }
}

fn as_literal(f: &Formula) -> Option<Literal> {
    match f {
        Formula::Lit(b) => Some(Literal::Const(*b)),
        Formula::Intersect(terms) => Some(Literal::Intersect(terms.clone())),
        Formula::IsContained(lhs, rhs) => Some(Literal::IsContained(lhs.clone(), rhs.clone())),
        _ => None,
    }
}

/// Converts a formula to disjunctive normal form.
#[must_use]
pub fn to_dnf(f: &Formula) -> Dnf {
    fn dnf_of(f: &Formula) -> Vec<Vec<Literal>> {
        if let Some(literal) = as_literal(f) {
            return vec![vec![literal]];
        }
        match f {
            Formula::Or(children) => children.iter().flat_map(dnf_of).collect(),
            Formula::And(children) => {
                let mut conjunctions: Vec<Vec<Literal>> = vec![Vec::new()];
                for child in children {
                    let child_dnf = dnf_of(child);
                    let mut next = Vec::with_capacity(conjunctions.len() * child_dnf.len());
                    for existing in &conjunctions {
                        for addition in &child_dnf {
                            let mut combined = existing.clone();
                            combined.extend(addition.iter().cloned());
                            next.push(combined);
                        }
                    }
                    conjunctions = next;
                }
                conjunctions
            }
            _ => unreachable!("literal handled above"),
        }
    }

    Dnf(dnf_of(&simplify(f)))
}

/// Can this literal be computed from the regions of these fields alone?
fn is_computable(literal: &Formula, fields: &BTreeSet<Field>) -> bool {
    match literal {
        Formula::Intersect(terms) => terms.iter().all(|t| fields.contains(&t.field)),
        Formula::IsContained(lhs, rhs) => {
            fields.contains(&lhs.field) && fields.contains(&rhs.field)
        }
        _ => false,
    }
}

/// Given the regions of these fields, does this literal let us restrict the
/// legal regions of the target field's assignment?
fn is_restrictor(literal: &Formula, target: &Field, fields: &BTreeSet<Field>) -> bool {
    match literal {
        Formula::Intersect(terms) => terms
            .iter()
            .all(|t| t.is_naked(target) || fields.contains(&t.field)),
        Formula::IsContained(lhs, rhs) => {
            (lhs.is_naked(target) && fields.contains(&rhs.field))
                || (fields.contains(&lhs.field) && rhs.is_naked(target))
        }
        _ => false,
    }
}

fn literal_is_restrictor(literal: &Literal, target: &Field, fields: &BTreeSet<Field>) -> bool {
    match literal {
        Literal::Const(_) => false,
        Literal::Intersect(terms) => {
            is_restrictor(&Formula::Intersect(terms.clone()), target, fields)
        }
        Literal::IsContained(lhs, rhs) => is_restrictor(
            &Formula::IsContained(lhs.clone(), rhs.clone()),
            target,
            fields,
        ),
    }
}

/// Replaces all literals that neither restrict the target field nor are
/// computable from the feeder fields with `true`.
#[must_use]
pub fn weaken(f: &Formula, target: &Field, fields: &BTreeSet<Field>) -> Formula {
    match f {
        Formula::Lit(_) => f.clone(),
        Formula::Intersect(_) | Formula::IsContained(..) => {
            if is_restrictor(f, target, fields) || is_computable(f, fields) {
                f.clone()
            } else {
                Formula::Lit(true)
            }
        }
        Formula::And(children) => {
            Formula::And(children.iter().map(|c| weaken(c, target, fields)).collect())
        }
        Formula::Or(children) => {
            Formula::Or(children.iter().map(|c| weaken(c, target, fields)).collect())
        }
    }
}

/// The largest number of restrictor literals found in any one conjunction of
/// the DNF; a measure of how well this formula can prefilter the target
/// field.
#[must_use]
pub fn restrictive_power(dnf: &Dnf, target: &Field, fields: &BTreeSet<Field>) -> usize {
    dnf.0
        .iter()
        .map(|conjunction| {
            conjunction
                .iter()
                .filter(|literal| literal_is_restrictor(literal, target, fields))
                .count()
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn field(name: &str) -> Field {
        Field::from(name)
    }

    fn intersect(names: &[&str]) -> Formula {
        Formula::Intersect(names.iter().map(|n| DocRegionTerm::field(&field(n))).collect())
    }

    #[test]
    fn simplify_constants() {
        let f = Formula::and([Formula::Lit(true), intersect(&["a", "b"])]);
        assert_eq!(simplify(&f), intersect(&["a", "b"]));

        let f = Formula::and([Formula::Lit(false), intersect(&["a", "b"])]);
        assert_eq!(simplify(&f), Formula::Lit(false));

        let f = Formula::or([Formula::Lit(true), intersect(&["a", "b"])]);
        assert_eq!(simplify(&f), Formula::Lit(true));

        assert_eq!(simplify(&Formula::and([])), Formula::Lit(true));
        assert_eq!(simplify(&Formula::or([])), Formula::Lit(false));
    }

    #[test]
    fn simplify_flattens() {
        let f = Formula::and([
            Formula::and([intersect(&["a", "b"]), intersect(&["b", "c"])]),
            intersect(&["c", "d"]),
        ]);
        match simplify(&f) {
            Formula::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected flattened conjunction, got {other:?}"),
        }
    }

    #[test]
    fn dnf_distributes() {
        let f = Formula::and([
            Formula::or([intersect(&["a", "x"]), intersect(&["b", "x"])]),
            intersect(&["c", "x"]),
        ]);
        let dnf = to_dnf(&f);
        assert_eq!(dnf.0.len(), 2);
        assert!(dnf.0.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn weaken_drops_uncomputable_literals() {
        let target = field("t");
        let feeder: BTreeSet<Field> = [field("f")].into();

        // Restrictor: intersect over the naked target and a feeder field
        let restrictor = intersect(&["t", "f"]);
        assert_eq!(weaken(&restrictor, &target, &feeder), restrictor);

        // Not computable, not a restrictor: references an unrelated field
        let unrelated = intersect(&["t", "elsewhere"]);
        assert_eq!(weaken(&unrelated, &target, &feeder), Formula::Lit(true));
    }

    #[test]
    fn restrictive_power_counts_restrictors() {
        let target = field("t");
        let feeder: BTreeSet<Field> = [field("f")].into();

        let f = Formula::and([intersect(&["t", "f"]), intersect(&["t", "f"])]);
        assert_eq!(restrictive_power(&to_dnf(&f), &target, &feeder), 2);

        let g = Formula::or([intersect(&["t", "f"]), intersect(&["t", "elsewhere"])]);
        assert_eq!(restrictive_power(&to_dnf(&g), &target, &feeder), 1);
    }
}
