// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::document::Document;
use crate::extraction::Field;
use crate::geometry::BBox;
use crate::scoring::ScoredExtraction;
use crate::spatial_formula::{Dnf, DocRegionTerm, Literal};

/// One conjunct of a [`Restriction`]: the target region must be a subset of
/// `superset` (when present) and meet every region in `intersections`.
///
/// When both are present, each intersection region is a subset of the
/// superset.
#[derive(Clone, Debug)]
pub struct RestrictionConjunction {
    /// A region the target's bbox must be contained in
    pub superset: Option<BBox>,

    /// Regions the target's bbox must intersect
    pub intersections: Option<Vec<BBox>>,
}

/// Describes where a target field's assignment is allowed to live, in
/// disjunctive normal form
#[derive(Clone, Debug)]
pub enum Restriction {
    /// No constraint: every target is compatible
    Always,

    /// Unsatisfiable: no target is compatible
    Never,

    /// The disjunction of these conjunctions
    Regions(Vec<RestrictionConjunction>),
}

enum LiteralOutcome {
    Always,
    Never,
    Region(BBox),
}

fn term_region(
    term: &DocRegionTerm,
    feeder: &ScoredExtraction,
    document: &Document,
) -> Option<BBox> {
    // A `None` here means "empty set"; absence of the field is handled by
    // the callers before resolving.
    let entity = feeder.get(&term.field)?;
    let bbox = document.entity(entity).bbox();
    match &term.transform {
        Some(transform) => transform.apply(&bbox, document),
        None => Some(bbox),
    }
}

fn process_intersect(
    terms: &[DocRegionTerm],
    field: &Field,
    feeder: &ScoredExtraction,
    document: &Document,
) -> LiteralOutcome {
    let field_terms: Vec<&DocRegionTerm> =
        terms.iter().filter(|t| t.field == *field).collect();
    debug_assert!(field_terms.iter().all(|t| t.transform.is_none()));

    // Terms for fields the feeder leaves unassigned are true by convention.
    let non_field_terms: Vec<&DocRegionTerm> = terms
        .iter()
        .filter(|t| t.field != *field && feeder.get(&t.field).is_some())
        .collect();

    if non_field_terms.is_empty() {
        return LiteralOutcome::Always;
    }

    let mut regions = Vec::with_capacity(non_field_terms.len());
    for term in &non_field_terms {
        match term_region(term, feeder, document) {
            Some(region) => regions.push(region),
            // A term transformed into the empty set kills the intersection
            None => return LiteralOutcome::Never,
        }
    }

    let Some(intersection) = BBox::intersection(regions) else {
        return LiteralOutcome::Never;
    };

    if field_terms.is_empty() {
        return LiteralOutcome::Always;
    }

    LiteralOutcome::Region(intersection)
}

fn process_is_contained(
    lhs: &DocRegionTerm,
    rhs: &DocRegionTerm,
    field: &Field,
    feeder: &ScoredExtraction,
    document: &Document,
) -> LiteralOutcome {
    if rhs.field == *field && rhs.transform.is_some() {
        // Cannot restrict against a transformed target region; the
        // weakening step has already replaced such literals, but stay safe.
        return LiteralOutcome::Always;
    }

    for term in [lhs, rhs] {
        if term.field != *field && feeder.get(&term.field).is_none() {
            return LiteralOutcome::Always;
        }
    }

    if lhs.field == *field {
        debug_assert!(lhs.transform.is_none());
        return match term_region(rhs, feeder, document) {
            Some(region) => LiteralOutcome::Region(region),
            None => LiteralOutcome::Never,
        };
    }

    let Some(lhs_region) = term_region(lhs, feeder, document) else {
        // An empty left side is contained in anything
        return LiteralOutcome::Always;
    };
    let Some(rhs_region) = term_region(rhs, feeder, document) else {
        return LiteralOutcome::Never;
    };

    if rhs_region.contains_bbox(&lhs_region) {
        LiteralOutcome::Always
    } else {
        LiteralOutcome::Never
    }
}

enum ConjunctionOutcome {
    Always,
    Never,
    Restriction(RestrictionConjunction),
}

fn process_conjunction(
    conjunction: &[Literal],
    field: &Field,
    feeder: &ScoredExtraction,
    document: &Document,
) -> ConjunctionOutcome {
    let mut superset: Option<BBox> = None;
    let mut intersections: Option<Vec<BBox>> = None;

    for literal in conjunction {
        match literal {
            Literal::Const(false) => return ConjunctionOutcome::Never,
            Literal::Const(true) => {}

            Literal::Intersect(terms) => {
                match process_intersect(terms, field, feeder, document) {
                    LiteralOutcome::Never => return ConjunctionOutcome::Never,
                    LiteralOutcome::Always => {}
                    LiteralOutcome::Region(region) => {
                        intersections.get_or_insert_with(Vec::new).push(region);
                    }
                }
            }

            Literal::IsContained(lhs, rhs) => {
                match process_is_contained(lhs, rhs, field, feeder, document) {
                    LiteralOutcome::Never => return ConjunctionOutcome::Never,
                    LiteralOutcome::Always => {}
                    LiteralOutcome::Region(region) => {
                        superset = match superset {
                            None => Some(region),
                            Some(existing) => {
                                match BBox::intersection([existing, region]) {
                                    Some(combined) => Some(combined),
                                    None => return ConjunctionOutcome::Never,
                                }
                            }
                        };
                    }
                }
            }
        }
    }

    // Clip the intersection regions against the superset; a region pushed
    // entirely outside it makes the conjunction unsatisfiable.
    if let (Some(superset), Some(regions)) = (superset, intersections.as_mut()) {
        for region in regions.iter_mut() {
            match BBox::intersection([superset, *region]) {
                Some(clipped) => *region = clipped,
                None => return ConjunctionOutcome::Never,
            }
        }
    }

    if superset.is_none() && intersections.is_none() {
        return ConjunctionOutcome::Always;
    }

    ConjunctionOutcome::Restriction(RestrictionConjunction {
        superset,
        intersections,
    })
}

/// Given a formula (in DNF) whose predicates are over the target `field`'s
/// region and the feeder's fields' regions, describes the regions where the
/// target field's assignment is allowed to be.
#[must_use]
pub fn get_doc_region_restriction(
    field: &Field,
    feeder: &ScoredExtraction,
    phi: &Dnf,
    document: &Document,
) -> Restriction {
    let mut conjunctions = Vec::new();

    for conjunction in &phi.0 {
        match process_conjunction(conjunction, field, feeder, document) {
            ConjunctionOutcome::Always => return Restriction::Always,
            ConjunctionOutcome::Never => {}
            ConjunctionOutcome::Restriction(restriction) => conjunctions.push(restriction),
        }
    }

    if conjunctions.is_empty() {
        return Restriction::Never;
    }

    Restriction::Regions(conjunctions)
}
