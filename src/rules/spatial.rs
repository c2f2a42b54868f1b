// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Predicates describing spatial relationships and positioning.
//!
//! Design-level lengths (tolerances, tapers, distances) are in *line
//! heights* and are multiplied by the document's median line height before
//! being compared against document pixels.

use super::{expect_one, expect_two};
use crate::document::Document;
use crate::entity::EntityId;
use crate::extraction::Field;
use crate::geometry::Interval;
use crate::predicate::{AnyPredicate, Degree, Leniency, Predicate};
use crate::rule::{conjunction, Rule};
use crate::spatial_formula::{DocRegionTerm, Formula, RegionTransform};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A direction on the page
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(missing_docs)]
pub enum Direction {
    TopDown,
    LeftToRight,
    BottomUp,
    RightToLeft,
}

impl Direction {
    /// The opposite direction.
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::LeftToRight => Self::RightToLeft,
            Self::RightToLeft => Self::LeftToRight,
            Self::TopDown => Self::BottomUp,
            Self::BottomUp => Self::TopDown,
        }
    }
}

/// An orientation on the page
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(missing_docs)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// An alignment line, e.g. as an argument to rules specifying that fields'
/// sides or midlines line up
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(missing_docs)]
pub enum AlignmentLine {
    LeftSides,
    Bottoms,
    HorizontalMidlines,
    RightSides,
    Tops,
    VerticalMidlines,
}

/// The continuous taper used by the spatial rules: score 1 up to
/// `tolerance`, then a linear ramp hitting 0 at `tolerance + taper`.
pub(crate) fn taper_error(raw_error: f64, tolerance: f64, taper: f64) -> f64 {
    debug_assert!(raw_error >= 0.0 && tolerance >= 0.0 && taper >= 0.0);
    let error = (raw_error - tolerance).max(0.0);
    if error == 0.0 {
        return 1.0;
    }
    if taper == 0.0 {
        return 0.0;
    }
    // abs to avoid -0.0 in output
    (1.0 - (error / taper).min(1.0)).abs()
}

pub(crate) fn length_in_native_units(length: f64, document: &Document) -> f64 {
    length * document.median_line_height()
}

/// Says two fields are spatially lined up.
///
/// For multipage documents the pages are assumed to be left-aligned when
/// comparing alignment across pages.
#[derive(Clone, Debug, PartialEq)]
pub struct AreAligned {
    /// What to check the alignment of
    pub anchors: AlignmentLine,

    /// Band width (in line heights) within which the score is 1
    pub tolerance: f64,

    /// Width of the taper-to-0 band on either side of the tolerance band
    pub taper: f64,
}

impl Hash for AreAligned {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.anchors.hash(state);
        crate::predicate::hash_f64(self.tolerance, state);
        crate::predicate::hash_f64(self.taper, state);
    }
}

impl AreAligned {
    fn anchor_coordinate(self_anchors: AlignmentLine, bbox: &crate::geometry::BBox) -> f64 {
        match self_anchors {
            AlignmentLine::LeftSides => bbox.ix.a,
            AlignmentLine::RightSides => bbox.ix.b,
            AlignmentLine::VerticalMidlines => bbox.ix.center(),
            AlignmentLine::Tops => bbox.iy.a,
            AlignmentLine::Bottoms => bbox.iy.b,
            AlignmentLine::HorizontalMidlines => bbox.iy.center(),
        }
    }
}

impl Predicate for AreAligned {
    fn name(&self) -> &'static str {
        "are_aligned"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(2)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let (e1, e2) = expect_two(entities)?;
        let b1 = document.entity(e1).bbox();
        let b2 = document.entity(e2).bbox();

        let r1 = Self::anchor_coordinate(self.anchors, &b1);
        let r2 = Self::anchor_coordinate(self.anchors, &b2);

        Ok(taper_error(
            (r1 - r2).abs(),
            length_in_native_units(self.tolerance, document),
            length_in_native_units(self.taper, document),
        ))
    }

    fn phi(&self, fields: &[Field]) -> Formula {
        let [f1, f2] = fields else {
            return Formula::Lit(true);
        };
        let band = RegionTransform::AlignmentBand {
            anchors: self.anchors,
            radius: self.tolerance + self.taper,
        };
        Formula::and([
            Formula::Intersect(vec![
                DocRegionTerm::transformed(f1, band.clone()),
                DocRegionTerm::field(f2),
            ]),
            Formula::Intersect(vec![
                DocRegionTerm::transformed(f2, band),
                DocRegionTerm::field(f1),
            ]),
        ])
    }

    fn leniency(&self) -> Leniency {
        Leniency::Low
    }
}

/// Says two fields are arranged spatially in some way.
///
/// For fields E1, E2 arranged e.g. left-to-right, let `d` be the gap between
/// E1's right side and E2's left side. The rule scores 1 when `d` lies in
/// `[min_distance, max_distance]` and tapers to 0 over the taper distance
/// once `d` leaves this interval.
#[derive(Clone, Debug, PartialEq)]
pub struct AreArranged {
    /// The direction from the first field towards the second
    pub direction: Direction,

    /// Width of the taper band, in line heights
    pub taper: f64,

    /// Minimum gap between the fields, in line heights
    pub min_distance: f64,

    /// Optional maximum gap between the fields, in line heights
    pub max_distance: Option<f64>,
}

impl Hash for AreArranged {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.direction.hash(state);
        crate::predicate::hash_f64(self.taper, state);
        crate::predicate::hash_f64(self.min_distance, state);
        crate::predicate::hash_opt_f64(self.max_distance, state);
    }
}

impl AreArranged {
    fn score_interval_precedence(&self, i1: Interval, i2: Interval, document: &Document) -> f64 {
        let min_i2_a = i1.b + length_in_native_units(self.min_distance, document);
        let left_side_error = (min_i2_a - i2.a).max(0.0);

        let right_side_error = self.max_distance.map_or(0.0, |max_distance| {
            let max_i2_a = i1.b + length_in_native_units(max_distance, document);
            (i2.a - max_i2_a).max(0.0)
        });

        taper_error(
            left_side_error.max(right_side_error),
            0.0,
            length_in_native_units(self.taper, document),
        )
    }
}

impl Predicate for AreArranged {
    fn name(&self) -> &'static str {
        "are_arranged"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(2)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let (e1, e2) = expect_two(entities)?;
        let b1 = document.entity(e1).bbox();
        let b2 = document.entity(e2).bbox();

        let (i1, i2) = match self.direction {
            Direction::LeftToRight => (b1.ix, b2.ix),
            Direction::RightToLeft => (b2.ix, b1.ix),
            Direction::TopDown => (b1.iy, b2.iy),
            Direction::BottomUp => (b2.iy, b1.iy),
        };

        Ok(self.score_interval_precedence(i1, i2, document))
    }

    fn phi(&self, fields: &[Field]) -> Formula {
        let [f1, f2] = fields else {
            return Formula::Lit(true);
        };

        let containment = |direction: Direction| RegionTransform::ArrangementContainment {
            direction,
            distance: self.min_distance - self.taper,
        };

        let min_distance_formula = Formula::and([
            Formula::IsContained(
                DocRegionTerm::field(f2),
                DocRegionTerm::transformed(f1, containment(self.direction)),
            ),
            Formula::IsContained(
                DocRegionTerm::field(f1),
                DocRegionTerm::transformed(f2, containment(self.direction.reverse())),
            ),
        ]);

        let max_distance_formula = self.max_distance.map_or(Formula::Lit(true), |max_distance| {
            let band = |direction: Direction| RegionTransform::ArrangementIntersection {
                direction,
                distance: max_distance + self.taper,
            };
            Formula::and([
                Formula::Intersect(vec![
                    DocRegionTerm::field(f2),
                    DocRegionTerm::transformed(f1, band(self.direction)),
                ]),
                Formula::Intersect(vec![
                    DocRegionTerm::field(f1),
                    DocRegionTerm::transformed(f2, band(self.direction.reverse())),
                ]),
            ])
        });

        crate::spatial_formula::simplify(&Formula::and([
            min_distance_formula,
            max_distance_formula,
        ]))
    }

    fn leniency(&self) -> Leniency {
        Leniency::High
    }
}

/// Says that a field is in a particular region of the document.
///
/// The score is the portion of the field's bounding box contained in the
/// specified region; the input units are fractions of document (or page)
/// width and height.
#[derive(Clone, Debug, PartialEq)]
pub struct IsInRegion {
    /// Legal horizontal range, as fractions of the width
    pub x_range: Option<(f64, f64)>,

    /// Legal vertical range, as fractions of the height
    pub y_range: Option<(f64, f64)>,

    /// Measure against the page the field is on, instead of the document
    pub limit_to_page: bool,
}

impl Hash for IsInRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::predicate::hash_opt_f64(self.x_range.map(|r| r.0), state);
        crate::predicate::hash_opt_f64(self.x_range.map(|r| r.1), state);
        crate::predicate::hash_opt_f64(self.y_range.map(|r| r.0), state);
        crate::predicate::hash_opt_f64(self.y_range.map(|r| r.1), state);
        self.limit_to_page.hash(state);
    }
}

impl Predicate for IsInRegion {
    fn name(&self) -> &'static str {
        "is_in_region"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        let bbox = entity.bbox();

        let doc_bbox = if self.limit_to_page {
            let pages = document.pages_intersecting(&bbox);
            if pages.len() > 1 {
                log::warn!("entity spans multiple pages, using first page for is_in_region");
            }
            match pages.first() {
                Some(page) => document.entity(*page).bbox(),
                None => {
                    log::debug!("entity at {bbox:?} is on no page, using document bounds");
                    document.bbox()
                }
            }
        } else {
            document.bbox()
        };

        let legal = |range: Option<(f64, f64)>, extent: Interval| {
            range.map(|(lo, hi)| {
                Interval::new(
                    extent.a + lo * extent.length(),
                    extent.b - (1.0 - hi) * extent.length(),
                )
            })
        };

        let x_percentage = legal(self.x_range, doc_bbox.ix)
            .map_or(1.0, |range| range.contains_percentage_of(&bbox.ix));
        let y_percentage = legal(self.y_range, doc_bbox.iy)
            .map_or(1.0, |range| range.contains_percentage_of(&bbox.iy));

        Ok(x_percentage * y_percentage)
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says a field is on one of the given pages.
///
/// The first page of the document is page 1. Scores are linearly
/// interpolated between the table's keys and clamped beyond the outermost
/// keys, as in [`line_count_is`](super::textual::line_count_is).
#[derive(Clone, Debug, PartialEq)]
pub struct PageNumberIs {
    /// Map from page number to score
    pub score_dict: BTreeMap<i64, f64>,
}

impl Hash for PageNumberIs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        crate::predicate::hash_score_dict(&self.score_dict, state);
    }
}

impl Predicate for PageNumberIs {
    fn name(&self) -> &'static str {
        "page_number_is"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(1)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let entity = document.entity(expect_one(entities)?);
        let pages = document.page_numbers_intersecting(&entity.bbox());

        if pages.is_empty() {
            log::debug!("entity at {:?} is on no page", entity.bbox());
            return Ok(0.0);
        }

        Ok(pages
            .into_iter()
            .map(|n| super::textual::count_score(&self.score_dict, i64::from(n)))
            .fold(0.0, f64::max))
    }

    fn leniency(&self) -> Leniency {
        Leniency::NotApplicable
    }
}

/// Says that two fields are on the same page of the document.
///
/// The page error is the number of pages of separation between the fields.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AreOnSamePage {
    /// Scores 1 if the page error is at most this
    pub tolerance: u32,

    /// The score tapers from 1 to 0 as the page error minus the tolerance
    /// goes from 0 to `taper + 1` inclusive
    pub taper: u32,
}

impl Predicate for AreOnSamePage {
    fn name(&self) -> &'static str {
        "are_on_same_page"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(2)
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let (e1, e2) = expect_two(entities)?;
        let p1 = document.page_numbers_intersecting(&document.entity(e1).bbox());
        let p2 = document.page_numbers_intersecting(&document.entity(e2).bbox());

        let (Some(&min1), Some(&max1)) = (p1.iter().min(), p1.iter().max()) else {
            log::debug!("entity is on no page");
            return Ok(0.0);
        };
        let (Some(&min2), Some(&max2)) = (p2.iter().min(), p2.iter().max()) else {
            log::debug!("entity is on no page");
            return Ok(0.0);
        };

        let error = if min1 >= max2 {
            min1 - max2
        } else {
            min2.saturating_sub(max1)
        };

        Ok(taper_error(
            f64::from(error),
            f64::from(self.tolerance),
            f64::from(self.taper + 1),
        ))
    }
}

/// Builds an alignment predicate.
///
/// # Errors
///
/// Fails if the tolerance or taper is negative. When no taper is given it
/// defaults to the tolerance.
pub fn are_aligned(
    anchors: AlignmentLine,
    tolerance: f64,
    taper: Option<f64>,
) -> Result<AnyPredicate> {
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "tolerance must be nonnegative; got {tolerance}"
        )));
    }
    let taper = taper.unwrap_or(tolerance);
    if taper.is_nan() || taper < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "taper must be nonnegative; got {taper}"
        )));
    }
    Ok(AreAligned {
        anchors,
        tolerance,
        taper,
    }
    .into())
}

/// Builds an arrangement predicate.
///
/// # Errors
///
/// Fails if the taper is negative. It is not recommended to set the taper to
/// 0; allow some play.
pub fn are_arranged(
    direction: Direction,
    taper: f64,
    min_distance: f64,
    max_distance: Option<f64>,
) -> Result<AnyPredicate> {
    if taper.is_nan() || taper < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "taper must be nonnegative; got {taper}"
        )));
    }
    Ok(AreArranged {
        direction,
        taper,
        min_distance,
        max_distance,
    }
    .into())
}

/// Pairwise bottom alignment with the default tolerances.
#[must_use]
pub fn bottom_aligned_pair() -> AnyPredicate {
    AreAligned {
        anchors: AlignmentLine::Bottoms,
        tolerance: 0.5,
        taper: 0.5,
    }
    .into()
}

/// Pairwise left alignment with the default tolerances.
#[must_use]
pub fn left_aligned_pair() -> AnyPredicate {
    AreAligned {
        anchors: AlignmentLine::LeftSides,
        tolerance: 1.0,
        taper: 1.0,
    }
    .into()
}

/// Pairwise right alignment with the default tolerances.
#[must_use]
pub fn right_aligned_pair() -> AnyPredicate {
    AreAligned {
        anchors: AlignmentLine::RightSides,
        tolerance: 1.0,
        taper: 1.0,
    }
    .into()
}

/// Pairwise top-down arrangement with the default taper.
#[must_use]
pub fn top_down_pair() -> AnyPredicate {
    AreArranged {
        direction: Direction::TopDown,
        taper: 0.5,
        min_distance: 0.0,
        max_distance: None,
    }
    .into()
}

/// Pairwise left-to-right arrangement with the default taper.
#[must_use]
pub fn left_to_right_pair() -> AnyPredicate {
    AreArranged {
        direction: Direction::LeftToRight,
        taper: 0.5,
        min_distance: 0.0,
        max_distance: None,
    }
    .into()
}

/// Says that the first field is on the next logical line above the second.
#[must_use]
pub fn one_line_above() -> AnyPredicate {
    AreArranged {
        direction: Direction::TopDown,
        taper: 0.5,
        min_distance: 0.0,
        max_distance: Some(0.5),
    }
    .into()
}

/// Says that the first field is one-to-two lines above the second.
#[must_use]
pub fn one_to_two_lines_above() -> AnyPredicate {
    AreArranged {
        direction: Direction::TopDown,
        taper: 0.5,
        min_distance: 0.0,
        max_distance: Some(1.5),
    }
    .into()
}

fn pairwise(fields: &[&str], make: impl Fn() -> AnyPredicate) -> Result<Rule> {
    if fields.len() < 2 {
        return Err(Error::InvalidParameter(
            "pairwise rule constructors take at least 2 fields".into(),
        ));
    }
    if fields.len() == 2 {
        return make().applied_to(fields);
    }

    let mut atoms = Vec::new();
    for (i, f1) in fields.iter().enumerate() {
        for f2 in &fields[i + 1..] {
            atoms.push(make().applied_to(&[*f1, *f2])?);
        }
    }
    Ok(conjunction(atoms))
}

/// Says that some fields are pairwise left-aligned.
///
/// # Errors
///
/// Fails with fewer than 2 fields, or on a repeated field.
pub fn left_aligned(fields: &[&str]) -> Result<Rule> {
    pairwise(fields, left_aligned_pair)
}

/// Says that some fields are pairwise right-aligned.
///
/// # Errors
///
/// Fails with fewer than 2 fields, or on a repeated field.
pub fn right_aligned(fields: &[&str]) -> Result<Rule> {
    pairwise(fields, right_aligned_pair)
}

/// Says that some fields are pairwise bottom-aligned.
///
/// # Errors
///
/// Fails with fewer than 2 fields, or on a repeated field.
pub fn bottom_aligned(fields: &[&str]) -> Result<Rule> {
    pairwise(fields, bottom_aligned_pair)
}

/// Says that some fields run top-down, pairwise.
///
/// # Errors
///
/// Fails with fewer than 2 fields, or on a repeated field.
pub fn top_down(fields: &[&str]) -> Result<Rule> {
    pairwise(fields, top_down_pair)
}

/// Says that some fields run left-to-right, pairwise.
///
/// # Errors
///
/// Fails with fewer than 2 fields, or on a repeated field.
pub fn left_to_right(fields: &[&str]) -> Result<Rule> {
    pairwise(fields, left_to_right_pair)
}

/// Says that a field is in a particular region of the document.
#[must_use]
pub fn is_in_doc_region(x_range: Option<(f64, f64)>, y_range: Option<(f64, f64)>) -> AnyPredicate {
    IsInRegion {
        x_range,
        y_range,
        limit_to_page: false,
    }
    .into()
}

/// Says that a field is in a particular region of whatever page it is on.
#[must_use]
pub fn is_in_page_region(x_range: Option<(f64, f64)>, y_range: Option<(f64, f64)>) -> AnyPredicate {
    IsInRegion {
        x_range,
        y_range,
        limit_to_page: true,
    }
    .into()
}

/// See [`PageNumberIs`].
#[must_use]
pub fn page_number_is(score_dict: &[(i64, f64)]) -> AnyPredicate {
    PageNumberIs {
        score_dict: score_dict.iter().copied().collect(),
    }
    .into()
}

/// See [`AreOnSamePage`].
#[must_use]
pub fn are_on_same_page(tolerance: u32, taper: u32) -> AnyPredicate {
    AreOnSamePage { tolerance, taper }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn continuous_taper() {
        assert!((taper_error(0.0, 1.0, 1.0) - 1.0).abs() < 1e-9);
        assert!((taper_error(1.0, 1.0, 1.0) - 1.0).abs() < 1e-9);
        assert!((taper_error(1.5, 1.0, 1.0) - 0.5).abs() < 1e-9);
        assert!((taper_error(2.0, 1.0, 1.0)).abs() < 1e-9);
        assert!((taper_error(5.0, 1.0, 1.0)).abs() < 1e-9);
        assert!((taper_error(0.5, 0.0, 0.0)).abs() < 1e-9);
    }

    #[test]
    fn builder_validation() {
        assert!(are_aligned(AlignmentLine::Bottoms, -1.0, None).is_err());
        assert!(are_aligned(AlignmentLine::Bottoms, 1.0, Some(-0.5)).is_err());
        assert!(are_arranged(Direction::TopDown, -1.0, 0.0, None).is_err());
        assert!(are_aligned(AlignmentLine::Bottoms, 0.0, None).is_ok());
    }

    #[test]
    fn pairwise_builds_conjunctions() -> crate::Result<()> {
        let rule = left_to_right(&["a", "b", "c"])?;
        assert_eq!(rule.atoms().len(), 3);

        assert!(left_to_right(&["a"]).is_err());

        // Two fields give a bare atom
        let rule = left_to_right(&["a", "b"])?;
        assert!(matches!(rule, Rule::Atom(_)));

        Ok(())
    }
}
