// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Predicates describing impingement.
//!
//! Impingement is when something obstructs a region or a clear line of
//! sight between two points. For a suspected label/value pair we may ask
//! that the space between the two be unimpinged: if other entities occupy
//! that space, the pairing is probably wrong.

use super::{expect_one, expect_two};
use crate::document::Document;
use crate::entity::EntityId;
use crate::geometry::{BBox, Interval};
use crate::impingement::ImpingementProfile;
use crate::predicate::{AnyPredicate, Degree, Leniency, Predicate};
use crate::rules::spatial::Orientation;
use crate::Result;
use rustc_hash::FxHashSet;
use std::hash::{Hash, Hasher};

pub(crate) const IMPINGEMENT_SMALL_INSET: f64 = 0.25;
pub(crate) const IMPINGEMENT_LARGE_INSET: f64 = 1.0;

pub(crate) const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn erode_if_possible(interval: Interval, amount: f64) -> Interval {
    interval.eroded(amount).unwrap_or(interval)
}

fn page_for_edge(entity: EntityId, document: &Document) -> Option<BBox> {
    let bbox = document.entity(entity).bbox();
    let pages = document.pages_intersecting(&bbox);
    if pages.len() > 1 {
        log::warn!("entity spans multiple pages, using first page for page edge impingement");
    }
    match pages.first() {
        Some(page) => Some(document.entity(*page).bbox()),
        None => {
            log::debug!("entity at {bbox:?} is on no page");
            None
        }
    }
}

/// The document region an impingement rule watches, defined in terms of the
/// rule's entities
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GapRegion {
    /// The vertical space between two entities
    BetweenVertically {
        /// Span the union of the entities' horizontal extents instead of
        /// their intersection
        spanning: bool,
    },

    /// The horizontal space between two entities
    BetweenHorizontally {
        /// Span the union of the entities' vertical extents instead of
        /// their intersection
        spanning: bool,
    },

    /// The space between an entity and the left edge of its page
    LeftEdge,

    /// The space between an entity and the right edge of its page
    RightEdge,

    /// The space between an entity and the top edge of its page
    TopEdge,

    /// The space between an entity and the bottom edge of its page
    BottomEdge,

    /// The row band of a header above a tabular value
    TabularHeader,

    /// The whole band between a header and the value directly below it
    ImmediateHeader,

    /// The row band of a tabular value below its header
    TabularEntry,
}

impl GapRegion {
    /// The number of entities this region is defined over.
    #[must_use]
    pub fn degree(self) -> usize {
        match self {
            Self::LeftEdge | Self::RightEdge | Self::TopEdge | Self::BottomEdge => 1,
            _ => 2,
        }
    }

    fn between_vertically(
        e1: BBox,
        e2: BBox,
        document: &Document,
        spanning: bool,
    ) -> Option<BBox> {
        let inset = IMPINGEMENT_SMALL_INSET * document.median_line_height();
        let ix = if spanning {
            Interval::spanning([e1.ix, e2.ix])?
        } else {
            Interval::intersection([e1.ix, e2.ix])?
        };
        Some(BBox::new(
            erode_if_possible(ix, inset),
            erode_if_possible(Interval::new(e1.iy.b, e2.iy.a), inset),
        ))
    }

    fn between_horizontally(
        e1: BBox,
        e2: BBox,
        document: &Document,
        spanning: bool,
    ) -> Option<BBox> {
        let inset = IMPINGEMENT_SMALL_INSET * document.median_line_height();
        let iy = if spanning {
            Interval::spanning([e1.iy, e2.iy])?
        } else {
            Interval::intersection([e1.iy, e2.iy])?
        };
        Some(BBox::new(
            erode_if_possible(Interval::new(e1.ix.b, e2.ix.a), inset),
            erode_if_possible(iy, inset),
        ))
    }

    fn header_breadth(e1: BBox, e2: BBox, document: &Document) -> Option<Interval> {
        Interval::spanning([e1.ix, e2.ix])?
            .eroded(IMPINGEMENT_LARGE_INSET * document.median_line_height())
    }

    pub(crate) fn compute(
        self,
        entities: &[EntityId],
        document: &Document,
    ) -> Result<Option<BBox>> {
        let inset = IMPINGEMENT_SMALL_INSET * document.median_line_height();

        match self {
            Self::BetweenVertically { spanning } => {
                let (e1, e2) = expect_two(entities)?;
                let (b1, b2) = (document.entity(e1).bbox(), document.entity(e2).bbox());
                Ok(Self::between_vertically(b1, b2, document, spanning))
            }

            Self::BetweenHorizontally { spanning } => {
                let (e1, e2) = expect_two(entities)?;
                let (b1, b2) = (document.entity(e1).bbox(), document.entity(e2).bbox());
                Ok(Self::between_horizontally(b1, b2, document, spanning))
            }

            Self::LeftEdge => {
                let e = expect_one(entities)?;
                let bbox = document.entity(e).bbox();
                let Some(page) = page_for_edge(e, document) else {
                    return Ok(None);
                };
                Ok(Some(BBox::new(
                    Interval::new(page.ix.a, bbox.ix.a),
                    erode_if_possible(bbox.iy, inset),
                )))
            }

            Self::RightEdge => {
                let e = expect_one(entities)?;
                let bbox = document.entity(e).bbox();
                let Some(page) = page_for_edge(e, document) else {
                    return Ok(None);
                };
                Ok(Some(BBox::new(
                    Interval::new(bbox.ix.b, page.ix.b),
                    erode_if_possible(bbox.iy, inset),
                )))
            }

            Self::TopEdge => {
                let e = expect_one(entities)?;
                let bbox = document.entity(e).bbox();
                let Some(page) = page_for_edge(e, document) else {
                    return Ok(None);
                };
                Ok(Some(BBox::new(
                    bbox.ix,
                    Interval::new(page.iy.a, bbox.iy.a),
                )))
            }

            Self::BottomEdge => {
                let e = expect_one(entities)?;
                let bbox = document.entity(e).bbox();
                let Some(page) = page_for_edge(e, document) else {
                    return Ok(None);
                };
                Ok(Some(BBox::new(
                    bbox.ix,
                    Interval::new(bbox.iy.b, page.iy.b),
                )))
            }

            Self::TabularHeader => {
                let (e1, e2) = expect_two(entities)?;
                let (b1, b2) = (document.entity(e1).bbox(), document.entity(e2).bbox());
                Ok(BBox::build(
                    Self::header_breadth(b1, b2, document),
                    b1.iy.eroded(inset),
                ))
            }

            Self::ImmediateHeader => {
                let (e1, e2) = expect_two(entities)?;
                let (b1, b2) = (document.entity(e1).bbox(), document.entity(e2).bbox());
                Ok(BBox::build(
                    Self::header_breadth(b1, b2, document),
                    Interval::spanning_points([b1.iy.a, b2.iy.a]).and_then(|i| {
                        i.eroded(0.33 * document.median_line_height())
                    }),
                ))
            }

            Self::TabularEntry => {
                let (e1, e2) = expect_two(entities)?;
                let (b1, b2) = (document.entity(e1).bbox(), document.entity(e2).bbox());
                Ok(BBox::build(
                    Self::header_breadth(b1, b2, document),
                    b2.iy.eroded(inset),
                ))
            }
        }
    }
}

/// Says that a particular document region is not impinged upon.
///
/// Every *other* single-word entity intersecting the watched region is
/// projected onto the gap axis and its opacity integrated over the union;
/// the score is one minus the weighted mean opacity, and 0 when the
/// impingement exceeds `maximum_impingement`.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxUnimpinged {
    /// The watched region
    pub region: GapRegion,

    /// The direction in which impingement is measured
    pub direction: Orientation,

    /// Normally all impinging text counts; if set, only these characters
    /// are "illegal" and opacity is their proportion of the word
    pub illegal_characters: Option<String>,

    /// Score 0 once the total impingement exceeds this
    pub maximum_impingement: f64,
}

impl Hash for BoxUnimpinged {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.region.hash(state);
        self.direction.hash(state);
        self.illegal_characters.hash(state);
        crate::predicate::hash_f64(self.maximum_impingement, state);
    }
}

impl BoxUnimpinged {
    fn opacity(&self, text: Option<&str>) -> f64 {
        let Some(text) = text else {
            return 0.0;
        };
        if text.is_empty() {
            return 0.0;
        }
        let Some(illegal) = &self.illegal_characters else {
            return 1.0;
        };
        let total = text.chars().count();
        let bad = text.chars().filter(|c| illegal.contains(*c)).count();
        #[allow(clippy::cast_precision_loss)]
        {
            bad as f64 / total as f64
        }
    }

    fn projection(&self, bbox: &BBox) -> Interval {
        match self.direction {
            Orientation::Vertical => bbox.ix,
            Orientation::Horizontal => bbox.iy,
        }
    }
}

impl Predicate for BoxUnimpinged {
    fn name(&self) -> &'static str {
        "box_unimpinged"
    }

    fn degree(&self) -> Degree {
        Degree::Fixed(self.region.degree())
    }

    fn score(&self, entities: &[EntityId], document: &Document) -> Result<f64> {
        let Some(region) = self.region.compute(entities, document)? else {
            // An empty or invalid box is considered to be unimpinged
            return Ok(1.0);
        };
        if !region.non_empty() {
            return Ok(1.0);
        }

        let mut profile = ImpingementProfile::new(self.projection(&region))?;

        let defining_words: FxHashSet<_> = entities
            .iter()
            .flat_map(|e| document.entity_words(*e))
            .collect();

        for id in document.single_word_index().items_intersecting(&region) {
            let words = document.entity_words(id);
            debug_assert_eq!(words.len(), 1);
            if words.iter().any(|w| defining_words.contains(w)) {
                continue;
            }
            let bbox = document.entity(id).bbox();
            profile.incorporate_subdivision(
                self.projection(&bbox),
                self.opacity(document.entity_text(id)),
            )?;
        }

        let total = profile.total_impingement();
        if total > self.maximum_impingement {
            return Ok(0.0);
        }
        Ok(1.0 - total)
    }

    fn leniency(&self) -> Leniency {
        Leniency::Low
    }
}

/// Says that nothing sits in the vertical space between two fields.
#[must_use]
pub fn nothing_between_vertically_custom(
    spanning: bool,
    illegal_characters: Option<&str>,
    maximum_impingement: f64,
) -> AnyPredicate {
    BoxUnimpinged {
        region: GapRegion::BetweenVertically { spanning },
        direction: Orientation::Vertical,
        illegal_characters: illegal_characters.map(Into::into),
        maximum_impingement,
    }
    .into()
}

/// Says that nothing sits in the horizontal space between two fields.
#[must_use]
pub fn nothing_between_horizontally_custom(
    spanning: bool,
    illegal_characters: Option<&str>,
    maximum_impingement: f64,
) -> AnyPredicate {
    BoxUnimpinged {
        region: GapRegion::BetweenHorizontally { spanning },
        direction: Orientation::Horizontal,
        illegal_characters: illegal_characters.map(Into::into),
        maximum_impingement,
    }
    .into()
}

/// [`nothing_between_vertically_custom`] with the default parameters.
#[must_use]
pub fn nothing_between_vertically() -> AnyPredicate {
    nothing_between_vertically_custom(false, None, 1.0)
}

/// [`nothing_between_horizontally_custom`] with the default parameters.
#[must_use]
pub fn nothing_between_horizontally() -> AnyPredicate {
    nothing_between_horizontally_custom(false, None, 1.0)
}

/// Says that there are no *words* in the vertical space between two fields.
///
/// Numeric clutter is tolerated; only letters count as impinging. Useful in
/// a table, where a column of values may sit between a header and the value
/// being anchored.
#[must_use]
pub fn no_words_between_vertically() -> AnyPredicate {
    nothing_between_vertically_custom(false, Some(LETTERS), 0.5)
}

/// Says that there are no *words* in the horizontal space between two
/// fields.
#[must_use]
pub fn no_words_between_horizontally() -> AnyPredicate {
    nothing_between_horizontally_custom(false, Some(LETTERS), 0.5)
}

fn edge_rule(region: GapRegion, direction: Orientation) -> AnyPredicate {
    BoxUnimpinged {
        region,
        direction,
        illegal_characters: None,
        maximum_impingement: 0.5,
    }
    .into()
}

/// Says that nothing sits between a field and the left edge of its page.
#[must_use]
pub fn nothing_between_left_edge() -> AnyPredicate {
    edge_rule(GapRegion::LeftEdge, Orientation::Horizontal)
}

/// Says that nothing sits between a field and the right edge of its page.
#[must_use]
pub fn nothing_between_right_edge() -> AnyPredicate {
    edge_rule(GapRegion::RightEdge, Orientation::Horizontal)
}

/// Says that nothing sits between a field and the top edge of its page.
#[must_use]
pub fn nothing_between_top_edge() -> AnyPredicate {
    edge_rule(GapRegion::TopEdge, Orientation::Vertical)
}

/// Says that nothing sits between a field and the bottom edge of its page.
#[must_use]
pub fn nothing_between_bottom_edge() -> AnyPredicate {
    edge_rule(GapRegion::BottomEdge, Orientation::Vertical)
}
