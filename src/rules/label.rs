// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Predicates defining label-value relationships.

use crate::predicate::{AnyPredicate, Degree};
use crate::rules::impingement::{nothing_between_horizontally, nothing_between_vertically};
use crate::rules::logical::{AllHold, AnyHolds};
use crate::rules::spatial::{
    bottom_aligned_pair, left_to_right_pair, AlignmentLine, AreAligned, AreArranged, Direction,
};

const TOP_DOWN_ALIGNMENT_TOLERANCE: f64 = 1.0;
const TOP_DOWN_ALIGNMENT_TAPER: f64 = 3.5;

/// Says that two fields are a label-value pair going left-to-right: the
/// fields are arranged left-to-right, bottom-aligned, and there is nothing
/// between them.
#[must_use]
pub fn is_left_to_right_label_value_pair() -> AnyPredicate {
    AllHold {
        predicates: vec![
            left_to_right_pair(),
            bottom_aligned_pair(),
            nothing_between_horizontally(),
        ],
        degree: Degree::Fixed(2),
    }
    .into()
}

/// Says that two fields are a top-down label-value pair: the fields are
/// arranged top-down within two lines, left-, right-, or center-aligned,
/// and there is nothing between them.
#[must_use]
pub fn is_top_down_label_value_pair() -> AnyPredicate {
    let aligned = |anchors| -> AnyPredicate {
        AreAligned {
            anchors,
            tolerance: TOP_DOWN_ALIGNMENT_TOLERANCE,
            taper: TOP_DOWN_ALIGNMENT_TAPER,
        }
        .into()
    };

    AllHold {
        predicates: vec![
            AreArranged {
                direction: Direction::TopDown,
                taper: 1.0,
                min_distance: 0.0,
                max_distance: Some(2.0),
            }
            .into(),
            nothing_between_vertically(),
            AnyHolds {
                predicates: vec![
                    aligned(AlignmentLine::RightSides),
                    aligned(AlignmentLine::LeftSides),
                    aligned(AlignmentLine::VerticalMidlines),
                ],
                degree: Degree::Fixed(2),
            }
            .into(),
        ],
        degree: Degree::Fixed(2),
    }
    .into()
}
