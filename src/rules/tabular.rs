// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Rules for describing tabular layouts.

use crate::predicate::{AnyPredicate, Degree};
use crate::rule::{conjunction, disjunction, Rule};
use crate::rules::impingement::{
    no_words_between_horizontally, no_words_between_vertically, BoxUnimpinged, GapRegion,
};
use crate::rules::logical::AllHold;
use crate::rules::spatial::{
    bottom_aligned, left_aligned, left_to_right, one_to_two_lines_above, right_aligned, top_down,
    top_down_pair, AlignmentLine, AreAligned, Orientation,
};
use crate::{Error, Result};

fn header_unimpinged(region: GapRegion) -> AnyPredicate {
    BoxUnimpinged {
        region,
        direction: Orientation::Horizontal,
        illegal_characters: None,
        maximum_impingement: 1.0,
    }
    .into()
}

/// Says that the first field is a top header for the second: the fields are
/// arranged top-down and the header's row band is horizontally unimpinged.
#[must_use]
pub fn is_tabular_header() -> AnyPredicate {
    AllHold {
        predicates: vec![top_down_pair(), header_unimpinged(GapRegion::TabularHeader)],
        degree: Degree::Fixed(2),
    }
    .into()
}

/// Says that the first field is a top header for the second, with no rows
/// between them.
#[must_use]
pub fn is_immediate_header() -> AnyPredicate {
    AllHold {
        predicates: vec![
            one_to_two_lines_above(),
            header_unimpinged(GapRegion::ImmediateHeader),
        ],
        degree: Degree::Fixed(2),
    }
    .into()
}

/// Says that the second field is a tabular value underneath the first: the
/// fields are arranged top-down and the value's row band is horizontally
/// unimpinged.
#[must_use]
pub fn heads_tabular_entry() -> AnyPredicate {
    AllHold {
        predicates: vec![top_down_pair(), header_unimpinged(GapRegion::TabularEntry)],
        degree: Degree::Fixed(2),
    }
    .into()
}

/// Says that some fields are arranged in a (bottom-aligned) row.
///
/// With `ordered`, the left-to-right order in the row is the order in which
/// the fields are given.
///
/// # Errors
///
/// Fails with fewer than 2 fields.
pub fn row(fields: &[&str], ordered: bool) -> Result<Rule> {
    if fields.len() < 2 {
        return Err(Error::InvalidParameter(
            "row must take at least 2 fields".into(),
        ));
    }
    let alignment = bottom_aligned(fields)?;
    if ordered {
        Ok(conjunction(vec![alignment, left_to_right(fields)?]))
    } else {
        Ok(alignment)
    }
}

/// Says that some fields are arranged in a left-aligned column.
///
/// # Errors
///
/// Fails with fewer than 2 fields.
pub fn left_aligned_column(fields: &[&str], ordered: bool) -> Result<Rule> {
    if fields.len() < 2 {
        return Err(Error::InvalidParameter(
            "left_aligned_column must take at least 2 fields".into(),
        ));
    }
    let alignment = left_aligned(fields)?;
    if ordered {
        Ok(conjunction(vec![alignment, top_down(fields)?]))
    } else {
        Ok(alignment)
    }
}

/// Says that some fields are arranged in a right-aligned column.
///
/// # Errors
///
/// Fails with fewer than 2 fields.
pub fn right_aligned_column(fields: &[&str], ordered: bool) -> Result<Rule> {
    if fields.len() < 2 {
        return Err(Error::InvalidParameter(
            "right_aligned_column must take at least 2 fields".into(),
        ));
    }
    let alignment = right_aligned(fields)?;
    if ordered {
        Ok(conjunction(vec![alignment, top_down(fields)?]))
    } else {
        Ok(alignment)
    }
}

/// Says that some fields are arranged in a column, left- or right-aligned.
///
/// # Errors
///
/// Fails with fewer than 2 fields.
pub fn column(fields: &[&str], ordered: bool) -> Result<Rule> {
    if fields.len() < 2 {
        return Err(Error::InvalidParameter(
            "column must take at least 2 fields".into(),
        ));
    }
    let alignment = disjunction(vec![left_aligned(fields)?, right_aligned(fields)?]);
    if ordered {
        Ok(conjunction(vec![alignment, top_down(fields)?]))
    } else {
        Ok(alignment)
    }
}

/// Says that some fields are arranged in a table.
///
/// `rows` lists the (optional) fields in left-to-right order; the rows are
/// given in top-down order. `None` entries mark empty cells.
///
/// # Errors
///
/// Fails if the rows have differing lengths, or a row or column ends up
/// with fewer than 2 fields.
pub fn table(rows: &[&[Option<&str>]]) -> Result<Rule> {
    let Some(first) = rows.first() else {
        return Err(Error::InvalidParameter("table must have rows".into()));
    };
    if rows.iter().any(|r| r.len() != first.len()) {
        return Err(Error::InvalidParameter(
            "table rows must all have the same length".into(),
        ));
    }

    let mut rules = Vec::new();

    for row_fields in rows {
        let present: Vec<&str> = row_fields.iter().flatten().copied().collect();
        rules.push(row(&present, true)?);
    }

    for i in 0..first.len() {
        let present: Vec<&str> = rows.iter().filter_map(|r| r[i]).collect();
        rules.push(column(&present, true)?);
    }

    Ok(conjunction(rules))
}

/// Says that some fields are arranged in a tabular row.
///
/// The first field is the label: there are no words between it and any
/// entry, and the fields are pairwise bottom-aligned.
///
/// # Errors
///
/// Fails with fewer than 2 fields.
pub fn tabular_row(fields: &[&str]) -> Result<Rule> {
    if fields.len() < 2 {
        return Err(Error::InvalidParameter(
            "tabular_row must take at least 2 fields".into(),
        ));
    }

    let mut rules = Vec::new();
    let label = fields[0];
    for field in &fields[1..] {
        rules.push(no_words_between_horizontally().applied_to(&[label, *field])?);
    }
    rules.push(row(fields, true)?);

    Ok(conjunction(rules))
}

/// Says that some fields are arranged in a tabular column.
///
/// The first field is the header: there are no words between it and any
/// entry. The header may be off-aligned with the rest of the fields, which
/// form a column of their own.
///
/// # Errors
///
/// Fails with fewer than 2 fields.
pub fn tabular_column(fields: &[&str]) -> Result<Rule> {
    if fields.len() < 2 {
        return Err(Error::InvalidParameter(
            "tabular_column must take at least 2 fields".into(),
        ));
    }

    let heads_entry: AnyPredicate = AllHold {
        predicates: vec![
            is_tabular_header(),
            heads_tabular_entry(),
            no_words_between_vertically(),
            AreAligned {
                anchors: AlignmentLine::VerticalMidlines,
                tolerance: 0.5,
                taper: 10.0,
            }
            .into(),
        ],
        degree: Degree::Fixed(2),
    }
    .into();

    let mut rules = Vec::new();
    let header = fields[0];
    for field in &fields[1..] {
        rules.push(heads_entry.applied_to(&[header, *field])?);
    }
    if fields.len() > 2 {
        rules.push(column(&fields[1..], true)?);
    }

    Ok(conjunction(rules))
}
