// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{mock_doc, no_nontrivial_extractions, ExpectedExtraction};
use extraction_tree::rules::spatial::{
    bottom_aligned, left_aligned, left_to_right, right_aligned, top_down,
};
use extraction_tree::rules::textual::text_equals;
use extraction_tree::{combine, extract};
use test_log::test;

#[test]
fn row_of_three_words() -> extraction_tree::Result<()> {
    let doc = mock_doc(&["
      Apple     Orange  Banana
      "]);

    let expected = ExpectedExtraction::new(
        &doc,
        &[("apple", "Apple"), ("orange", "Orange"), ("banana", "Banana")],
    );

    assert!(expected.is_exactly_best_extraction_from(&extract(
        vec![left_to_right(&["apple", "orange", "banana"])?],
        None,
    )?)?);

    // An unmatchable side pattern leaves the row extraction untouched
    assert!(expected.is_exactly_best_extraction_from(&combine(vec![
        extract(vec![text_equals("Peach").applied_to(&["peach"])?], None)?,
        extract(vec![left_to_right(&["apple", "orange", "banana"])?], None)?,
    ])?)?);

    // Demanding a column of a one-line document yields nothing
    assert!(no_nontrivial_extractions(
        &doc,
        &extract(vec![top_down(&["apple", "orange", "banana"])?], None)?,
    )?);

    Ok(())
}

#[test]
fn table_of_six_cells() -> extraction_tree::Result<()> {
    let doc = mock_doc(&["
      Apple   Orange   Banana

      Peach   Cherry   Mango
      "]);

    let expected = ExpectedExtraction::new(
        &doc,
        &[
            ("apple", "Apple"),
            ("orange", "Orange"),
            ("banana", "Banana"),
            ("peach", "Peach"),
            ("cherry", "Cherry"),
            ("mango", "Mango"),
        ],
    );

    assert!(expected.is_exactly_best_extraction_from(&extract(
        vec![
            left_to_right(&["apple", "orange", "banana"])?,
            left_to_right(&["peach", "cherry", "mango"])?,
            bottom_aligned(&["apple", "orange", "banana"])?,
            bottom_aligned(&["peach", "cherry", "mango"])?,
            top_down(&["apple", "peach"])?,
            top_down(&["orange", "cherry"])?,
            top_down(&["banana", "mango"])?,
            left_aligned(&["apple", "peach"])?,
            left_aligned(&["orange", "cherry"])?,
            left_aligned(&["banana", "mango"])?,
        ],
        None,
    )?)?);

    Ok(())
}

#[test]
fn alignment_variants() -> extraction_tree::Result<()> {
    let doc = mock_doc(&["
      Apple

      Mango
      "]);

    let expected =
        ExpectedExtraction::new(&doc, &[("apple", "Apple"), ("mango", "Mango")]);

    assert!(expected.is_exactly_best_extraction_from(&extract(
        vec![
            top_down(&["apple", "mango"])?,
            left_aligned(&["apple", "mango"])?,
        ],
        None,
    )?)?);

    assert!(expected.is_exactly_best_extraction_from(&extract(
        vec![
            top_down(&["apple", "mango"])?,
            right_aligned(&["apple", "mango"])?,
        ],
        None,
    )?)?);

    assert!(expected.is_exactly_best_extraction_from(&extract(
        vec![
            top_down(&["apple", "mango"])?,
            left_aligned(&["apple", "mango"])?,
            right_aligned(&["apple", "mango"])?,
        ],
        None,
    )?)?);

    Ok(())
}
