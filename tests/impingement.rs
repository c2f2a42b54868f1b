// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{mock_doc, no_nontrivial_extractions, ExpectedExtraction};
use extraction_tree::extract;
use extraction_tree::rules::impingement::nothing_between_vertically_custom;
use extraction_tree::rules::spatial::top_down;
use extraction_tree::rules::textual::text_equals;
use test_log::test;

#[test]
fn impingement_between_stacked_words() -> extraction_tree::Result<()> {
    let doc = mock_doc(&["
      Pineapple

          Apple

      Pear
      "]);

    let expected = ExpectedExtraction::new(
        &doc,
        &[
            ("pineapple", "Pineapple"),
            ("pear", "Pear"),
            ("apple", "Apple"),
        ],
    );

    // The indented "Apple" sits outside the shared horizontal extent of
    // "Pineapple" and "Pear", so the non-spanning gap is clear.
    assert!(expected.is_exactly_best_extraction_from(&extract(
        vec![
            text_equals("Apple").applied_to(&["apple"])?,
            top_down(&["pineapple", "pear"])?,
            nothing_between_vertically_custom(false, None, 0.5)
                .applied_to(&["pineapple", "pear"])?,
        ],
        None,
    )?)?);

    // Spanning the union of their extents, the "Apple" impinges the gap.
    assert!(no_nontrivial_extractions(
        &doc,
        &extract(
            vec![
                text_equals("Apple").applied_to(&["apple"])?,
                top_down(&["pineapple", "pear"])?,
                nothing_between_vertically_custom(true, None, 0.5)
                    .applied_to(&["pineapple", "pear"])?,
            ],
            None,
        )?,
    )?);

    Ok(())
}
