// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{mock_doc, ExpectedExtraction};
use extraction_tree::extract;
use extraction_tree::rules::spatial::{
    bottom_aligned, left_to_right, page_number_is, top_down,
};
use extraction_tree::rules::textual::text_equals;
use test_log::test;

#[test]
fn multipage_doc() -> extraction_tree::Result<()> {
    let doc = mock_doc(&[
        "
      Page number:   1
      ",
        "
      Page number:   2
      ",
        "
      Page number:   3
      ",
    ]);

    let expected = ExpectedExtraction::new(
        &doc,
        &[
            ("page_number_label_1", "Page number:"),
            ("page_number_1", "1"),
            ("page_number_label_2", "Page number:"),
            ("page_number_2", "2"),
            ("page_number_label_3", "Page number:"),
            ("page_number_3", "3"),
        ],
    );

    assert!(expected.is_exactly_best_extraction_from(&extract(
        vec![
            text_equals("Page number:").applied_to(&["page_number_label_1"])?,
            text_equals("Page number:").applied_to(&["page_number_label_2"])?,
            text_equals("Page number:").applied_to(&["page_number_label_3"])?,
            top_down(&["page_number_label_1", "page_number_label_2"])?,
            page_number_is(&[(2, 0.0), (3, 1.0), (4, 0.0)])
                .applied_to(&["page_number_label_3"])?,
            bottom_aligned(&["page_number_label_1", "page_number_1"])?,
            left_to_right(&["page_number_label_1", "page_number_1"])?,
            bottom_aligned(&["page_number_label_2", "page_number_2"])?,
            left_to_right(&["page_number_label_2", "page_number_2"])?,
            bottom_aligned(&["page_number_label_3", "page_number_3"])?,
            left_to_right(&["page_number_label_3", "page_number_3"])?,
        ],
        None,
    )?)?);

    Ok(())
}
