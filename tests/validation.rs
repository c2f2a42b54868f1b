// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use extraction_tree::rules::logical::nop;
use extraction_tree::rules::spatial::left_to_right_pair;
use extraction_tree::{combine, extract, merge_trees, Error};
use test_log::test;

#[test]
fn merge_rejects_shared_fields() -> extraction_tree::Result<()> {
    let tree_1 = extract(
        vec![
            nop().applied_to(&["f1"])?,
            nop().applied_to(&["f_int"])?,
        ],
        None,
    )?;
    let tree_2 = extract(
        vec![
            nop().applied_to(&["f2"])?,
            nop().applied_to(&["f_int"])?,
        ],
        None,
    )?;

    assert!(matches!(
        merge_trees(vec![tree_1, tree_2]),
        Err(Error::OverlappingFields(_))
    ));
    Ok(())
}

#[test]
fn combine_rejects_shared_fields() -> extraction_tree::Result<()> {
    let tree_1 = extract(vec![nop().applied_to(&["f"])?], None)?;
    let tree_2 = extract(vec![nop().applied_to(&["f"])?], None)?;

    assert!(matches!(
        combine(vec![tree_1, tree_2]),
        Err(Error::OverlappingFields(_))
    ));
    Ok(())
}

#[test]
fn degree_mismatch_is_rejected() {
    assert!(matches!(
        left_to_right_pair().applied_to(&["a", "b", "c"]),
        Err(Error::Degree { .. })
    ));
}
