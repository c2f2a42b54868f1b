// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{mock_doc, ExpectedExtraction};
use extraction_tree::rules::textual::text_equals;
use extraction_tree::{extract, pick_best, run_model, Config};
use test_log::test;

#[test]
fn pick_best_prefers_higher_total_score() -> extraction_tree::Result<()> {
    let doc = mock_doc(&["
      Apple    Orange   Banana
      "]);

    // One single-field extractor against a two-field extractor: the
    // two-field extraction has the higher mass-normalised total.
    let pattern_1 = extract(vec![text_equals("Apple").applied_to(&["F1"])?], None)?;
    let pattern_2 = extract(
        vec![
            text_equals("Bana").applied_to(&["F3"])?,
            text_equals("Orange").applied_to(&["F2"])?,
        ],
        None,
    )?;
    let root = pick_best(vec![pattern_1, pattern_2])?;

    let expected =
        ExpectedExtraction::new(&doc, &[("F2", "Orange"), ("F3", "Banana")]);
    assert!(expected.is_exactly_best_extraction_from(&root)?);

    Ok(())
}

#[test]
fn empty_document_yields_only_the_empty_extraction() -> extraction_tree::Result<()> {
    let doc = mock_doc(&[""]);

    let root = extract(vec![text_equals("Anything").applied_to(&["f"])?], None)?;
    let results = run_model(
        &doc,
        &root,
        &Config {
            num_samples: -1,
            timeout: -1.0,
        },
    )?;

    let root = results.root.expect("the run produced results");
    assert_eq!(root.top_extractions.len(), 1);
    assert!(root.top_extractions[0].is_empty());
    assert!(root.top_extractions[0].score.abs() < 1e-9);

    Ok(())
}

#[test]
fn single_candidate_yields_one_nonempty_extraction() -> extraction_tree::Result<()> {
    let doc = mock_doc(&["
      Apple
      "]);

    let root = extract(vec![text_equals("Apple").applied_to(&["f"])?], None)?;
    let results = run_model(
        &doc,
        &root,
        &Config {
            num_samples: -1,
            timeout: -1.0,
        },
    )?;

    let root = results.root.expect("the run produced results");
    let nonempty: Vec<_> = root
        .top_extractions
        .iter()
        .filter(|e| !e.is_empty())
        .collect();
    assert_eq!(nonempty.len(), 1);
    assert!(root.top_extractions.iter().any(|e| e.is_empty()));
    assert_eq!(
        doc.entity_text(nonempty[0].get("f").expect("f is assigned")),
        Some("Apple")
    );

    Ok(())
}

#[test]
fn expired_deadline_preserves_partial_results() -> extraction_tree::Result<()> {
    let doc = mock_doc(&["
      Apple    Orange   Banana
      "]);

    let root = extract(vec![text_equals("Apple").applied_to(&["f"])?], None)?;
    let results = run_model(
        &doc,
        &root,
        &Config {
            num_samples: -1,
            timeout: 0.0,
        },
    )?;

    // An already-expired deadline is not an error; whatever was produced
    // before the poll fired stays queryable.
    assert!(results.runtime.timed_out);
    Ok(())
}

#[test]
fn many_independent_fields_bind_quickly() -> extraction_tree::Result<()> {
    // 30 interchangeable "Foo" fields plus one "Bar" field. There are 30!
    // orderings of the foo assignments; the graph-ordered combine tree and
    // rule pushdown must keep the search nowhere near that.
    const N: usize = 30;

    let mut page = String::from("\n      Foo Bar\n");
    for _ in 0..N {
        page.push_str("      Foo\n");
    }
    let doc = mock_doc(&[&page]);

    let foo_fields: Vec<String> = (0..N).map(|i| format!("foo_{i}")).collect();

    let mut rules = Vec::new();
    for field in &foo_fields {
        rules.push(text_equals("Foo").applied_to(&[field.as_str()])?);
    }
    rules.push(text_equals("Bar").applied_to(&["bar"])?);

    let started = std::time::Instant::now();
    let results = run_model(
        &doc,
        &extract(rules, None)?,
        &Config {
            num_samples: 1,
            timeout: 3.0,
        },
    )?;

    assert!(!results.runtime.timed_out);
    assert!(started.elapsed().as_secs_f64() < 3.0);

    let root = results.root.expect("the run produced results");
    let best = &root.top_extractions[0];
    assert_eq!(best.extraction.len(), N + 1);

    Ok(())
}
