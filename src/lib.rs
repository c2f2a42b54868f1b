// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A K.I.S.S. constraint-satisfaction engine for extracting structured
//! fields from documents whose content has already been OCR'd into
//! positioned words.
//!
//! ##### About
//!
//! You describe the target extraction as a set of named fields plus
//! declarative *rules* constraining their assignments: textual shape,
//! semantic type, spatial alignment, impingement, numeric relations. For
//! each document the engine finds the assignments of fields to candidate
//! entities that best satisfy the rules, returning the top-scoring
//! extractions.
//!
//! The search is organised as a tree of extraction nodes that lazily
//! enumerate scored candidate extractions in roughly best-first order, with
//! spatial prefiltering, k-way merging under ordered iteration, automatic
//! tree restructuring from a flat rule set, and caching of per-field
//! scores. The engine is single-document, single-threaded, and
//! deterministic given its inputs; running several documents in parallel is
//! an outer-loop concern.
//!
//! This crate only provides the engine: OCR input adapters, persistence
//! formats and CLI plumbing are expected to live next to it, feeding it a
//! finished [`Document`] and a rule tree.
//!
//! # Example usage
//!
//! ```
//! use extraction_tree::rules::spatial::left_to_right;
//! use extraction_tree::rules::textual::text_equals;
//! use extraction_tree::{extract, run_model, Config, DocumentBuilder};
//! use extraction_tree::{BBox, Interval};
//!
//! // A one-page document with three words on a line
//! let mut builder = DocumentBuilder::new("example");
//! builder.page(BBox::new(Interval::new(0.0, 30.0), Interval::new(0.0, 3.0)), 1);
//! for (i, text) in ["Apple", "Orange", "Banana"].iter().enumerate() {
//!     let x = i as f64 * 10.0;
//!     let word = builder
//!         .word(BBox::new(Interval::new(x, x + 6.0), Interval::new(1.0, 2.0)), text)
//!         .unwrap();
//!     builder.text(&[word], Some(1.0), None)?;
//! }
//! let document = builder.finish();
//!
//! // Three fields, reading left to right across the line
//! let tree = extract(
//!     vec![
//!         text_equals("Apple").applied_to(&["first"])?,
//!         left_to_right(&["first", "second", "third"])?,
//!     ],
//!     None,
//! )?;
//!
//! let results = run_model(&document, &tree, &Config::default())?;
//! let best = &results.root.unwrap().top_extractions[0];
//! assert_eq!(
//!     document.entity_text(best.get("second").unwrap()),
//!     Some("Orange"),
//! );
//! #
//! # Ok::<(), extraction_tree::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::similar_names)]

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        }
    };
}

mod bound_tree;

#[doc(hidden)]
pub mod doc_region_restriction;

mod document;
mod entity;
mod error;
mod extraction;

#[doc(hidden)]
pub mod ez_box;

mod geometry;
mod graphs;
mod impingement;
mod peeker;
mod peeking_heap;
mod predicate;

#[doc(hidden)]
pub mod prefilter;

mod results;
mod rule;

pub mod rules;

mod run;
mod scoring;
mod smerger;

#[doc(hidden)]
pub mod spatial_formula;

mod string_algos;
mod text_properties;
mod tree;

pub use {
    document::{Document, DocumentBuilder, EzDocRegion},
    entity::{Entity, EntityId, EntityKind, Word, WordId},
    error::{Error, Result},
    extraction::{Extraction, ExtractionPoint, Field},
    geometry::{BBox, Interval, Point},
    impingement::ImpingementProfile,
    predicate::{AnyPredicate, Degree, Leniency, Predicate},
    results::{Results, ResultsNode},
    rule::{conjunction, disjunction, Atom, Connective, Rule, RuleScore},
    run::{run_model, Config, RuntimeInfo},
    scoring::{
        assignment_is_valid, extraction_score, ScoredExtraction, MINIMUM_FIELD_SCORE,
    },
    string_algos::{edit_distance, pattern_edit_distance, substring_edit_distance},
    text_properties::{CharCount, CharProportion, LengthSpec},
    tree::{
        combine, combine_with, extract, merge_trees, pick_best, CombineNode, EmptyNode,
        LeafNode, MergeNode, Node, PatternNode, PickBestNode,
    },
};

#[doc(hidden)]
pub use ez_box::EzBox;
