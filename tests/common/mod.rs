// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Mock documents described as ASCII drawings, plus expectation helpers.

#![allow(dead_code)]

use extraction_tree::{
    BBox, Config, Document, DocumentBuilder, Interval, Node, ScoredExtraction, WordId,
};

/// Words on the same line closer than this (in character cells) cluster
/// into one phrase.
const PHRASE_GAP: f64 = 1.5;

struct MockWord {
    text: String,
    bbox: BBox,
}

fn parse_line(line: &str, y0: f64) -> Vec<MockWord> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    let chars: Vec<char> = line.chars().collect();

    for i in 0..=chars.len() {
        let is_space = i == chars.len() || chars[i] == ' ';
        match (start, is_space) {
            (None, false) => start = Some(i),
            (Some(s), true) => {
                words.push(MockWord {
                    text: chars[s..i].iter().collect(),
                    #[allow(clippy::cast_precision_loss)]
                    bbox: BBox::new(
                        Interval::new(s as f64, i as f64),
                        Interval::new(y0, y0 + 1.0),
                    ),
                });
                start = None;
            }
            _ => {}
        }
    }

    words
}

/// Builds a document from ASCII pages: columns are x-coordinates, line
/// numbers are y-coordinates, and pages stack vertically (left-aligned).
///
/// Every maximal run of words separated by single spaces becomes a phrase;
/// all contiguous subspans exist as `Text` entities, with maximality 1 for
/// the full phrase and 0 for proper subspans.
pub fn mock_doc(pages: &[&str]) -> Document {
    let mut builder = DocumentBuilder::new(&pages.join("---page break---"));

    let mut y_offset = 0.0;
    for (page_index, page) in pages.iter().enumerate() {
        let lines: Vec<&str> = page.split('\n').collect();
        #[allow(clippy::cast_precision_loss)]
        let page_width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
        #[allow(clippy::cast_precision_loss)]
        let page_height = lines.len() as f64;

        builder.page(
            BBox::new(
                Interval::new(0.0, page_width),
                Interval::new(y_offset, y_offset + page_height),
            ),
            u32::try_from(page_index + 1).expect("sane page count"),
        );

        for (line_no, line) in lines.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let words = parse_line(line, y_offset + line_no as f64);

            let ids: Vec<(WordId, BBox)> = words
                .iter()
                .filter_map(|w| builder.word(w.bbox, &w.text).map(|id| (id, w.bbox)))
                .collect();

            // Cluster into phrases by horizontal gap
            let mut clusters: Vec<Vec<(WordId, BBox)>> = Vec::new();
            for (id, bbox) in ids {
                match clusters.last_mut() {
                    Some(cluster)
                        if bbox.ix.a - cluster.last().expect("non-empty cluster").1.ix.b
                            <= PHRASE_GAP =>
                    {
                        cluster.push((id, bbox));
                    }
                    _ => clusters.push(vec![(id, bbox)]),
                }
            }

            for cluster in clusters {
                let n = cluster.len();
                for i in 0..n {
                    for j in i..n {
                        let span: Vec<WordId> =
                            cluster[i..=j].iter().map(|(id, _)| *id).collect();
                        let maximality = if j - i + 1 == n { 1.0 } else { 0.0 };
                        builder
                            .text(&span, Some(maximality), None)
                            .expect("non-empty span");
                    }
                }
            }
        }

        y_offset += page_height;
    }

    builder.finish()
}

/// A description of an extraction we expect to come out when a model runs
/// against some document: a map from field to expected entity text.
pub struct ExpectedExtraction<'a> {
    pub doc: &'a Document,
    pub fields: Vec<(&'a str, &'a str)>,
}

impl<'a> ExpectedExtraction<'a> {
    pub fn new(doc: &'a Document, fields: &[(&'a str, &'a str)]) -> Self {
        Self {
            doc,
            fields: fields.to_vec(),
        }
    }

    /// Is the expected extraction equal to the top-scoring extraction from
    /// this tree?
    pub fn is_exactly_best_extraction_from(&self, node: &Node) -> extraction_tree::Result<bool> {
        self.matches_best_extraction_from(node, true)
    }

    /// Is the expected extraction contained in the top-scoring extraction
    /// from this tree (extra fields, such as anchors, are allowed)?
    pub fn is_contained_in_best_extraction_from(
        &self,
        node: &Node,
    ) -> extraction_tree::Result<bool> {
        self.matches_best_extraction_from(node, false)
    }

    fn matches_best_extraction_from(
        &self,
        node: &Node,
        exact: bool,
    ) -> extraction_tree::Result<bool> {
        let results = run_model_defaults(self.doc, node)?;
        let Some(root) = results.root else {
            return Ok(false);
        };
        let best = root
            .top_extractions
            .first()
            .expect("results nodes report at least one extraction");
        Ok(self.matches(best, exact))
    }

    pub fn matches(&self, best: &ScoredExtraction, exact: bool) -> bool {
        if exact && best.extraction.len() != self.fields.len() {
            return false;
        }
        self.fields.iter().all(|(field, text)| {
            best.get(field).map(|id| self.doc.entity_text(id)) == Some(Some(*text))
        })
    }
}

pub fn run_model_defaults(
    doc: &Document,
    node: &Node,
) -> extraction_tree::Result<extraction_tree::Results> {
    extraction_tree::run_model(doc, node, &Config::default())
}

/// Does this extraction tree fail to match the document at all?
pub fn no_nontrivial_extractions(doc: &Document, node: &Node) -> extraction_tree::Result<bool> {
    let results = extraction_tree::run_model(
        doc,
        node,
        &Config {
            num_samples: -1,
            timeout: -1.0,
        },
    )?;
    let Some(root) = results.root else {
        return Ok(false);
    };
    let best = root
        .top_extractions
        .first()
        .expect("results nodes report at least one extraction");
    Ok(best.is_empty())
}
