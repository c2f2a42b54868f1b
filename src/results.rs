// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The results of running an extraction tree on a single document.

use crate::bound_tree::BoundNode;
use crate::extraction::Field;
use crate::run::RuntimeInfo;
use crate::scoring::ScoredExtraction;
use crate::{Error, Result};
use std::rc::Rc;
use uuid::Uuid;

/// How many extractions each results node reports
const MAX_REPORTED_EXTRACTIONS: usize = 20;

/// The per-node slice of a run's results
#[derive(Clone, Debug)]
pub struct ResultsNode {
    /// The uuid of the tree node this reports on
    pub node_uuid: Uuid,

    /// The best extractions this node yielded, best-first, capped at 20
    pub top_extractions: Vec<Rc<ScoredExtraction>>,

    /// The best score; equals the first entry's score
    pub top_score: f64,

    /// The node's legal fields
    pub fields: Vec<Field>,

    /// Results of the node's children (a pattern node reports none)
    pub children: Vec<ResultsNode>,
}

/// A whole run's results
#[derive(Clone, Debug)]
pub struct Results {
    /// The root results node; absent if the run timed out before any
    /// extraction was produced
    pub root: Option<ResultsNode>,

    /// Runtime counters for the run
    pub runtime: RuntimeInfo,
}

fn validate_results_node(node: &ResultsNode) -> Result<()> {
    let Some(first) = node.top_extractions.first() else {
        return Err(Error::InvalidParameter(format!(
            "results node {} has no extractions",
            node.node_uuid
        )));
    };
    if first.score.total_cmp(&node.top_score) != std::cmp::Ordering::Equal {
        return Err(Error::InvalidParameter(format!(
            "results node {} top score {} does not match the score in its top extraction",
            node.node_uuid, node.top_score
        )));
    }
    for child in &node.children {
        validate_results_node(child)?;
    }
    Ok(())
}

pub(crate) fn validate(results: &Results) -> Result<()> {
    if let Some(root) = &results.root {
        validate_results_node(root)?;
    }
    Ok(())
}

fn results_node(bound: &BoundNode<'_>) -> Option<ResultsNode> {
    let common = bound.common();
    if common.returned.is_empty() {
        return None;
    }

    let mut top = common.returned.clone();
    top.sort_by(|a, b| b.score.total_cmp(&a.score));
    top.truncate(MAX_REPORTED_EXTRACTIONS);

    let top_score = common.best.as_ref().map_or(0.0, |best| best.score);

    let children = if bound.reports_children() {
        bound
            .children()
            .into_iter()
            .filter_map(results_node)
            .collect()
    } else {
        Vec::new()
    };

    Some(ResultsNode {
        node_uuid: common.uuid,
        top_extractions: top,
        top_score,
        fields: common.legal_fields.iter().cloned().collect(),
        children,
    })
}

pub(crate) fn generate_results(
    root: Option<&BoundNode<'_>>,
    runtime: RuntimeInfo,
) -> Result<Results> {
    let results = Results {
        root: root.and_then(results_node),
        runtime,
    };
    validate(&results)?;
    Ok(results)
}
