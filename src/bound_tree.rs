// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The per-document counterparts of the extraction tree nodes.
//!
//! Binding a [`Node`] to a document produces a parallel tree of bound
//! nodes, each a lazy iterator of scored extractions in roughly best-first
//! order. A parent pulls from its children, merges their partial
//! extractions, applies its residual rules, and yields the combined result;
//! every yield is recorded for results reporting.

use crate::document::Document;
use crate::entity::{EntityId, EntityKind};
use crate::extraction::{Extraction, Field};
use crate::predicate::{AnyPredicate, Predicate};
use crate::prefilter::{DocRegionPrefilter, Prefilter, TrivialPrefilter};
use crate::rule::{Rule, RuleScore};
use crate::run::Deadline;
use crate::scoring::{extraction_score, merge, ScoredExtraction, MINIMUM_FIELD_SCORE};
use crate::smerger::{Merger, NormEstimator, Smerger};
use crate::spatial_formula::{restrictive_power, simplify, to_dnf, weaken, Formula};
use crate::tree::{
    build_tree_from_graph, distribute_rules, estimated_valid_assignments, Node, PatternNode,
};
use crate::graphs::{components, edge, WeightedMultiGraph};
use crate::peeking_heap::PeekingHeap;
use crate::{Error, Result};
use quick_cache::unsync::Cache;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use uuid::Uuid;

/// One possible assignment of some unspecified field, with the field score
/// and per-predicate scores that produced it
#[derive(Clone, Debug)]
struct CachedAssignment {
    assignment: Option<EntityId>,
    field_score: f64,
    predicate_scores: Vec<f64>,
}

#[derive(Eq, Hash, PartialEq)]
struct LeafKey {
    kind: EntityKind,
    predicates: Vec<AnyPredicate>,
}

/// Run-scoped binding state: the document, the deadline, and the
/// leaf-assignment memo
///
/// The memo is keyed by `(entity kind, predicate values)`, so two leaves
/// with identical rule sets share the enumeration work. It must not outlive
/// the run: a process-global cache would be incorrect across documents.
pub(crate) struct Binder<'d> {
    pub document: &'d Document,
    pub deadline: Deadline,
    cache: RefCell<Cache<LeafKey, Rc<Vec<CachedAssignment>>>>,
}

impl<'d> Binder<'d> {
    pub fn new(document: &'d Document, deadline: Deadline) -> Self {
        Self {
            document,
            deadline,
            cache: RefCell::new(Cache::new(256)),
        }
    }

    /// The assignments of some unspecified field, sorted best-first, with
    /// invalid ones dropped and the explicit unfilled assignment last.
    fn leaf_assignments(
        &self,
        kind: EntityKind,
        predicates: &[AnyPredicate],
    ) -> Result<Rc<Vec<CachedAssignment>>> {
        let key = LeafKey {
            kind,
            predicates: predicates.to_vec(),
        };
        if let Some(cached) = self.cache.borrow_mut().get(&key) {
            return Ok(cached.clone());
        }

        let mut assignments: Vec<CachedAssignment> = Vec::new();
        for id in self.document.entities_of_kind(kind) {
            if self.deadline.expired() {
                return Err(Error::Timeout);
            }

            let mut predicate_scores = Vec::with_capacity(predicates.len());
            let mut field_score = 1.0;
            for predicate in predicates {
                let score = predicate.score(&[id], self.document)?;
                predicate_scores.push(score);
                field_score *= score;
            }

            if field_score > MINIMUM_FIELD_SCORE {
                assignments.push(CachedAssignment {
                    assignment: Some(id),
                    field_score,
                    predicate_scores,
                });
            }
        }

        assignments.sort_by(|a, b| b.field_score.total_cmp(&a.field_score));

        // The empty assignment comes last; downstream combine nodes use
        // this invariant to detect "no candidate available" cheaply.
        assignments.push(CachedAssignment {
            assignment: None,
            field_score: 0.0,
            predicate_scores: vec![1.0; predicates.len()],
        });

        let assignments = Rc::new(assignments);
        self.cache
            .borrow_mut()
            .insert(key, assignments.clone());
        Ok(assignments)
    }
}

/// State shared by every bound node kind
pub(crate) struct BoundCommon<'d> {
    pub document: &'d Document,
    pub legal_fields: BTreeSet<Field>,
    pub rules: Vec<Rule>,
    pub name: String,
    pub uuid: Uuid,

    /// The best extraction yielded so far
    pub best: Option<Rc<ScoredExtraction>>,

    /// Every extraction yielded so far, in yield order
    pub returned: Vec<Rc<ScoredExtraction>>,
}

impl<'d> BoundCommon<'d> {
    fn new(
        document: &'d Document,
        legal_fields: BTreeSet<Field>,
        rules: Vec<Rule>,
        name: String,
        uuid: Uuid,
    ) -> Self {
        Self {
            document,
            legal_fields,
            rules,
            name,
            uuid,
            best: None,
            returned: Vec::new(),
        }
    }

    fn yielding(&mut self, extraction: Rc<ScoredExtraction>) -> Rc<ScoredExtraction> {
        if self.best.as_ref().is_none_or(|b| extraction.ranks_before(b)) {
            self.best = Some(extraction.clone());
        }
        self.returned.push(extraction.clone());
        extraction
    }
}

/// Adapts a bound node into an iterator for the peeker machinery, while
/// keeping the node reachable for results reporting
pub(crate) struct NodeStream<'d>(Box<BoundNode<'d>>);

impl<'d> NodeStream<'d> {
    fn new(node: BoundNode<'d>) -> Self {
        Self(Box::new(node))
    }

    pub fn node(&self) -> &BoundNode<'d> {
        &self.0
    }
}

impl<'d> Iterator for NodeStream<'d> {
    type Item = Result<Rc<ScoredExtraction>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_extraction()
    }
}

pub(crate) struct BoundEmptyNode<'d> {
    pub common: BoundCommon<'d>,
}

pub(crate) struct BoundLeafNode<'d> {
    pub common: BoundCommon<'d>,
    extractions: Vec<Rc<ScoredExtraction>>,
    non_atom_rules: Vec<Rule>,
    cursor: usize,
}

pub(crate) struct BoundPatternNode<'d> {
    pub common: BoundCommon<'d>,
    child: Box<BoundNode<'d>>,
}

pub(crate) struct BoundMergeNode<'d> {
    pub common: BoundCommon<'d>,
    child: Box<BoundNode<'d>>,
}

pub(crate) struct BoundCombineNode<'d> {
    pub common: BoundCommon<'d>,
    smerger: Smerger<'d, NodeStream<'d>>,
    mass: u32,
    deadline: Deadline,
}

pub(crate) struct BoundPickBestNode<'d> {
    pub common: BoundCommon<'d>,
    heap: PeekingHeap<NodeStream<'d>>,
    mass: u32,
}

/// A bound extraction tree node: an iterator of scored extractions
pub(crate) enum BoundNode<'d> {
    Empty(BoundEmptyNode<'d>),
    Leaf(BoundLeafNode<'d>),
    Pattern(BoundPatternNode<'d>),
    Merge(BoundMergeNode<'d>),
    Combine(BoundCombineNode<'d>),
    PickBest(BoundPickBestNode<'d>),
}

impl<'d> BoundNode<'d> {
    pub fn common(&self) -> &BoundCommon<'d> {
        match self {
            Self::Empty(n) => &n.common,
            Self::Leaf(n) => &n.common,
            Self::Pattern(n) => &n.common,
            Self::Merge(n) => &n.common,
            Self::Combine(n) => &n.common,
            Self::PickBest(n) => &n.common,
        }
    }

    /// Whether results reporting should descend into this node's children.
    pub fn reports_children(&self) -> bool {
        !matches!(self, Self::Pattern(_))
    }

    pub fn children(&self) -> Vec<&BoundNode<'d>> {
        match self {
            Self::Empty(_) | Self::Leaf(_) => Vec::new(),
            Self::Pattern(n) => vec![&n.child],
            Self::Merge(n) => vec![&n.child],
            Self::Combine(n) => n.smerger.sources().map(NodeStream::node).collect(),
            Self::PickBest(n) => n.heap.sources().map(NodeStream::node).collect(),
        }
    }

    /// The scaling integer extraction scores at this node are normalised
    /// by.
    pub fn mass(&self) -> u32 {
        match self {
            Self::Empty(_) => 0,
            Self::Leaf(_) => 1,
            Self::Pattern(n) => {
                u32::try_from(n.common.legal_fields.len().max(1)).unwrap_or(u32::MAX)
            }
            Self::Merge(n) => n.child.mass(),
            Self::Combine(n) => n.mass,
            Self::PickBest(n) => n.mass,
        }
    }

    pub fn num_extractions_generated(&self) -> usize {
        self.common().returned.len()
    }

    /// Yields the next scored extraction, or `None` when exhausted.
    pub fn next_extraction(&mut self) -> Option<Result<Rc<ScoredExtraction>>> {
        match self {
            Self::Empty(_) => None,

            Self::Leaf(node) => loop {
                if node.cursor >= node.extractions.len() {
                    return None;
                }
                let extraction = node.extractions[node.cursor].clone();
                node.cursor += 1;

                // Degree-1 atom scores are already baked into the cached
                // extractions; only connective rules still need checking.
                let merged = fail_iter!(merge(
                    &[extraction.clone()],
                    &node.non_atom_rules,
                    1,
                    node.common.document,
                ));
                if merged.valid() {
                    return Some(Ok(node.common.yielding(extraction)));
                }
                log::error!(
                    "bound leaf node {} produced an invalid extraction",
                    node.common.name
                );
            },

            Self::Pattern(node) => {
                let item = match node.child.next_extraction()? {
                    Ok(item) => item,
                    Err(e) => return Some(Err(e)),
                };
                // Private fields stay in the recorded extraction so they
                // appear in pattern results, but only public fields are
                // passed along to parents.
                let full = node.common.yielding(item);
                Some(Ok(Rc::new(public_extraction(
                    &full,
                    &node.common.legal_fields,
                ))))
            }

            Self::Merge(node) => {
                let item = match node.child.next_extraction()? {
                    Ok(item) => item,
                    Err(e) => return Some(Err(e)),
                };
                Some(Ok(node.common.yielding(item)))
            }

            Self::Combine(node) => {
                if node.deadline.expired() {
                    return Some(Err(Error::Timeout));
                }
                let item = match node.smerger.next()? {
                    Ok(item) => item,
                    Err(e) => return Some(Err(e)),
                };
                Some(Ok(node.common.yielding(item)))
            }

            Self::PickBest(node) => loop {
                let item = match node.heap.next()? {
                    Ok(item) => item,
                    Err(e) => return Some(Err(e)),
                };
                let merged = fail_iter!(merge(
                    &[item],
                    &node.common.rules,
                    node.mass,
                    node.common.document,
                ));
                if merged.valid() {
                    return Some(Ok(node.common.yielding(Rc::new(merged))));
                }
            },
        }
    }
}

fn public_extraction(
    scored: &ScoredExtraction,
    public_fields: &BTreeSet<Field>,
) -> ScoredExtraction {
    let extraction = Extraction::from_points(
        scored
            .extraction
            .points()
            .iter()
            .filter(|p| public_fields.contains(&p.field))
            .map(|p| (p.field.clone(), p.entity)),
    )
    .unwrap_or_else(|_| Extraction::empty());

    let field_scores: BTreeMap<Field, f64> = scored
        .field_scores
        .iter()
        .filter(|(field, _)| public_fields.contains(*field))
        .map(|(field, score)| (field.clone(), *score))
        .collect();

    ScoredExtraction {
        extraction,
        score: scored.score,
        field_scores,
        rule_scores: scored.rule_scores.clone(),
        mass: scored.mass,
    }
}

/// The predicates of a leaf's top-level atoms, deduplicated by value in
/// first-seen order (the leaf-assignment memo key).
fn leaf_predicates(rules: &[Rule]) -> Vec<AnyPredicate> {
    let mut predicates: Vec<AnyPredicate> = Vec::new();
    for rule in rules {
        if let Rule::Atom(atom) = rule {
            if !predicates.contains(&atom.predicate) {
                predicates.push(atom.predicate.clone());
            }
        }
    }
    predicates
}

impl Node {
    /// Binds this tree to a document, producing the parallel bound tree.
    pub(crate) fn bound_to<'d>(&self, binder: &Binder<'d>) -> Result<BoundNode<'d>> {
        match self {
            Self::Empty(node) => Ok(BoundNode::Empty(BoundEmptyNode {
                common: BoundCommon::new(
                    binder.document,
                    BTreeSet::new(),
                    Vec::new(),
                    self.display_name(),
                    node.uuid,
                ),
            })),

            Self::Leaf(node) => {
                let predicates = leaf_predicates(&node.rules);
                let assignments = binder.leaf_assignments(node.entity_kind, &predicates)?;

                let mut extractions = Vec::with_capacity(assignments.len());
                for cached in assignments.iter() {
                    extractions.push(Rc::new(leaf_extraction(
                        &node.field,
                        &node.rules,
                        &predicates,
                        cached,
                    )?));
                }

                debug_assert!(
                    extractions.last().is_some_and(|e| e.is_empty()),
                    "the empty extraction must come last"
                );

                let non_atom_rules: Vec<Rule> = node
                    .rules
                    .iter()
                    .filter(|r| !matches!(r, Rule::Atom(_)))
                    .cloned()
                    .collect();

                Ok(BoundNode::Leaf(BoundLeafNode {
                    common: BoundCommon::new(
                        binder.document,
                        [node.field.clone()].into(),
                        node.rules.clone(),
                        self.display_name(),
                        node.uuid,
                    ),
                    extractions,
                    non_atom_rules,
                    cursor: 0,
                }))
            }

            Self::Pattern(node) => {
                let rewritten = rewrite_pattern(node, binder)?;
                let child = rewritten.bound_to(binder)?;

                let public_fields: BTreeSet<Field> = child
                    .common()
                    .legal_fields
                    .iter()
                    .filter(|f| !f.starts_with('_'))
                    .cloned()
                    .collect();

                Ok(BoundNode::Pattern(BoundPatternNode {
                    common: BoundCommon::new(
                        binder.document,
                        public_fields,
                        node.rules.clone(),
                        self.display_name(),
                        node.uuid,
                    ),
                    child: Box::new(child),
                }))
            }

            Self::Merge(node) => {
                let child = crate::tree::combine(node.children.clone())?.bound_to(binder)?;

                Ok(BoundNode::Merge(BoundMergeNode {
                    common: BoundCommon::new(
                        binder.document,
                        child.common().legal_fields.clone(),
                        node.rules.clone(),
                        self.display_name(),
                        node.uuid,
                    ),
                    child: Box::new(child),
                }))
            }

            Self::Combine(node) => {
                let node1 = node.node1.bound_to(binder)?;
                let node2 = node.node2.bound_to(binder)?;
                bind_combine(self, node, node1, node2, binder)
            }

            Self::PickBest(node) => {
                let mut children = Vec::with_capacity(node.children.len());
                for child in &node.children {
                    children.push(child.bound_to(binder)?);
                }

                let legal_fields: BTreeSet<Field> = children
                    .iter()
                    .flat_map(|c| c.common().legal_fields.iter().cloned())
                    .collect();
                let mass = children.iter().map(BoundNode::mass).max().unwrap_or(1);

                let heap = PeekingHeap::new(
                    children.into_iter().map(NodeStream::new).collect(),
                    Box::new(move |m| m.normalize(mass)),
                    1,
                )?;

                Ok(BoundNode::PickBest(BoundPickBestNode {
                    common: BoundCommon::new(
                        binder.document,
                        legal_fields,
                        node.rules.clone(),
                        self.display_name(),
                        node.uuid,
                    ),
                    heap,
                    mass,
                }))
            }
        }
    }
}

fn leaf_extraction(
    field: &Field,
    rules: &[Rule],
    predicates: &[AnyPredicate],
    cached: &CachedAssignment,
) -> Result<ScoredExtraction> {
    let extraction = match cached.assignment {
        Some(entity) => Extraction::from_points([(field.clone(), entity)])?,
        None => Extraction::empty(),
    };

    let field_scores: BTreeMap<Field, f64> = [(field.clone(), cached.field_score)].into();

    let mut rule_scores: FxHashMap<Uuid, RuleScore> = FxHashMap::default();
    for rule in rules {
        if let Rule::Atom(atom) = rule {
            if let Some(position) = predicates.iter().position(|p| *p == atom.predicate) {
                let score = if cached.assignment.is_some() {
                    cached.predicate_scores[position]
                } else {
                    1.0
                };
                rule_scores.insert(atom.uuid, RuleScore::Atom { score });
            }
        }
    }

    Ok(ScoredExtraction {
        score: extraction_score(&field_scores, 1),
        extraction,
        field_scores,
        rule_scores,
        mass: 1,
    })
}

fn bind_combine<'d>(
    node: &Node,
    combine: &crate::tree::CombineNode,
    node1: BoundNode<'d>,
    node2: BoundNode<'d>,
    binder: &Binder<'d>,
) -> Result<BoundNode<'d>> {
    let fields1 = node1.common().legal_fields.clone();
    let fields2 = node2.common().legal_fields.clone();
    let mut legal_fields = fields1.clone();
    legal_fields.extend(fields2.iter().cloned());

    let mass = node1.mass() + node2.mass();

    // The spanning atoms' weakenings, conjoined: the raw material for both
    // directions' prefilters.
    let decidable_phis: Vec<Formula> = combine
        .rules
        .iter()
        .flat_map(Rule::atoms)
        .filter(|atom| atom.fields.iter().all(|f| legal_fields.contains(f)))
        .map(crate::rule::Atom::phi)
        .collect();
    let phi = simplify(&Formula::and(decidable_phis));

    let document = binder.document;

    let prefilter_for = |target_fields: &BTreeSet<Field>,
                         feeder_fields: &BTreeSet<Field>|
     -> Prefilter<'d> {
        if target_fields.is_empty() || feeder_fields.is_empty() {
            return Prefilter::Trivial(TrivialPrefilter::new());
        }

        let weakened = |field: &Field| simplify(&weaken(&phi, field, feeder_fields));

        // The key field is the one whose weakened formula admits the most
        // restrictor literals; first-seen wins ties for determinism.
        let mut key_field: Option<(&Field, usize)> = None;
        for field in target_fields {
            let power = restrictive_power(&to_dnf(&weakened(field)), field, feeder_fields);
            if key_field.is_none_or(|(_, best)| power > best) {
                key_field = Some((field, power));
            }
        }

        let (field, _) = key_field.expect("target fields are non-empty");
        Prefilter::DocRegion(DocRegionPrefilter::new(
            field.clone(),
            &weakened(field),
            document,
        ))
    };

    let prefilter1 = prefilter_for(&fields1, &fields2);
    let prefilter2 = prefilter_for(&fields2, &fields1);

    let rules = Rc::new(combine.rules.clone());
    let merge_fields = Rc::new(legal_fields.clone());
    let all_or_nothing = combine.all_or_nothing;

    let merger: Merger<'d> = Box::new(move |parts| {
        let merged = merge(parts, &rules, mass, document)?;
        if all_or_nothing && merged.extraction.field_set() != *merge_fields && !merged.is_empty()
        {
            return Ok(None);
        }
        Ok(if merged.valid() { Some(merged) } else { None })
    });

    let norm_estimator: NormEstimator<'d> = Box::new(|parts| {
        let weighted: f64 = parts.iter().map(|m| m.score * f64::from(m.mass)).sum();
        let total_mass: f64 = parts.iter().map(|m| f64::from(m.mass)).sum();
        -(weighted / total_mass)
    });

    let smerger = Smerger::new(
        vec![
            (NodeStream::new(node1), prefilter1),
            (NodeStream::new(node2), prefilter2),
        ],
        merger,
        norm_estimator,
        all_or_nothing,
        combine.peek_distance,
        true,
    )?;

    Ok(BoundNode::Combine(BoundCombineNode {
        common: BoundCommon::new(
            binder.document,
            legal_fields,
            combine.rules.clone(),
            node.display_name(),
            combine.uuid,
        ),
        smerger,
        mass,
        deadline: binder.deadline,
    }))
}

/// Rebuilds a pattern node's subtree for one document.
///
/// Fields are grouped into rule-connected components; within a component,
/// leaves are greedily collapsed into combine nodes, always joining the
/// pair with the least estimated post-join candidates (leaf candidate count
/// discounted by rule leniency). Components are then folded together
/// cheapest-first, and every rule is pushed down to the deepest node that
/// can decide it.
fn rewrite_pattern(pattern: &PatternNode, binder: &Binder<'_>) -> Result<Node> {
    let fields: BTreeSet<Field> = pattern.fields.keys().cloned().collect();

    // Candidate counts per field, under that field's own degree-1 rules
    let mut num_leaf_assignments: BTreeMap<Field, usize> = BTreeMap::new();
    for field in &fields {
        let leaf_rules: Vec<Rule> = pattern
            .rules
            .iter()
            .filter(|rule| {
                let rule_fields = rule.fields();
                rule_fields.len() == 1 && rule_fields.contains(field)
            })
            .cloned()
            .collect();
        let predicates = leaf_predicates(&leaf_rules);
        let kind = pattern
            .fields
            .get(field)
            .copied()
            .unwrap_or(EntityKind::Text);
        let count = binder.leaf_assignments(kind, &predicates)?.len();
        num_leaf_assignments.insert(field.clone(), count);
    }

    // Connectives participate through their atoms
    let mut atoms: Vec<Rule> = Vec::new();
    for rule in &pattern.rules {
        match rule {
            Rule::Atom(_) => atoms.push(rule.clone()),
            _ => atoms.extend(rule.atoms().into_iter().cloned().map(Rule::Atom)),
        }
    }

    // Fields with no rules still deserve a leaf, so each legal field seeds
    // a singleton component.
    let field_components = components(
        atoms
            .iter()
            .map(Rule::fields)
            .chain(fields.iter().map(|f| BTreeSet::from([f.clone()]))),
    );

    let mut component_graphs: Vec<WeightedMultiGraph> = Vec::new();
    for component in field_components {
        let mut graph = WeightedMultiGraph::new(component.clone());
        for rule in &atoms {
            let Rule::Atom(atom) = rule else {
                continue;
            };
            if !atom.fields.iter().all(|f| component.contains(f)) {
                continue;
            }
            let leniency = atom.predicate.leniency().value();
            match &*atom.fields {
                [field] => graph.add_edge(edge(field, field), leniency),
                [field1, field2] => graph.add_edge(edge(field1, field2), leniency),
                // No pairwise edge to hang higher-degree atoms on
                _ => {}
            }
        }
        component_graphs.push(graph);
    }

    component_graphs.sort_by(|a, b| {
        estimated_valid_assignments(a, &num_leaf_assignments)
            .total_cmp(&estimated_valid_assignments(b, &num_leaf_assignments))
    });

    let mut trees = Vec::with_capacity(component_graphs.len());
    for graph in &component_graphs {
        trees.push(build_tree_from_graph(
            graph,
            &pattern.fields,
            &num_leaf_assignments,
        )?);
    }

    let Some(first) = trees.first().cloned() else {
        return Ok(Node::empty());
    };
    let mut root = first;
    for tree in trees.into_iter().skip(1) {
        root = crate::tree::combine_with(vec![root, tree], true, &[])?;
    }

    let distributed = distribute_rules(&root, &atoms);
    distributed.validate()?;
    Ok(distributed)
}
