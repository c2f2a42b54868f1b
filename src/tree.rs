// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The extraction tree.
//!
//! An extraction tree is a hierarchical description of a document's
//! structure. Each node has fields it is responsible for and rules
//! describing the extraction we want; binding the tree to a document gives
//! an iterator of scored extractions, best-first-ish.
//!
//! The nodes are smart enough to return higher-quality extractions first,
//! so a parent can examine just the first few samples from each of its
//! children and combine them in the way that makes the most sense at its
//! level. The last extraction each node returns is the empty extraction.

use crate::entity::EntityKind;
use crate::extraction::Field;
use crate::graphs::{edge, WeightedMultiGraph};
use crate::predicate::AnyPredicate;
use crate::rule::{Atom, Rule};
use crate::rules::logical::AreDisjoint;
use crate::rules::semantic::{IsDate, IsDollarAmount, IsEntirePhrase};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A node with no fields or rules; yields nothing when bound
#[derive(Clone, Debug)]
pub struct EmptyNode {
    /// Rules at this node (always empty)
    pub rules: Vec<Rule>,

    /// Node uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

/// A leaf in an extraction tree
///
/// Bound to a document, it enumerates assignments from its field to
/// entities of its entity kind, scored under its degree-1 rules.
#[derive(Clone, Debug)]
pub struct LeafNode {
    /// The field this leaf assigns
    pub field: Field,

    /// The entity variant candidates are drawn from
    pub entity_kind: EntityKind,

    /// Rules at this node
    pub rules: Vec<Rule>,

    /// Node uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

/// A node whose tree structure is rebuilt for each document
///
/// This is the idiomatic user-level constructor: give it fields and a flat
/// rule set, and binding reorders everything into a combine tree whose join
/// order is estimated to be cheapest for that document.
#[derive(Clone, Debug)]
pub struct PatternNode {
    /// The fields to extract, with their entity kinds
    pub fields: BTreeMap<Field, EntityKind>,

    /// Rules at this node
    pub rules: Vec<Rule>,

    /// Node uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

/// Combines the outputs of two extraction nodes over disjoint field sets
#[derive(Clone, Debug)]
pub struct CombineNode {
    /// First subtree
    pub node1: Node,

    /// Second subtree; its fields must be disjoint from the first's
    pub node2: Node,

    /// If set, a merged extraction missing any field is dropped
    pub all_or_nothing: bool,

    /// How far ahead the underlying smerger peeks; at least 2 is
    /// recommended
    pub peek_distance: usize,

    /// Rules at this node
    pub rules: Vec<Rule>,

    /// Node uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

/// Merges the outputs of several extraction nodes over disjoint field sets
#[derive(Clone, Debug)]
pub struct MergeNode {
    /// The independent subtrees
    pub children: Vec<Node>,

    /// Rules at this node
    pub rules: Vec<Rule>,

    /// Node uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

/// Selects the best extractions from one of several extraction subtrees
///
/// Used when a document can have different layouts: define one subtree per
/// layout and let the best one win.
#[derive(Clone, Debug)]
pub struct PickBestNode {
    /// The competing subtrees
    pub children: Vec<Node>,

    /// Rules at this node
    pub rules: Vec<Rule>,

    /// Node uuid
    pub uuid: Uuid,

    /// Optional display name
    pub name: Option<String>,
}

/// A node in an extraction tree
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Node {
    Empty(EmptyNode),
    Leaf(LeafNode),
    Pattern(PatternNode),
    Combine(Box<CombineNode>),
    Merge(MergeNode),
    PickBest(PickBestNode),
}

impl Node {
    /// Creates a leaf node.
    #[must_use]
    pub fn leaf(field: &str, entity_kind: EntityKind) -> Self {
        Self::Leaf(LeafNode {
            field: Field::from(field),
            entity_kind,
            rules: Vec::new(),
            uuid: Uuid::new_v4(),
            name: None,
        })
    }

    /// Creates an empty node.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty(EmptyNode {
            rules: Vec::new(),
            uuid: Uuid::new_v4(),
            name: None,
        })
    }

    /// This node's uuid.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Empty(n) => n.uuid,
            Self::Leaf(n) => n.uuid,
            Self::Pattern(n) => n.uuid,
            Self::Combine(n) => n.uuid,
            Self::Merge(n) => n.uuid,
            Self::PickBest(n) => n.uuid,
        }
    }

    /// The rules attached at this node.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        match self {
            Self::Empty(n) => &n.rules,
            Self::Leaf(n) => &n.rules,
            Self::Pattern(n) => &n.rules,
            Self::Combine(n) => &n.rules,
            Self::Merge(n) => &n.rules,
            Self::PickBest(n) => &n.rules,
        }
    }

    /// The display name, or a derived default.
    #[must_use]
    pub fn display_name(&self) -> String {
        let name = match self {
            Self::Empty(n) => &n.name,
            Self::Leaf(n) => &n.name,
            Self::Pattern(n) => &n.name,
            Self::Combine(n) => &n.name,
            Self::Merge(n) => &n.name,
            Self::PickBest(n) => &n.name,
        };
        if let Some(name) = name {
            return name.clone();
        }
        let fields: Vec<String> = self
            .legal_fields()
            .iter()
            .map(ToString::to_string)
            .collect();
        let kind = match self {
            Self::Empty(_) => "EmptyNode",
            Self::Leaf(_) => "LeafNode",
            Self::Pattern(_) => "PatternNode",
            Self::Combine(_) => "CombineNode",
            Self::Merge(_) => "MergeNode",
            Self::PickBest(_) => "PickBestNode",
        };
        format!("{kind}({})", fields.join(", "))
    }

    /// The immediate children of this node.
    #[must_use]
    pub fn children(&self) -> Vec<&Self> {
        match self {
            Self::Empty(_) | Self::Leaf(_) | Self::Pattern(_) => Vec::new(),
            Self::Combine(n) => vec![&n.node1, &n.node2],
            Self::Merge(n) => n.children.iter().collect(),
            Self::PickBest(n) => n.children.iter().collect(),
        }
    }

    /// The fields which may be present in extractions this node generates.
    #[must_use]
    pub fn legal_fields(&self) -> BTreeSet<Field> {
        match self {
            Self::Empty(_) => BTreeSet::new(),
            Self::Leaf(n) => [n.field.clone()].into(),
            Self::Pattern(n) => n.fields.keys().cloned().collect(),
            Self::Combine(n) => {
                let mut fields = n.node1.legal_fields();
                fields.extend(n.node2.legal_fields());
                fields
            }
            Self::Merge(n) => n
                .children
                .iter()
                .flat_map(Self::legal_fields)
                .collect(),
            Self::PickBest(n) => n
                .children
                .iter()
                .flat_map(Self::legal_fields)
                .collect(),
        }
    }

    /// Can this rule be checked at this node?
    #[must_use]
    pub fn is_decidable(&self, rule: &Rule) -> bool {
        let legal = self.legal_fields();
        rule.fields().iter().all(|f| legal.contains(f))
    }

    /// Remakes this node with the given rules added to its existing ones.
    #[must_use]
    pub fn with_extra_rules(self, extra: Vec<Rule>) -> Self {
        let mut rules: Vec<Rule> = self.rules().to_vec();
        rules.extend(extra);
        self.with_rules(rules)
    }

    /// Remakes this node, replacing any rules that were present.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        match &mut self {
            Self::Empty(n) => n.rules = rules,
            Self::Leaf(n) => n.rules = rules,
            Self::Pattern(n) => n.rules = rules,
            Self::Combine(n) => n.rules = rules,
            Self::Merge(n) => n.rules = rules,
            Self::PickBest(n) => n.rules = rules,
        }
        self
    }

    /// Remakes this node with the given name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        let slot = match &mut self {
            Self::Empty(n) => &mut n.name,
            Self::Leaf(n) => &mut n.name,
            Self::Pattern(n) => &mut n.name,
            Self::Combine(n) => &mut n.name,
            Self::Merge(n) => &mut n.name,
            Self::PickBest(n) => &mut n.name,
        };
        *slot = Some(name.into());
        self
    }

    /// Validates this node (not its descendants).
    ///
    /// # Errors
    ///
    /// Structural errors: rules referencing fields outside the node,
    /// overlapping child fields, bad peek distances.
    pub fn validate(&self) -> Result<()> {
        let legal = self.legal_fields();
        for rule in self.rules() {
            for field in rule.fields() {
                if !legal.contains(&field) {
                    return Err(Error::UnrecognizedField(field));
                }
            }
        }

        match self {
            Self::Empty(n) => {
                if !n.rules.is_empty() {
                    return Err(Error::InvalidParameter(
                        "empty nodes cannot carry rules".into(),
                    ));
                }
            }

            Self::Combine(n) => {
                let overlap: Vec<Field> = n
                    .node1
                    .legal_fields()
                    .intersection(&n.node2.legal_fields())
                    .cloned()
                    .collect();
                if !overlap.is_empty() {
                    return Err(Error::OverlappingFields(format!(
                        "fields {overlap:?} appear in both combine children"
                    )));
                }
                if n.peek_distance < 1 {
                    return Err(Error::InvalidParameter(format!(
                        "combine node peek distance must be positive, not {}",
                        n.peek_distance
                    )));
                }
                if n.peek_distance == 1 {
                    log::warn!(
                        "peek distance of 1 in {} may result in poor performance",
                        self.display_name()
                    );
                }
            }

            Self::Merge(n) => {
                let mut seen: BTreeSet<Field> = BTreeSet::new();
                for child in &n.children {
                    for field in child.legal_fields() {
                        if !seen.insert(field.clone()) {
                            return Err(Error::OverlappingFields(format!(
                                "field {field} appears in multiple merge children"
                            )));
                        }
                    }
                }
            }

            _ => {}
        }

        Ok(())
    }

    /// Validates this node and all its descendants.
    ///
    /// # Errors
    ///
    /// See [`Node::validate`].
    pub fn validate_tree(&self) -> Result<()> {
        self.validate()?;
        for child in self.children() {
            child.validate_tree()?;
        }
        Ok(())
    }
}

fn has_type_rule(atoms: &[&Atom], field: &Field, matches: impl Fn(&AnyPredicate) -> bool) -> bool {
    atoms
        .iter()
        .any(|atom| matches(&atom.predicate) && *atom.fields == [field.clone()])
}

/// Finds an extraction satisfying the given rules.
///
/// This is the most basic extraction building block; the fields to extract
/// are those bound to the rules. If `field_types` is not given, field types
/// are inferred from the presence of `is_date`, `is_dollar_amount`, and
/// `is_entire_phrase` rules; everything else defaults to `Text`.
///
/// # Errors
///
/// Fails if a field is claimed by more than one type rule.
pub fn extract(rules: Vec<Rule>, field_types: Option<&[(&str, EntityKind)]>) -> Result<Node> {
    let fields: BTreeSet<Field> = rules.iter().flat_map(Rule::fields).collect();

    let field_types: BTreeMap<Field, EntityKind> = match field_types {
        Some(given) => given
            .iter()
            .map(|(f, kind)| (Field::from(*f), *kind))
            .collect(),
        None => {
            let atoms: Vec<&Atom> = rules
                .iter()
                .filter_map(|r| match r {
                    Rule::Atom(atom) => Some(atom),
                    _ => None,
                })
                .collect();

            let mut inferred = BTreeMap::new();
            for field in &fields {
                let date = has_type_rule(&atoms, field, |p| {
                    matches!(p, AnyPredicate::IsDate(IsDate))
                });
                let dollar = has_type_rule(&atoms, field, |p| {
                    matches!(p, AnyPredicate::IsDollarAmount(IsDollarAmount))
                });
                let phrase = has_type_rule(&atoms, field, |p| {
                    matches!(p, AnyPredicate::IsEntirePhrase(IsEntirePhrase))
                });

                if usize::from(date) + usize::from(dollar) + usize::from(phrase) > 1 {
                    return Err(Error::InvalidParameter(format!(
                        "field {field} cannot be multiple types; apply at most one of \
                         is_date, is_dollar_amount, is_entire_phrase"
                    )));
                }

                let kind = if date {
                    EntityKind::Date
                } else if dollar {
                    EntityKind::DollarAmount
                } else {
                    EntityKind::Text
                };
                inferred.insert(field.clone(), kind);
            }
            inferred
        }
    };

    let node = Node::Pattern(PatternNode {
        fields: field_types,
        rules,
        uuid: Uuid::new_v4(),
        name: None,
    });
    node.validate()?;
    Ok(node)
}

/// Combines several extraction trees over disjoint field sets.
///
/// By default this adds rules saying that entities assigned to fields from
/// different subtrees do not overlap.
///
/// # Errors
///
/// Fails if the subtrees' fields overlap.
pub fn combine(nodes: Vec<Node>) -> Result<Node> {
    combine_with(nodes, false, &[])
}

/// [`combine`] with control over the all-or-nothing flag and which field
/// pairs may overlap.
///
/// For each pair in `allowed_to_overlap`, the two fields must come from
/// different subtrees; no disjointness rule is added for them.
///
/// # Errors
///
/// Fails if the subtrees' fields overlap.
pub fn combine_with(
    nodes: Vec<Node>,
    all_or_nothing: bool,
    allowed_to_overlap: &[(&str, &str)],
) -> Result<Node> {
    if nodes.is_empty() {
        return Ok(Node::empty());
    }

    let allowed: BTreeSet<BTreeSet<&str>> = allowed_to_overlap
        .iter()
        .map(|(a, b)| [*a, *b].into())
        .collect();

    let mut disjointness_rules: Vec<Rule> = Vec::new();
    for (i, node1) in nodes.iter().enumerate() {
        for node2 in nodes.iter().skip(i + 1) {
            for f1 in node1.legal_fields() {
                for f2 in node2.legal_fields() {
                    let pair: BTreeSet<&str> = [&*f1, &*f2].into();
                    if allowed.contains(&pair) {
                        continue;
                    }
                    disjointness_rules.push(Rule::Atom(Atom::from_fields(
                        vec![f1.clone(), f2.clone()],
                        AreDisjoint.into(),
                    )?));
                }
            }
        }
    }

    let mut iter = nodes.into_iter();
    let first = iter.next().expect("checked non-empty above");
    let root = iter.fold(first, |acc, node| {
        Node::Combine(Box::new(CombineNode {
            node1: acc,
            node2: node,
            all_or_nothing,
            peek_distance: 2,
            rules: Vec::new(),
            uuid: Uuid::new_v4(),
            name: None,
        }))
    });

    let root = root.with_extra_rules(disjointness_rules);
    root.validate()?;
    Ok(root)
}

/// Uses the best extractions from a collection of extraction trees.
///
/// # Errors
///
/// Fails if a rule at the new node references unknown fields.
pub fn pick_best(nodes: Vec<Node>) -> Result<Node> {
    let node = Node::PickBest(PickBestNode {
        children: nodes,
        rules: Vec::new(),
        uuid: Uuid::new_v4(),
        name: None,
    });
    node.validate()?;
    Ok(node)
}

/// Merges several extraction trees over disjoint field sets into one.
///
/// # Errors
///
/// Fails if the subtrees' fields overlap.
pub fn merge_trees(nodes: Vec<Node>) -> Result<Node> {
    let node = Node::Merge(MergeNode {
        children: nodes,
        rules: Vec::new(),
        uuid: Uuid::new_v4(),
        name: None,
    });
    node.validate()?;
    Ok(node)
}

/// Estimates how many valid assignments a component graph admits: the
/// product of its fields' candidate counts, discounted by the leniency of
/// every rule edge.
pub(crate) fn estimated_valid_assignments(
    graph: &WeightedMultiGraph,
    num_leaf_assignments: &BTreeMap<Field, usize>,
) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let candidates: f64 = graph
        .vertices
        .iter()
        .map(|v| num_leaf_assignments.get(v).copied().unwrap_or(1) as f64)
        .product();
    candidates * graph.combined_weight()
}

/// Greedily collapses a component's fields into a combine tree, always
/// joining the pair of vertices with the least estimated assignments.
///
/// The result is not guaranteed to be optimal.
pub(crate) fn build_tree_from_graph(
    graph: &WeightedMultiGraph,
    field_types: &BTreeMap<Field, EntityKind>,
    num_leaf_assignments: &BTreeMap<Field, usize>,
) -> Result<Node> {
    debug_assert!(!graph.vertices.is_empty());

    let mut nodes: BTreeMap<Field, Node> = graph
        .vertices
        .iter()
        .map(|field| {
            let kind = field_types
                .get(field)
                .copied()
                .unwrap_or(EntityKind::Text);
            (field.clone(), Node::leaf(field, kind))
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let mut vertex_weights: BTreeMap<Field, f64> = graph
        .vertices
        .iter()
        .map(|v| {
            let candidates = num_leaf_assignments.get(v).copied().unwrap_or(1) as f64;
            let self_edge = edge(v, v);
            (v.clone(), candidates * graph.product_weight(&self_edge))
        })
        .collect();

    let mut graph = graph.clone();

    while graph.vertices.len() > 1 {
        let edge_key = |e: &(Field, Field)| -> f64 {
            vertex_weights[&e.0] * vertex_weights[&e.1] * graph.product_weight(e)
        };

        // Components joined only by higher-degree atoms have no pairwise
        // edges; fall back to joining the smallest vertices.
        let best_edge: (Field, Field) = graph
            .cross_edges()
            .min_by(|&a, &b| edge_key(a).total_cmp(&edge_key(b)))
            .cloned()
            .unwrap_or_else(|| {
                let mut vertices = graph.vertices.iter();
                let a = vertices.next().expect("graph has vertices").clone();
                let b = vertices.next().expect("graph has >1 vertex").clone();
                (a, b)
            });

        let weight = edge_key(&best_edge);

        let node1 = nodes.remove(&best_edge.0).expect("vertex has a node");
        let node2 = nodes.remove(&best_edge.1).expect("vertex has a node");
        let combined = combine_with(vec![node1, node2], true, &[])?;

        nodes.insert(best_edge.0.clone(), combined);
        vertex_weights.insert(best_edge.0.clone(), weight);
        graph = graph.with_vertices_collapsed(&best_edge, &best_edge.0);
    }

    let root_field = graph.vertices.iter().next().expect("one vertex remains");
    Ok(nodes.remove(root_field).expect("vertex has a node"))
}

/// Distributes rules over a combine/leaf subtree.
///
/// Each rule is pushed down to every child where at least one of its atoms
/// becomes decidable; rules spanning both children of a combine node stay
/// at that node. Leaves keep everything that reached them.
pub(crate) fn distribute_rules(node: &Node, rules: &[Rule]) -> Node {
    let mut rules: Vec<Rule> = rules.to_vec();
    rules.extend(node.rules().iter().cloned());

    match node {
        Node::Combine(c) => {
            let remake_child = |child: &Node| -> Node {
                let legal = child.legal_fields();
                let child_rules: Vec<Rule> = rules
                    .iter()
                    .filter(|rule| {
                        rule.atoms()
                            .iter()
                            .any(|atom| atom.fields.iter().all(|f| legal.contains(f)))
                    })
                    .cloned()
                    .collect();
                distribute_rules(child, &child_rules)
            };

            let spanning: Vec<Rule> = rules
                .iter()
                .filter(|rule| !c.node1.is_decidable(rule) && !c.node2.is_decidable(rule))
                .cloned()
                .collect();

            Node::Combine(Box::new(CombineNode {
                node1: remake_child(&c.node1),
                node2: remake_child(&c.node2),
                all_or_nothing: c.all_or_nothing,
                peek_distance: c.peek_distance,
                rules: spanning,
                uuid: c.uuid,
                name: c.name.clone(),
            }))
        }

        Node::Leaf(_) => node.clone().with_rules(rules),

        // Rewritten pattern trees consist of combines and leaves only
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::semantic::{is_date, is_dollar_amount};
    use crate::rules::spatial::left_to_right;
    use crate::rules::textual::text_equals;
    use test_log::test;

    #[test]
    fn extract_infers_field_types() -> crate::Result<()> {
        let node = extract(
            vec![
                is_date().applied_to(&["when"])?,
                is_dollar_amount().applied_to(&["amount"])?,
                left_to_right(&["when", "amount"])?,
            ],
            None,
        )?;

        let Node::Pattern(pattern) = &node else {
            panic!("extract should build a pattern node");
        };
        assert_eq!(pattern.fields.get("when"), Some(&EntityKind::Date));
        assert_eq!(
            pattern.fields.get("amount"),
            Some(&EntityKind::DollarAmount)
        );
        Ok(())
    }

    #[test]
    fn extract_rejects_conflicting_types() -> crate::Result<()> {
        let result = extract(
            vec![
                is_date().applied_to(&["f"])?,
                is_dollar_amount().applied_to(&["f"])?,
            ],
            None,
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn combine_rejects_overlapping_fields() -> crate::Result<()> {
        let a = extract(vec![text_equals("x").applied_to(&["f"])?], None)?;
        let b = extract(vec![text_equals("y").applied_to(&["f"])?], None)?;
        assert!(matches!(
            combine(vec![a, b]),
            Err(Error::OverlappingFields(_))
        ));
        Ok(())
    }

    #[test]
    fn combine_adds_disjointness_rules() -> crate::Result<()> {
        let a = extract(vec![text_equals("x").applied_to(&["f1"])?], None)?;
        let b = extract(vec![text_equals("y").applied_to(&["f2"])?], None)?;
        let combined = combine(vec![a, b])?;

        assert_eq!(combined.rules().len(), 1);
        assert!(matches!(
            combined.rules()[0],
            Rule::Atom(Atom {
                predicate: AnyPredicate::AreDisjoint(_),
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn merge_validation_rejects_shared_fields() -> crate::Result<()> {
        let a = extract(vec![text_equals("x").applied_to(&["f1"])?], None)?;
        let b = extract(vec![text_equals("y").applied_to(&["f1"])?], None)?;
        assert!(matches!(
            merge_trees(vec![a, b]),
            Err(Error::OverlappingFields(_))
        ));
        Ok(())
    }

    #[test]
    fn distribute_rules_pushes_atoms_down() -> crate::Result<()> {
        let row = left_to_right(&["a", "b"])?;
        let a_rule = text_equals("A").applied_to(&["a"])?;
        let b_rule = text_equals("B").applied_to(&["b"])?;

        let tree = Node::Combine(Box::new(CombineNode {
            node1: Node::leaf("a", EntityKind::Text),
            node2: Node::leaf("b", EntityKind::Text),
            all_or_nothing: true,
            peek_distance: 2,
            rules: Vec::new(),
            uuid: Uuid::new_v4(),
            name: None,
        }));

        let distributed = distribute_rules(&tree, &[row, a_rule, b_rule]);

        let Node::Combine(combine) = &distributed else {
            panic!("combine stays a combine");
        };
        // The spanning rule stays at the combine node
        assert_eq!(combine.rules.len(), 1);
        // Each leaf got its own degree-1 rule
        assert_eq!(combine.node1.rules().len(), 1);
        assert_eq!(combine.node2.rules().len(), 1);
        Ok(())
    }
}
