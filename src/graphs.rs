// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Small graph utilities used to order the combine tree.

use crate::extraction::Field;
use std::collections::{BTreeMap, BTreeSet};

/// An edge between two fields, normalised so the smaller field comes first.
/// A self-edge `(v, v)` carries the weights of degree-1 rules.
pub(crate) type Edge = (Field, Field);

pub(crate) fn edge(a: &Field, b: &Field) -> Edge {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// Given a set of complete graphs (each given by its vertex set), returns
/// the connected components of their union.
pub(crate) fn components(
    complete_graphs: impl IntoIterator<Item = BTreeSet<Field>>,
) -> Vec<BTreeSet<Field>> {
    let mut component_of: BTreeMap<Field, usize> = BTreeMap::new();
    let mut component_sets: Vec<BTreeSet<Field>> = Vec::new();

    for vertices in complete_graphs {
        let mut merged: BTreeSet<Field> = vertices.clone();
        let mut absorbed: Vec<usize> = vertices
            .iter()
            .filter_map(|v| component_of.get(v).copied())
            .collect();
        absorbed.sort_unstable();
        absorbed.dedup();

        for idx in &absorbed {
            merged.extend(component_sets[*idx].iter().cloned());
            component_sets[*idx].clear();
        }

        let new_idx = component_sets.len();
        for v in &merged {
            component_of.insert(v.clone(), new_idx);
        }
        component_sets.push(merged);
    }

    component_sets.retain(|s| !s.is_empty());
    component_sets
}

/// A graph with edge multiplicity and numeric edge weights
///
/// The edge set is the key set of `weights`; each edge maps to the weights
/// of all parallel edges between its endpoints.
#[derive(Clone, Debug)]
pub(crate) struct WeightedMultiGraph {
    pub vertices: BTreeSet<Field>,
    pub weights: BTreeMap<Edge, Vec<f64>>,
}

impl WeightedMultiGraph {
    pub fn new(vertices: BTreeSet<Field>) -> Self {
        Self {
            vertices,
            weights: BTreeMap::new(),
        }
    }

    pub fn add_edge(&mut self, e: Edge, weight: f64) {
        self.weights.entry(e).or_default().push(weight);
    }

    /// Product of one edge's parallel weights.
    pub fn product_weight(&self, e: &Edge) -> f64 {
        self.weights
            .get(e)
            .map_or(1.0, |ws| ws.iter().product())
    }

    /// Product of every weight in the graph.
    pub fn combined_weight(&self) -> f64 {
        self.weights
            .values()
            .flat_map(|ws| ws.iter())
            .product()
    }

    /// Edges whose endpoints differ, in deterministic order.
    pub fn cross_edges(&self) -> impl Iterator<Item = &Edge> {
        self.weights.keys().filter(|e| e.0 != e.1)
    }

    /// Collapses both ends of `old` into `new_vertex`, merging parallel
    /// edge weights.
    pub fn with_vertices_collapsed(&self, old: &Edge, new_vertex: &Field) -> Self {
        let old_vertices: BTreeSet<&Field> = [&old.0, &old.1].into();

        let rename = |v: &Field| -> Field {
            if old_vertices.contains(v) {
                new_vertex.clone()
            } else {
                v.clone()
            }
        };

        let mut weights: BTreeMap<Edge, Vec<f64>> = BTreeMap::new();
        for ((a, b), ws) in &self.weights {
            let e = edge(&rename(a), &rename(b));
            weights.entry(e).or_default().extend(ws.iter().copied());
        }

        let mut vertices: BTreeSet<Field> = self
            .vertices
            .iter()
            .filter(|v| !old_vertices.contains(*v))
            .cloned()
            .collect();
        vertices.insert(new_vertex.clone());

        Self { vertices, weights }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn f(name: &str) -> Field {
        Field::from(name)
    }

    fn set(names: &[&str]) -> BTreeSet<Field> {
        names.iter().map(|n| f(n)).collect()
    }

    #[test]
    fn components_merge_overlapping_graphs() {
        let result = components([set(&["a", "b"]), set(&["b", "c"]), set(&["d"])]);
        assert_eq!(result.len(), 2);
        assert!(result.contains(&set(&["a", "b", "c"])));
        assert!(result.contains(&set(&["d"])));
    }

    #[test]
    fn components_of_disjoint_graphs() {
        let result = components([set(&["a"]), set(&["b"]), set(&["c", "d"])]);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn collapse_merges_parallel_edges() {
        let mut graph = WeightedMultiGraph::new(set(&["a", "b", "c"]));
        graph.add_edge(edge(&f("a"), &f("b")), 0.5);
        graph.add_edge(edge(&f("a"), &f("c")), 0.3);
        graph.add_edge(edge(&f("b"), &f("c")), 0.1);

        let collapsed = graph.with_vertices_collapsed(&edge(&f("a"), &f("b")), &f("a"));
        assert_eq!(collapsed.vertices, set(&["a", "c"]));

        // The a-c and b-c edges become parallel edges of a-c
        let ac = edge(&f("a"), &f("c"));
        assert!((collapsed.product_weight(&ac) - 0.03).abs() < 1e-12);

        // The collapsed edge itself becomes a self-edge on a
        let self_edge = edge(&f("a"), &f("a"));
        assert!((collapsed.product_weight(&self_edge) - 0.5).abs() < 1e-12);
    }
}
