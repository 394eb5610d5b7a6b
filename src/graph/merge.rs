//! Deduplicating merge of subgraphs.
//!
//! Merging walks the right-hand graph once, extending the left-hand one:
//! nodes are matched by name, sentences by exact text, and edges by their
//! remapped `(source, target, relation)` key. Anything new is appended with
//! freshly assigned indices, so the result is associative, has the empty
//! graph as left identity, and `merge(a, a)` equals `a` for any `a` built
//! through the [`Graph`] API or loaded by a `GraphStore`.

use crate::error::GraphError;

use super::Graph;

/// What a merge added to the left-hand graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub nodes_added: usize,
    pub edges_added: usize,
    pub sentences_added: usize,
}

impl Graph {
    /// Merge `other` into `self` in place.
    pub fn absorb(&mut self, other: &Graph) -> MergeStats {
        let mut stats = MergeStats::default();

        let node_map: Vec<usize> = other
            .nodes()
            .iter()
            .map(|node| {
                let (id, added) = self.add_node(node);
                stats.nodes_added += usize::from(added);
                id
            })
            .collect();

        let sentence_map: Vec<usize> = other
            .sentences()
            .iter()
            .map(|text| {
                let before = self.sentence_count();
                let id = self.add_sentence(text);
                stats.sentences_added += usize::from(self.sentence_count() > before);
                id
            })
            .collect();

        for (index, edge) in other.edges().iter().enumerate() {
            let remapped = (
                node_map.get(edge.source),
                node_map.get(edge.target),
                edge.sentence.map(|s| sentence_map.get(s)),
            );
            let (source, target, sentence) = match remapped {
                (Some(&s), Some(&t), None) => (s, t, None),
                (Some(&s), Some(&t), Some(Some(&sent))) => (s, t, Some(sent)),
                _ => {
                    let err = GraphError::MalformedEdge {
                        index,
                        reason: "indices do not resolve in the merged graph".into(),
                    };
                    tracing::warn!(error = %err, "skipping edge during merge");
                    continue;
                }
            };
            if self.add_edge(source, target, &edge.relation, sentence) {
                stats.edges_added += 1;
            }
        }

        for category in other.categories() {
            if !self.categories().contains(category) {
                let mut categories = self.categories().to_vec();
                categories.push(category.clone());
                self.set_categories(categories);
            }
        }

        stats
    }
}

/// Merge two graphs into a new one.
pub fn merge(a: &Graph, b: &Graph) -> Graph {
    let mut merged = a.clone();
    merged.absorb(b);
    merged
}

/// Fold graphs left to right. `None` if there were none or all were empty.
pub fn merge_all(graphs: impl IntoIterator<Item = Graph>) -> Option<Graph> {
    let mut merged: Option<Graph> = None;
    for graph in graphs {
        match merged.as_mut() {
            None => merged = Some(graph),
            Some(acc) => {
                let stats = acc.absorb(&graph);
                tracing::debug!(
                    nodes_added = stats.nodes_added,
                    edges_added = stats.edges_added,
                    sentences_added = stats.sentences_added,
                    "merged subgraph"
                );
            }
        }
    }
    merged.filter(|g| !g.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn sample_a() -> Graph {
        let mut g = Graph::new();
        g.add_fact("A", "r", "B", Some("A r B."));
        g.add_fact("B", "r", "C", None);
        g
    }

    fn sample_b() -> Graph {
        let mut g = Graph::new();
        g.add_fact("C", "r", "D", Some("C r D."));
        g.add_fact("A", "r", "B", Some("A r B."));
        g
    }

    fn sample_c() -> Graph {
        let mut g = Graph::new();
        g.add_fact("D", "q", "A", Some("D q A."));
        g.add_fact("E", "q", "B", Some("C r D."));
        g
    }

    #[test]
    fn merge_remaps_edges_onto_existing_nodes() {
        let mut a = Graph::new();
        a.add_node(&Node::named("X"));
        let mut b = Graph::new();
        b.add_node(&Node::named("Y"));
        b.add_fact("X", "r", "Y", Some("s1"));

        let merged = merge(&a, &b);
        assert_eq!(merged.node_count(), 2);
        assert_eq!(merged.edge_count(), 1);
        assert_eq!(merged.sentence_count(), 1);

        let edge = &merged.edges()[0];
        assert_eq!(merged.node(edge.source).unwrap().name, "X");
        assert_eq!(merged.node(edge.target).unwrap().name, "Y");
        assert_eq!(edge.sentence, Some(0));
    }

    #[test]
    fn self_merge_is_idempotent() {
        let a = sample_a();
        let merged = merge(&a, &a);
        assert_eq!(merged, a);
        let stats = a.clone().absorb(&a);
        assert_eq!(stats, MergeStats::default());
    }

    #[test]
    fn empty_graph_is_left_identity() {
        let a = sample_a();
        assert_eq!(merge(&Graph::new(), &a), a);
        assert_eq!(merge(&a, &Graph::new()), a);
    }

    #[test]
    fn merge_is_associative() {
        let (a, b, c) = (sample_a(), sample_b(), sample_c());
        let left = merge(&merge(&a, &b), &c);
        let right = merge(&a, &merge(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn node_count_is_bounded_by_inputs() {
        let (a, b) = (sample_a(), sample_b());
        let merged = merge(&a, &b);
        assert!(merged.node_count() <= a.node_count() + b.node_count());
        // A, B, C shared by name: only D is new.
        assert_eq!(merged.node_count(), 4);

        let disjoint = Graph::from_triples([("P", "r", "Q")]);
        let merged = merge(&a, &disjoint);
        assert_eq!(merged.node_count(), a.node_count() + disjoint.node_count());
    }

    #[test]
    fn duplicate_edges_and_sentences_are_dropped() {
        let merged = merge(&sample_a(), &sample_b());
        assert_eq!(merged.edge_count(), 3);
        assert_eq!(merged.sentences(), &["A r B.".to_string(), "C r D.".to_string()]);
    }

    #[test]
    fn same_key_with_different_sentence_is_a_duplicate() {
        let mut a = Graph::new();
        a.add_fact("A", "r", "B", Some("first"));
        let mut b = Graph::new();
        b.add_fact("A", "r", "B", Some("second"));
        let merged = merge(&a, &b);
        assert_eq!(merged.edge_count(), 1);
        assert_eq!(merged.sentence_count(), 2);
        assert_eq!(merged.edges()[0].sentence, Some(0));
    }

    #[test]
    fn merge_all_folds_in_order() {
        let merged = merge_all([sample_b(), sample_a()]).unwrap();
        assert_eq!(merged.node(0).unwrap().name, "C");
        assert!(merge_all(Vec::<Graph>::new()).is_none());
        assert!(merge_all([Graph::new()]).is_none());
    }
}
