//! Bounded multi-hop subgraph extraction.
//!
//! Each hop scans every edge of the static graph and pulls in the edges whose
//! source or target name matches a frontier term. The next frontier is made of
//! accumulator node names that have not been expanded yet, capped so that a
//! dense neighbourhood cannot blow up the following hop.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::matcher::{normalize_term, Matcher};
use super::merge::merge_all;
use super::Graph;

/// Default number of hops.
pub const DEFAULT_DEPTH: usize = 1;

/// Default maximum frontier size per hop.
pub const DEFAULT_FRONTIER_CAP: usize = 10;

/// Tunables for a subgraph search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of hops; values below 1 are treated as 1.
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Maximum number of names expanded per hop after the first.
    #[serde(default = "default_frontier_cap")]
    pub frontier_cap: usize,
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_frontier_cap() -> usize {
    DEFAULT_FRONTIER_CAP
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            frontier_cap: DEFAULT_FRONTIER_CAP,
        }
    }
}

/// Multi-hop search over a read-only graph.
///
/// Holds no mutable state: every call builds (or extends) the accumulator it
/// is given, so one instance can serve concurrent callers.
#[derive(Debug, Clone, Copy)]
pub struct SubgraphSearch<'a> {
    graph: &'a Graph,
    matcher: &'a dyn Matcher,
    frontier_cap: usize,
}

impl<'a> SubgraphSearch<'a> {
    pub fn new(graph: &'a Graph, matcher: &'a dyn Matcher) -> Self {
        Self {
            graph,
            matcher,
            frontier_cap: DEFAULT_FRONTIER_CAP,
        }
    }

    /// Set the frontier cap (minimum 1).
    pub fn with_frontier_cap(mut self, cap: usize) -> Self {
        self.frontier_cap = cap.max(1);
        self
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// Search from `terms` for up to `depth` hops.
    ///
    /// Matches are added to `accumulator` (or a fresh graph) with node, edge
    /// and sentence deduplication. Stops early when a hop adds no node.
    /// Returns `None` if the accumulator is still empty afterwards.
    pub fn search<S: AsRef<str>>(
        &self,
        terms: &[S],
        depth: usize,
        accumulator: Option<Graph>,
    ) -> Option<Graph> {
        let mut acc = accumulator.unwrap_or_default();
        let mut expanded: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref().trim();
            if !term.is_empty() && expanded.insert(term.to_string()) {
                frontier.push(term.to_string());
            }
        }

        for hop in 1..=depth.max(1) {
            if frontier.is_empty() {
                break;
            }
            let nodes_before = acc.node_count();
            let new_edges = self.expand(&frontier, &mut acc);
            let new_nodes = acc.node_count() - nodes_before;
            tracing::debug!(
                hop,
                frontier = frontier.len(),
                new_nodes,
                new_edges,
                "subgraph search hop"
            );
            if new_nodes == 0 {
                break;
            }

            frontier = acc
                .node_names()
                .filter(|name| !expanded.contains(*name))
                .take(self.frontier_cap)
                .map(str::to_string)
                .collect();
            expanded.extend(frontier.iter().cloned());
        }

        if acc.is_empty() { None } else { Some(acc) }
    }

    /// One hop: copy every edge touching a frontier term into `acc`.
    ///
    /// Terms are normalised once per hop and node names once per graph.
    fn expand(&self, frontier: &[String], acc: &mut Graph) -> usize {
        let terms: Vec<String> = frontier
            .iter()
            .map(|t| normalize_term(t))
            .filter(|t| !t.is_empty())
            .collect();
        let names = self.graph.normalized_names();
        let mut added = 0;
        for edge in self.graph.edges() {
            let (Some(source), Some(target)) =
                (self.graph.node(edge.source), self.graph.node(edge.target))
            else {
                continue;
            };
            let (source_name, target_name) = (&names[edge.source], &names[edge.target]);
            let hit = terms.iter().any(|term| {
                self.matcher.matches_normalized(term, source_name)
                    || self.matcher.matches_normalized(term, target_name)
            });
            if !hit {
                continue;
            }

            let (s, _) = acc.add_node(source);
            let (t, _) = acc.add_node(target);
            let sentence = edge
                .sentence
                .and_then(|idx| self.graph.sentence(idx))
                .map(|text| acc.add_sentence(text));
            if acc.add_edge(s, t, &edge.relation, sentence) {
                added += 1;
            }
        }
        added
    }

    /// One independent search per entity, run in parallel.
    ///
    /// Results come back in entity order regardless of scheduling.
    pub fn search_each<S: AsRef<str> + Sync>(&self, entities: &[S], depth: usize) -> Vec<Option<Graph>> {
        entities
            .par_iter()
            .map(|entity| self.search(&[entity.as_ref()], depth, None))
            .collect()
    }

    /// Search each entity separately, then fold the results in entity order.
    pub fn search_merged<S: AsRef<str> + Sync>(&self, entities: &[S], depth: usize) -> Option<Graph> {
        merge_all(self.search_each(entities, depth).into_iter().flatten())
    }
}
