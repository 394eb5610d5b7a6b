//! Read-only store for the static knowledge graph.
//!
//! The graph is loaded once from its JSON export and never mutated. Every
//! edge is validated at load time: an edge whose source, target or sentence
//! does not resolve is dropped with a warning instead of failing the load.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, StoreError, StoreResult};

use super::{Category, Edge, Graph, Node, NodeId, SentenceId};

/// An index as it appears in the export: a JSON integer or an integer string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawIndex {
    Int(i64),
    Text(String),
}

impl RawIndex {
    /// The integer value, if this is (or spells) one.
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for RawIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

/// A link as it appears in the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLink {
    pub source: RawIndex,
    pub target: RawIndex,
    /// Relation label.
    #[serde(default)]
    pub name: String,
    /// Supporting sentence index; negative or absent means none.
    #[serde(default)]
    pub sent: Option<RawIndex>,
}

/// The `sents` field: exports disagree on whether it is a list or a map
/// keyed by string-encoded index. Both are accepted and normalised to a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SentenceTable {
    List(Vec<String>),
    Keyed(BTreeMap<String, String>),
}

impl Default for SentenceTable {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

/// The on-disk graph document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<RawLink>,
    #[serde(default)]
    pub sents: SentenceTable,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// What validation did to the document while loading it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub nodes: usize,
    pub edges: usize,
    pub sentences: usize,
    /// Edges dropped for unresolvable indices.
    pub dropped_edges: usize,
    /// Nodes whose declared id disagreed with their position.
    pub renumbered_nodes: usize,
    /// Keys of a keyed `sents` map that were not integers.
    pub ignored_sentence_keys: usize,
    /// Nodes whose name repeated an earlier node's; collapsed onto the first.
    pub duplicate_nodes: usize,
    /// Sentences whose text repeated an earlier one.
    pub duplicate_sentences: usize,
    /// Categories listed more than once.
    pub duplicate_categories: usize,
    /// Edges dropped because their key repeated after node collapsing.
    pub duplicate_edges: usize,
}

/// Resolves raw `sent` values to positions in the normalised sentence list.
enum SentenceLookup {
    Dense(usize),
    Keyed(HashMap<i64, usize>),
}

impl SentenceLookup {
    fn resolve(&self, raw: i64) -> Result<Option<usize>, String> {
        if raw < 0 {
            return Ok(None);
        }
        match self {
            Self::Dense(len) => {
                let idx = raw as usize;
                if idx < *len {
                    Ok(Some(idx))
                } else {
                    Err(format!("sentence {raw} out of range ({len} sentences)"))
                }
            }
            Self::Keyed(map) => map
                .get(&raw)
                .copied()
                .map(Some)
                .ok_or_else(|| format!("sentence key {raw} not present")),
        }
    }
}

fn normalize_sentences(table: SentenceTable, report: &mut LoadReport) -> (Vec<String>, SentenceLookup) {
    match table {
        SentenceTable::List(list) => {
            let len = list.len();
            (list, SentenceLookup::Dense(len))
        }
        SentenceTable::Keyed(map) => {
            let mut keyed: Vec<(i64, String)> = Vec::with_capacity(map.len());
            for (key, text) in map {
                match key.trim().parse::<i64>() {
                    Ok(k) if k >= 0 => keyed.push((k, text)),
                    _ => {
                        let err = GraphError::SentenceKey { key };
                        tracing::warn!(error = %err, "skipping sentence");
                        report.ignored_sentence_keys += 1;
                    }
                }
            }
            keyed.sort_by_key(|(k, _)| *k);
            let mut lookup = HashMap::with_capacity(keyed.len());
            let mut list = Vec::with_capacity(keyed.len());
            for (pos, (key, text)) in keyed.into_iter().enumerate() {
                lookup.insert(key, pos);
                list.push(text);
            }
            (list, SentenceLookup::Keyed(lookup))
        }
    }
}

fn resolve_node(raw: &RawIndex, node_count: usize, role: &str) -> Result<usize, String> {
    let value = raw
        .value()
        .ok_or_else(|| format!("{role} {raw} is not an index"))?;
    if value < 0 || value as usize >= node_count {
        return Err(format!("{role} {value} out of range ({node_count} nodes)"));
    }
    Ok(value as usize)
}

fn validate_link(
    link: &RawLink,
    node_count: usize,
    sentences: &SentenceLookup,
) -> Result<Edge, String> {
    let source = resolve_node(&link.source, node_count, "source")?;
    let target = resolve_node(&link.target, node_count, "target")?;
    let sentence = match &link.sent {
        None => None,
        Some(raw) => {
            let value = raw
                .value()
                .ok_or_else(|| format!("sentence {raw} is not an index"))?;
            sentences.resolve(value)?
        }
    };
    Ok(Edge {
        source,
        target,
        relation: link.name.clone(),
        sentence,
    })
}

/// The loaded, validated, immutable knowledge graph.
///
/// Shared freely across threads; nothing here mutates after construction.
/// A reload builds a new `GraphStore` and replaces the old one wholesale.
#[derive(Debug, Clone)]
pub struct GraphStore {
    graph: Graph,
    source: Option<PathBuf>,
    report: LoadReport,
}

impl GraphStore {
    /// Load and validate a graph export from disk.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let data = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    path: shown.clone(),
                }
            } else {
                StoreError::Io {
                    path: shown.clone(),
                    source,
                }
            }
        })?;
        let doc: GraphDocument = serde_json::from_str(&data).map_err(|source| StoreError::Parse {
            path: shown.clone(),
            source,
        })?;

        let mut store = Self::from_document(doc);
        store.source = Some(path.to_path_buf());
        tracing::info!(
            path = %path.display(),
            nodes = store.report.nodes,
            edges = store.report.edges,
            sentences = store.report.sentences,
            dropped_edges = store.report.dropped_edges,
            "knowledge graph loaded"
        );
        Ok(store)
    }

    /// Parse and validate a graph document held in memory.
    pub fn from_json_str(json: &str) -> StoreResult<Self> {
        let doc: GraphDocument = serde_json::from_str(json).map_err(|source| StoreError::Parse {
            path: "<memory>".into(),
            source,
        })?;
        Ok(Self::from_document(doc))
    }

    /// Validate a parsed document, dropping edges that do not resolve.
    ///
    /// Repeated node names, sentence texts and categories collapse onto their
    /// first occurrence and edges are remapped onto the survivors. An edge
    /// whose remapped `(source, target, relation)` key is already present is
    /// dropped, so the loaded graph holds the same invariants as one built
    /// through the [`Graph`] API.
    pub fn from_document(doc: GraphDocument) -> Self {
        let mut report = LoadReport::default();
        let (sentences, lookup) = normalize_sentences(doc.sents, &mut report);

        let mut categories: Vec<Category> = Vec::with_capacity(doc.categories.len());
        let category_map: Vec<i64> = doc
            .categories
            .into_iter()
            .map(|category| match categories.iter().position(|c| *c == category) {
                Some(first) => {
                    report.duplicate_categories += 1;
                    first as i64
                }
                None => {
                    categories.push(category);
                    (categories.len() - 1) as i64
                }
            })
            .collect();

        let mut graph = Graph::new();
        let node_map: Vec<NodeId> = doc
            .nodes
            .iter()
            .enumerate()
            .map(|(pos, node)| {
                if node.id != pos {
                    report.renumbered_nodes += 1;
                }
                let mut node = node.clone();
                if let Some(&first) = usize::try_from(node.category)
                    .ok()
                    .and_then(|c| category_map.get(c))
                {
                    node.category = first;
                }
                let (id, added) = graph.add_node(&node);
                if !added {
                    tracing::debug!(name = %node.name, position = pos, first = id, "duplicate node name collapsed");
                    report.duplicate_nodes += 1;
                }
                id
            })
            .collect();

        let sentence_map: Vec<SentenceId> = sentences
            .iter()
            .map(|text| {
                let before = graph.sentence_count();
                let id = graph.add_sentence(text);
                if graph.sentence_count() == before {
                    report.duplicate_sentences += 1;
                }
                id
            })
            .collect();

        for (index, link) in doc.links.iter().enumerate() {
            let edge = match validate_link(link, node_map.len(), &lookup) {
                Ok(edge) => edge,
                Err(reason) => {
                    let err = GraphError::MalformedEdge { index, reason };
                    tracing::warn!(error = %err, "malformed edge");
                    report.dropped_edges += 1;
                    continue;
                }
            };
            let source = node_map[edge.source];
            let target = node_map[edge.target];
            let sentence = edge.sentence.map(|s| sentence_map[s]);
            if !graph.add_edge(source, target, &edge.relation, sentence) {
                let name = |id: NodeId| graph.node(id).map(|n| n.name.clone()).unwrap_or_default();
                let err = GraphError::DuplicateEdge {
                    index,
                    source_name: name(source),
                    relation: edge.relation.clone(),
                    target_name: name(target),
                };
                tracing::warn!(error = %err, "duplicate edge");
                report.duplicate_edges += 1;
            }
        }
        graph.set_categories(categories);

        report.nodes = graph.node_count();
        report.edges = graph.edge_count();
        report.sentences = graph.sentence_count();

        Self {
            graph,
            source: None,
            report,
        }
    }

    /// Wrap an already-built graph.
    pub fn from_graph(graph: Graph) -> Self {
        let report = LoadReport {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            sentences: graph.sentence_count(),
            ..Default::default()
        };
        Self {
            graph,
            source: None,
            report,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The file this store was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::merge::merge;

    const LIST_DOC: &str = r#"{
        "nodes": [
            {"id": 0, "name": "CCUS", "category": 0, "symbolSize": 8},
            {"id": 1, "name": "碳捕集", "category": 1, "symbolSize": 8},
            {"id": 2, "name": "地质储存", "category": 1, "symbolSize": 8}
        ],
        "links": [
            {"source": 0, "target": 1, "name": "包括", "sent": 0},
            {"source": "1", "target": "2", "name": "配套", "sent": 1},
            {"source": 0, "target": 2, "name": "包括", "sent": -1}
        ],
        "sents": ["CCUS包括碳捕集。", "碳捕集与地质储存配套。"],
        "categories": [{"name": "技术"}, {"name": "环节"}]
    }"#;

    #[test]
    fn loads_list_sentences() {
        let store = GraphStore::from_json_str(LIST_DOC).unwrap();
        let g = store.graph();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.sentence_count(), 2);
        assert_eq!(g.edges()[1].source, 1);
        assert_eq!(g.edges()[1].sentence, Some(1));
        assert_eq!(g.edges()[2].sentence, None);
        assert_eq!(g.categories().len(), 2);
        assert_eq!(store.report().dropped_edges, 0);
    }

    #[test]
    fn keyed_sentences_are_normalised_and_remapped() {
        let doc = r#"{
            "nodes": [{"id": 0, "name": "A"}, {"id": 1, "name": "B"}, {"id": 2, "name": "C"}],
            "links": [
                {"source": 0, "target": 1, "name": "r", "sent": 10},
                {"source": 1, "target": 2, "name": "r", "sent": "3"}
            ],
            "sents": {"10": "ten", "3": "three", "x": "bogus"}
        }"#;
        let store = GraphStore::from_json_str(doc).unwrap();
        let g = store.graph();
        assert_eq!(g.sentences(), &["three".to_string(), "ten".to_string()]);
        assert_eq!(g.sentence(g.edges()[0].sentence.unwrap()), Some("ten"));
        assert_eq!(g.sentence(g.edges()[1].sentence.unwrap()), Some("three"));
        assert_eq!(store.report().ignored_sentence_keys, 1);
    }

    #[test]
    fn malformed_edges_are_dropped_not_fatal() {
        let doc = r#"{
            "nodes": [{"id": 0, "name": "A"}, {"id": 1, "name": "B"}],
            "links": [
                {"source": 0, "target": 1, "name": "ok", "sent": 0},
                {"source": 0, "target": 5, "name": "bad-target"},
                {"source": -1, "target": 1, "name": "bad-source"},
                {"source": 0, "target": 1, "name": "bad-sent", "sent": 9},
                {"source": "zero", "target": 1, "name": "not-an-index"}
            ],
            "sents": ["A ok B."]
        }"#;
        let store = GraphStore::from_json_str(doc).unwrap();
        assert_eq!(store.graph().edge_count(), 1);
        assert_eq!(store.graph().edges()[0].relation, "ok");
        assert_eq!(store.report().dropped_edges, 4);
    }

    #[test]
    fn node_ids_are_normalised_to_positions() {
        let doc = r#"{"nodes": [{"id": 7, "name": "A"}, {"name": "B"}], "links": [], "sents": []}"#;
        let store = GraphStore::from_json_str(doc).unwrap();
        assert_eq!(store.graph().node(0).unwrap().id, 0);
        assert_eq!(store.graph().node(1).unwrap().id, 1);
        assert_eq!(store.report().renumbered_nodes, 2);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = GraphStore::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{ nodes: oops").unwrap();
        let err = GraphStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn load_records_source_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, LIST_DOC).unwrap();
        let store = GraphStore::load(&path).unwrap();
        assert_eq!(store.source(), Some(path.as_path()));
        assert_eq!(store.report().nodes, 3);
        assert_eq!(store.report().edges, 3);
    }

    #[test]
    fn duplicate_names_collapse_onto_first_node() {
        let doc = r#"{
            "nodes": [{"id": 0, "name": "A"}, {"id": 1, "name": "A"}, {"id": 2, "name": "B"}],
            "links": [
                {"source": 1, "target": 2, "name": "r"},
                {"source": 0, "target": 2, "name": "r"},
                {"source": 1, "target": 2, "name": "q"}
            ],
            "sents": []
        }"#;
        let store = GraphStore::from_json_str(doc).unwrap();
        let g = store.graph();
        assert_eq!(g.node_names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(g.node(1).unwrap().id, 1);
        assert_eq!(g.edge_count(), 2);
        assert!(g.has_edge(0, 1, "r"));
        assert!(g.has_edge(0, 1, "q"));

        let report = store.report();
        assert_eq!(report.nodes, 2);
        assert_eq!(report.edges, 2);
        assert_eq!(report.duplicate_nodes, 1);
        assert_eq!(report.duplicate_edges, 1);
        assert_eq!(report.dropped_edges, 0);
    }

    #[test]
    fn duplicate_sentences_and_categories_are_remapped() {
        let doc = r#"{
            "nodes": [
                {"name": "A", "category": 2},
                {"name": "B", "category": 1},
                {"name": "C", "category": 0}
            ],
            "links": [
                {"source": 0, "target": 1, "name": "r", "sent": 2},
                {"source": 1, "target": 2, "name": "r", "sent": 1}
            ],
            "sents": ["s0", "s1", "s0"],
            "categories": [{"name": "x"}, {"name": "y"}, {"name": "x"}]
        }"#;
        let store = GraphStore::from_json_str(doc).unwrap();
        let g = store.graph();
        assert_eq!(g.sentences(), &["s0".to_string(), "s1".to_string()]);
        assert_eq!(g.edges()[0].sentence, Some(0));
        assert_eq!(g.edges()[1].sentence, Some(1));
        assert_eq!(g.categories().len(), 2);
        assert_eq!(g.node(0).unwrap().category, 0);
        assert_eq!(g.node(1).unwrap().category, 1);
        assert_eq!(store.report().duplicate_sentences, 1);
        assert_eq!(store.report().duplicate_categories, 1);
    }

    #[test]
    fn loaded_graph_with_repeats_keeps_merge_laws() {
        let doc = r#"{
            "nodes": [{"name": "A"}, {"name": "A"}, {"name": "B"}],
            "links": [
                {"source": 1, "target": 2, "name": "r", "sent": 1},
                {"source": 0, "target": 2, "name": "r", "sent": 0}
            ],
            "sents": ["A r B.", "A r B."],
            "categories": [{"name": "x"}, {"name": "x"}]
        }"#;
        let store = GraphStore::from_json_str(doc).unwrap();
        let g = store.graph();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(merge(g, g), *g);
        assert_eq!(merge(&Graph::new(), g), *g);
        assert_eq!(GraphStore::from_document(g.to_document()).graph(), g);
    }

    #[test]
    fn document_round_trips_through_store() {
        let store = GraphStore::from_json_str(LIST_DOC).unwrap();
        let json = serde_json::to_string(&store.graph().to_document()).unwrap();
        let again = GraphStore::from_json_str(&json).unwrap();
        assert_eq!(store.graph(), again.graph());
    }
}
