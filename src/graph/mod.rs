//! Knowledge graph data model.
//!
//! A [`Graph`] is an append-only arena of nodes, edges and supporting
//! sentences. Nodes are addressed by their position ([`NodeId`]) and
//! deduplicated by name; sentences are deduplicated by exact text; edges are
//! deduplicated by their `(source, target, relation)` key.
//!
//! - [`store`]: loading the static graph from its JSON export
//! - [`matcher`]: entity-name matching strategies
//! - [`search`]: bounded multi-hop subgraph extraction
//! - [`merge`]: deduplicating subgraph merge
//! - [`facts`]: triples and per-entity relationship details

pub mod facts;
pub mod matcher;
pub mod merge;
pub mod search;
pub mod store;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use self::matcher::normalize_term;
use self::store::{GraphDocument, RawIndex, RawLink, SentenceTable};

/// Position of a node in its owning graph.
pub type NodeId = usize;

/// Position of a sentence in its owning graph.
pub type SentenceId = usize;

/// Display size given to nodes created without one.
pub const DEFAULT_SYMBOL_SIZE: i64 = 8;

/// A named entity in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Dense index into the owning graph's node sequence.
    #[serde(default)]
    pub id: NodeId,
    /// Entity name. This, not `id`, is the identity used for deduplication.
    pub name: String,
    /// Category index into the graph's `categories`.
    #[serde(default)]
    pub category: i64,
    /// Rendering hint carried through from the export.
    #[serde(default = "default_symbol_size", rename = "symbolSize")]
    pub symbol_size: i64,
}

fn default_symbol_size() -> i64 {
    DEFAULT_SYMBOL_SIZE
}

impl Node {
    /// A node with default category and size. The id is assigned on insertion.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            category: 0,
            symbol_size: DEFAULT_SYMBOL_SIZE,
        }
    }
}

/// A directed, labelled relation between two nodes of the same graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub relation: String,
    /// Supporting sentence, if the export recorded one.
    pub sentence: Option<SentenceId>,
}

/// A node category as listed in the export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
}

/// A `(subject, relation, object)` fact derived from one edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub relation: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.relation, self.object)
    }
}

type EdgeKey = (NodeId, NodeId, String);

/// Nodes, edges and sentences with O(1) dedup lookups.
///
/// Every edge's `source`, `target` and `sentence` are valid indices into this
/// same graph; the mutation API refuses anything else.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    sentences: Vec<String>,
    categories: Vec<Category>,
    /// Node name → first node carrying that name.
    node_index: HashMap<String, NodeId>,
    /// Sentence text → first position of that text.
    sentence_index: HashMap<String, SentenceId>,
    edge_keys: HashSet<EdgeKey>,
    /// Node names through `normalize_term`, by id. Built on first use.
    normalized_names: OnceLock<Vec<String>>,
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.edges == other.edges
            && self.sentences == other.sentences
            && self.categories == other.categories
    }
}

impl Eq for Graph {}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(subject, relation, object)` name triples.
    pub fn from_triples<'a>(triples: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Self {
        let mut graph = Self::new();
        for (subject, relation, object) in triples {
            graph.add_fact(subject, relation, object, None);
        }
        graph
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    /// A graph with no nodes is empty, whatever else it holds.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn sentence(&self, id: SentenceId) -> Option<&str> {
        self.sentences.get(id).map(String::as_str)
    }

    /// Look up a node by exact name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.node_index.contains_key(name)
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Normalised node names, indexed by [`NodeId`].
    pub fn normalized_names(&self) -> &[String] {
        self.normalized_names
            .get_or_init(|| self.nodes.iter().map(|n| normalize_term(&n.name)).collect())
    }

    pub fn has_edge(&self, source: NodeId, target: NodeId, relation: &str) -> bool {
        self.edge_keys
            .contains(&(source, target, relation.to_string()))
    }

    /// Insert a node unless one with the same name exists.
    ///
    /// Returns the id the name resolves to and whether the node was new.
    /// A new node takes `id = node_count()`; the passed node's own id is
    /// ignored.
    pub fn add_node(&mut self, node: &Node) -> (NodeId, bool) {
        if let Some(&id) = self.node_index.get(&node.name) {
            return (id, false);
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            name: node.name.clone(),
            category: node.category,
            symbol_size: node.symbol_size,
        });
        self.node_index.insert(node.name.clone(), id);
        if let Some(names) = self.normalized_names.get_mut() {
            names.push(normalize_term(&node.name));
        }
        (id, true)
    }

    /// Insert a sentence unless the exact text exists, returning its index.
    pub fn add_sentence(&mut self, text: &str) -> SentenceId {
        if let Some(&id) = self.sentence_index.get(text) {
            return id;
        }
        let id = self.sentences.len();
        self.sentences.push(text.to_string());
        self.sentence_index.insert(text.to_string(), id);
        id
    }

    /// Append an edge unless its `(source, target, relation)` key exists.
    ///
    /// Returns `false` for duplicates and for edges whose indices do not
    /// resolve in this graph.
    pub fn add_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        relation: &str,
        sentence: Option<SentenceId>,
    ) -> bool {
        if source >= self.nodes.len() || target >= self.nodes.len() {
            return false;
        }
        if sentence.is_some_and(|s| s >= self.sentences.len()) {
            return false;
        }
        let key = (source, target, relation.to_string());
        if self.edge_keys.contains(&key) {
            return false;
        }
        self.edge_keys.insert(key);
        self.edges.push(Edge {
            source,
            target,
            relation: relation.to_string(),
            sentence,
        });
        true
    }

    /// Insert a subject/relation/object fact by name, creating nodes as needed.
    pub fn add_fact(
        &mut self,
        subject: &str,
        relation: &str,
        object: &str,
        sentence: Option<&str>,
    ) -> bool {
        let (source, _) = self.add_node(&Node::named(subject));
        let (target, _) = self.add_node(&Node::named(object));
        let sentence = sentence.map(|s| self.add_sentence(s));
        self.add_edge(source, target, relation, sentence)
    }

    /// Resolve an edge of this graph into a named triple.
    pub fn triple(&self, edge: &Edge) -> Option<Triple> {
        let subject = self.nodes.get(edge.source)?;
        let object = self.nodes.get(edge.target)?;
        Some(Triple::new(
            subject.name.clone(),
            edge.relation.clone(),
            object.name.clone(),
        ))
    }

    /// All triples, in edge order.
    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.edges.iter().filter_map(|e| self.triple(e))
    }

    /// Replace the category list.
    pub fn set_categories(&mut self, categories: Vec<Category>) {
        self.categories = categories;
    }

    /// Export in the on-disk document shape (`nodes`, `links`, `sents`, `categories`).
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.nodes.clone(),
            links: self
                .edges
                .iter()
                .map(|e| RawLink {
                    source: RawIndex::Int(e.source as i64),
                    target: RawIndex::Int(e.target as i64),
                    name: e.relation.clone(),
                    sent: Some(RawIndex::Int(e.sentence.map_or(-1, |s| s as i64))),
                })
                .collect(),
            sents: SentenceTable::List(self.sentences.clone()),
            categories: self.categories.clone(),
        }
    }
}
