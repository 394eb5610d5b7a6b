//! Engine facade: top-level API for kg-fusion.
//!
//! The `Engine` owns the loaded graph, the matcher, the summariser and the
//! session registry, and runs one retrieval turn end to end:
//! per-entity search → merge → summaries → conversation update.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::conversation::ConversationSummary;
use crate::error::{ConfigError, FusionResult};
use crate::graph::facts::{self, EntityDetails};
use crate::graph::matcher::Matcher;
use crate::graph::merge::merge_all;
use crate::graph::search::SubgraphSearch;
use crate::graph::store::{GraphStore, LoadReport};
use crate::graph::{Graph, Triple};
use crate::session::SessionRegistry;
use crate::summarize::{truncate_chars, KnowledgeSummarizer};

/// What one entity contributed to a retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHit {
    pub entity: String,
    /// The entity's own subgraph, before merging.
    pub graph: Option<Graph>,
    /// Triples of `graph` that mention the entity.
    pub triples: Vec<Triple>,
    pub summary: String,
}

/// Result of searching the graph for a set of entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retrieval {
    /// Entities searched, trimmed and deduplicated, in input order.
    pub entities: Vec<String>,
    /// All per-entity subgraphs merged in entity order.
    pub graph: Option<Graph>,
    pub hits: Vec<EntityHit>,
    /// Union of the hits' triples, first occurrence kept.
    pub triples: Vec<Triple>,
    /// `"{entity}: {summary}"` parts joined with `"; "`, bounded.
    pub knowledge: String,
}

impl Retrieval {
    /// Whether nothing was found for any entity.
    pub fn is_empty(&self) -> bool {
        self.graph.is_none()
    }

    /// The merged graph, if it is small enough to render.
    pub fn display_graph(&self, cap: usize) -> Option<&Graph> {
        self.graph.as_ref().filter(|g| g.node_count() <= cap)
    }
}

/// Everything a front end needs to answer one user turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub retrieval: Retrieval,
    /// Lead-in computed from the session state before this turn.
    pub prefix: String,
    pub suggestions: Vec<String>,
    pub summary: Option<ConversationSummary>,
}

/// The kg-fusion retrieval engine.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: RwLock<Arc<GraphStore>>,
    matcher: Arc<dyn Matcher>,
    summarizer: KnowledgeSummarizer,
    sessions: SessionRegistry,
}

impl Engine {
    /// Create an engine over an already-loaded store.
    pub fn new(config: EngineConfig, store: GraphStore) -> Self {
        tracing::info!(
            nodes = store.graph().node_count(),
            edges = store.graph().edge_count(),
            depth = config.search.depth,
            frontier_cap = config.search.frontier_cap,
            "initializing kg-fusion engine"
        );
        let matcher = config.matcher();
        let summarizer = KnowledgeSummarizer::new(config.summary);
        let sessions = SessionRegistry::new(config.conversation, config.summary.phrasing);
        Self {
            config,
            store: RwLock::new(Arc::new(store)),
            matcher,
            summarizer,
            sessions,
        }
    }

    /// Validate the config and load the graph it points at.
    pub fn open(config: EngineConfig) -> FusionResult<Self> {
        config.validate()?;
        let path = config.graph_path.clone().ok_or_else(|| ConfigError::Invalid {
            message: "graph_path is not set; point it at the knowledge graph JSON".into(),
        })?;
        let store = GraphStore::load(&path)?;
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// The current store. Holds the lock only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<GraphStore> {
        Arc::clone(&self.store.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Reload from the file the current store came from (or `graph_path`).
    pub fn reload(&self) -> FusionResult<LoadReport> {
        let path: PathBuf = self
            .snapshot()
            .source()
            .map(Path::to_path_buf)
            .or_else(|| self.config.graph_path.clone())
            .ok_or_else(|| ConfigError::Invalid {
                message: "nothing to reload: the graph was not loaded from a file".into(),
            })?;
        self.reload_from(&path)
    }

    /// Load a new store and swap it in. On failure the old store stays.
    pub fn reload_from(&self, path: &Path) -> FusionResult<LoadReport> {
        let fresh = GraphStore::load(path)?;
        let report = fresh.report().clone();
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(fresh);
        tracing::info!(path = %path.display(), nodes = report.nodes, "knowledge graph reloaded");
        Ok(report)
    }

    /// One multi-hop search over all `terms` together.
    pub fn search<S: AsRef<str>>(&self, terms: &[S], depth: Option<usize>) -> Option<Graph> {
        let store = self.snapshot();
        let depth = depth.unwrap_or(self.config.search.depth);
        self.searcher(store.graph()).search(terms, depth, None)
    }

    /// Search each entity separately, then merge and summarise.
    ///
    /// Per-entity work runs in parallel; merging follows entity order.
    pub fn retrieve<S: AsRef<str>>(&self, entities: &[S]) -> Retrieval {
        let entities = dedup_entities(entities);
        if entities.is_empty() {
            return Retrieval::default();
        }
        let store = self.snapshot();
        let search = self.searcher(store.graph());
        let depth = self.config.search.depth;

        let hits: Vec<EntityHit> = entities
            .par_iter()
            .map(|entity| {
                let graph = search.search(&[entity.as_str()], depth, None);
                let (triples, summary) = match &graph {
                    Some(g) => (
                        facts::triples(g, Some(entity.as_str())),
                        self.summarizer.summarize(g, entity),
                    ),
                    None => (Vec::new(), String::new()),
                };
                EntityHit {
                    entity: entity.clone(),
                    graph,
                    triples,
                    summary,
                }
            })
            .collect();

        let graph = merge_all(hits.iter().filter_map(|h| h.graph.clone()));

        let mut triples: Vec<Triple> = Vec::new();
        for t in hits.iter().flat_map(|h| &h.triples) {
            if !triples.contains(t) {
                triples.push(t.clone());
            }
        }

        let knowledge = hits
            .iter()
            .filter(|h| !h.summary.is_empty())
            .map(|h| format!("{}: {}", h.entity, h.summary))
            .collect::<Vec<_>>()
            .join("; ");
        let knowledge = truncate_chars(&knowledge, self.config.retrieval.knowledge_chars).to_string();

        tracing::debug!(
            entities = entities.len(),
            found = hits.iter().filter(|h| h.graph.is_some()).count(),
            triples = triples.len(),
            "retrieval complete"
        );

        Retrieval {
            entities,
            graph,
            hits,
            triples,
            knowledge,
        }
    }

    /// Run one conversational turn for `session_id`.
    pub fn turn<S: AsRef<str>>(&self, session_id: &str, query: &str, entities: &[S]) -> TurnOutcome {
        let retrieval = self.retrieve(entities);
        let (prefix, suggestions, summary) = self.sessions.with_session(session_id, |ctx| {
            let prefix = ctx.response_prefix();
            ctx.update(query, &retrieval.entities, retrieval.graph.as_ref());
            (prefix, ctx.suggestions(&retrieval.entities), ctx.summary())
        });
        TurnOutcome {
            retrieval,
            prefix,
            suggestions,
            summary,
        }
    }

    /// Search biased by the session's history plus `new_entities`.
    ///
    /// The session is locked only while its focus list is read; the search
    /// itself runs unlocked.
    pub fn focused_search<S: AsRef<str>>(&self, session_id: &str, new_entities: &[S]) -> Option<Graph> {
        let focus = self
            .sessions
            .with_session(session_id, |ctx| ctx.focus_entities(new_entities));
        if focus.is_empty() {
            return None;
        }
        let store = self.snapshot();
        self.searcher(store.graph())
            .search_merged(&focus, self.config.search.depth)
    }

    /// Summarise `graph` around `entity` (configured budget unless given).
    pub fn summarize(&self, graph: &Graph, entity: &str, max_chars: Option<usize>) -> String {
        let max_chars = max_chars.unwrap_or(self.config.summary.max_chars);
        self.summarizer.summarize_within(graph, entity, max_chars)
    }

    /// Triples of the whole graph, optionally filtered by entity.
    pub fn triples(&self, entity: Option<&str>) -> Vec<Triple> {
        facts::triples(self.snapshot().graph(), entity)
    }

    /// Relationship details for `entity`, read from its own subgraph.
    pub fn details(&self, entity: &str) -> Option<EntityDetails> {
        let graph = self.search(&[entity], None)?;
        facts::entity_details(&graph, entity)
    }

    /// End a session. Returns whether it existed.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.end(session_id)
    }

    /// Get system info (graph size, load report, sessions).
    pub fn info(&self) -> EngineInfo {
        let store = self.snapshot();
        let graph = store.graph();
        EngineInfo {
            source: store.source().map(Path::to_path_buf),
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            sentence_count: graph.sentence_count(),
            category_count: graph.categories().len(),
            dropped_edges: store.report().dropped_edges,
            session_count: self.sessions.len(),
        }
    }

    fn searcher<'a>(&'a self, graph: &'a Graph) -> SubgraphSearch<'a> {
        SubgraphSearch::new(graph, self.matcher.as_ref())
            .with_frontier_cap(self.config.search.frontier_cap)
    }
}

fn dedup_entities<S: AsRef<str>>(entities: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(entities.len());
    for e in entities {
        let e = e.as_ref().trim();
        if !e.is_empty() && !out.iter().any(|o| o == e) {
            out.push(e.to_string());
        }
    }
    out
}

/// Summary information about the engine state.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub source: Option<PathBuf>,
    pub node_count: usize,
    pub edge_count: usize,
    pub sentence_count: usize,
    pub category_count: usize,
    pub dropped_edges: usize,
    pub session_count: usize,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "kg-fusion engine info")?;
        match &self.source {
            Some(path) => writeln!(f, "  source:       {}", path.display())?,
            None => writeln!(f, "  source:       <memory>")?,
        }
        writeln!(f, "  nodes:        {}", self.node_count)?;
        writeln!(f, "  edges:        {}", self.edge_count)?;
        writeln!(f, "  sentences:    {}", self.sentence_count)?;
        writeln!(f, "  categories:   {}", self.category_count)?;
        writeln!(f, "  dropped:      {}", self.dropped_edges)?;
        writeln!(f, "  sessions:     {}", self.session_count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FusionError, StoreError};

    fn fire_graph() -> Graph {
        let mut g = Graph::new();
        g.add_fact("干粉灭火器", "适用于", "电气火灾", Some("干粉灭火器可扑灭电气火灾。"));
        g.add_fact("干粉灭火器", "成分", "磷酸铵盐", None);
        g.add_fact("潜水", "需要", "氧气瓶", Some("潜水需要氧气瓶。"));
        g.add_fact("CO2", "储存于", "地质构造", None);
        g
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default(), GraphStore::from_graph(fire_graph()))
    }

    #[test]
    fn retrieve_merges_in_entity_order() {
        let engine = engine();
        let r = engine.retrieve(&["潜水", "干粉灭火器", "潜水", " "]);
        assert_eq!(r.entities, vec!["潜水", "干粉灭火器"]);
        assert_eq!(r.hits.len(), 2);

        let merged = r.graph.as_ref().unwrap();
        assert_eq!(merged.node(0).unwrap().name, "潜水");
        assert_eq!(merged.node_count(), 5);
        assert_eq!(r.triples.len(), 3);
        assert!(r.knowledge.starts_with("潜水: "));
        assert!(r.knowledge.contains("; 干粉灭火器: "));
        assert!(r.knowledge.chars().count() <= 300);
    }

    #[test]
    fn retrieve_with_no_match_is_empty() {
        let engine = engine();
        let r = engine.retrieve(&["风能"]);
        assert!(r.is_empty());
        assert_eq!(r.hits[0].graph, None);
        assert!(r.knowledge.is_empty());
        assert!(engine.retrieve::<&str>(&[]).is_empty());
    }

    #[test]
    fn synonyms_reach_alternate_names() {
        let engine = engine();
        let r = engine.retrieve(&["二氧化碳"]);
        assert!(r.graph.unwrap().contains_node("CO2"));
    }

    #[test]
    fn display_graph_respects_cap() {
        let r = engine().retrieve(&["干粉灭火器"]);
        assert!(r.display_graph(50).is_some());
        assert!(r.display_graph(2).is_none());
    }

    #[test]
    fn turn_updates_only_its_own_session() {
        let engine = engine();
        let first = engine.turn("s1", "干粉灭火器是什么", &["干粉灭火器"]);
        assert_eq!(first.prefix, "");
        assert_eq!(first.suggestions.len(), 3);
        assert_eq!(first.summary.as_ref().unwrap().total_entities, 1);

        let second = engine.turn("s1", "干粉灭火器怎么用", &["干粉灭火器"]);
        assert_eq!(second.summary.unwrap().top_entities[0].1, 2);

        let third = engine.turn("s1", "继续", &["潜水"]);
        assert_eq!(third.prefix, "Continuing with 干粉灭火器, ");

        let other = engine.turn("s2", "潜水", &["潜水"]);
        assert_eq!(other.prefix, "");
        assert_eq!(other.summary.unwrap().total_entities, 1);
        assert_eq!(engine.sessions().len(), 2);
        assert!(engine.end_session("s2"));
    }

    #[test]
    fn focused_search_uses_history() {
        let engine = engine();
        engine.turn("s", "q", &["潜水"]);
        let g = engine.focused_search("s", &["干粉灭火器"]).unwrap();
        assert_eq!(g.node(0).unwrap().name, "干粉灭火器");
        assert!(g.contains_node("氧气瓶"));
    }

    #[test]
    fn focused_search_matches_search_over_focus_list() {
        let engine = engine();
        engine.turn("s", "q", &["潜水"]);
        engine.turn("s", "q", &["电气火灾"]);
        let focus = engine
            .sessions()
            .with_session("s", |ctx| ctx.focus_entities(&["干粉灭火器"]));
        assert_eq!(focus, vec!["干粉灭火器", "电气火灾", "潜水"]);
        let store = engine.snapshot();
        let expected = engine.searcher(store.graph()).search_merged(&focus, 1);
        assert!(expected.is_some());
        assert_eq!(engine.focused_search("s", &["干粉灭火器"]), expected);
        assert!(engine.focused_search("empty", &[] as &[&str]).is_none());
    }

    #[test]
    fn focused_searches_run_alongside_other_sessions() {
        let engine = engine();
        std::thread::scope(|scope| {
            for i in 0..8 {
                let engine = &engine;
                scope.spawn(move || {
                    let id = format!("s{i}");
                    for _ in 0..20 {
                        engine.turn(&id, "what is it", &["潜水"]);
                        assert!(engine.focused_search(&id, &["干粉灭火器"]).is_some());
                    }
                });
            }
        });
        assert_eq!(engine.sessions().len(), 8);
    }

    #[test]
    fn details_and_triples() {
        let engine = engine();
        let details = engine.details("干粉灭火器").unwrap();
        assert_eq!(details.total_connections, 2);
        assert_eq!(engine.triples(None).len(), 4);
        assert_eq!(engine.triples(Some("潜水")).len(), 1);
        assert!(engine.details("风能").is_none());
    }

    #[test]
    fn reload_without_source_is_a_config_error() {
        let err = engine().reload().unwrap_err();
        assert!(matches!(err, FusionError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn failed_reload_keeps_the_old_graph() {
        let engine = engine();
        let err = engine
            .reload_from(Path::new("/nonexistent/data.json"))
            .unwrap_err();
        assert!(matches!(err, FusionError::Store(StoreError::NotFound { .. })));
        assert_eq!(engine.info().node_count, 7);
    }

    #[test]
    fn open_requires_graph_path() {
        let err = Engine::open(EngineConfig::default()).unwrap_err();
        assert!(matches!(err, FusionError::Config(_)));
    }

    #[test]
    fn info_display() {
        let text = engine().info().to_string();
        assert!(text.contains("kg-fusion engine info"));
        assert!(text.contains("<memory>"));
    }
}
