//! Per-session conversation state.
//!
//! A [`ConversationContext`] remembers which entities a session has talked
//! about, how many turns mentioned each, and what kind of question was asked
//! last. It never fails: missing data yields empty results or `None`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::matcher::contains_normalized;
use crate::graph::search::SubgraphSearch;
use crate::graph::Graph;
use crate::summarize::Phrasing;

// ── Topic ────────────────────────────────────────────────────────────────

/// Question category of the latest query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Definition,
    Enumeration,
    Procedure,
    Explanation,
    Relationship,
    Elaboration,
    #[default]
    General,
}

/// Keyword table in priority order. First hit wins.
///
/// ASCII keywords only match whole words; CJK keywords match anywhere.
const TOPIC_KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::Definition,
        &["是什么", "什么是", "介绍", "定义", "what is", "what's", "define", "definition", "introduce"],
    ),
    (
        Topic::Enumeration,
        &[
            "有哪些", "包括", "种类", "类型", "which", "what kinds", "types of", "include", "includes",
            "list",
        ],
    ),
    (
        Topic::Procedure,
        &[
            "如何", "怎么", "方法", "步骤", "how to", "how do", "how does", "steps", "method", "methods",
        ],
    ),
    (
        Topic::Explanation,
        &["为什么", "原因", "作用", "目的", "why", "reason", "reasons", "purpose"],
    ),
    (
        Topic::Relationship,
        &[
            "关系", "联系", "相关", "区别", "relation", "relationship", "related", "difference",
            "compare", "comparison",
        ],
    ),
    (
        Topic::Elaboration,
        &["更多", "详细", "具体", "进一步", "more", "detail", "details", "further", "elaborate"],
    ),
];

/// Whether `keyword` occurs in the lowercased `query`.
fn mentions_keyword(query: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return query.contains(keyword);
    }
    query.match_indices(keyword).any(|(start, _)| {
        let before = query[..start].chars().next_back();
        let after = query[start + keyword.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric()) && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

impl Topic {
    /// Classify a raw query by keyword priority.
    pub fn classify(query: &str) -> Self {
        let query = query.to_lowercase();
        TOPIC_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| mentions_keyword(&query, w)))
            .map_or(Self::General, |(topic, _)| *topic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Enumeration => "enumeration",
            Self::Procedure => "procedure",
            Self::Explanation => "explanation",
            Self::Relationship => "relationship",
            Self::Elaboration => "elaboration",
            Self::General => "general",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "definition" | "define" => Some(Self::Definition),
            "enumeration" | "list" => Some(Self::Enumeration),
            "procedure" | "howto" => Some(Self::Procedure),
            "explanation" | "why" => Some(Self::Explanation),
            "relationship" | "relation" => Some(Self::Relationship),
            "elaboration" | "more" => Some(Self::Elaboration),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Suggestions ──────────────────────────────────────────────────────────

/// Topical family of an entity, chosen by keyword membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SuggestionFamily {
    FireSafety,
    Diving,
    CarbonCapture,
    General,
}

const FAMILY_KEYWORDS: &[(SuggestionFamily, &[&str])] = &[
    (SuggestionFamily::FireSafety, &["灭火器", "消防", "fire", "extinguisher"]),
    (SuggestionFamily::Diving, &["潜水", "潜艇", "diving", "submarine"]),
    (SuggestionFamily::CarbonCapture, &["碳", "ccus", "co2", "carbon"]),
];

impl SuggestionFamily {
    pub fn classify(entity: &str) -> Self {
        FAMILY_KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| contains_normalized(entity, w)))
            .map_or(Self::General, |(family, _)| *family)
    }

    /// Follow-up question templates; `{}` is replaced by the entity.
    fn templates(self, phrasing: Phrasing) -> &'static [&'static str] {
        match (self, phrasing) {
            (Self::FireSafety, Phrasing::Chinese) => &[
                "{}的工作原理是什么？",
                "{}有哪些类型？",
                "如何正确使用{}？",
                "{}的维护保养方法？",
            ],
            (Self::FireSafety, Phrasing::English) => &[
                "How does {} work?",
                "What types of {} are there?",
                "How should {} be used correctly?",
                "How is {} maintained?",
            ],
            (Self::Diving, Phrasing::Chinese) => &[
                "{}装备包括哪些？",
                "{}的安全注意事项？",
                "{}技术发展历程？",
                "{}在军事中的应用？",
            ],
            (Self::Diving, Phrasing::English) => &[
                "What equipment does {} involve?",
                "What safety precautions apply to {}?",
                "How has {} technology developed?",
                "How is {} used in military applications?",
            ],
            (Self::CarbonCapture, Phrasing::Chinese) => &[
                "{}的技术原理是什么？",
                "{}有哪些应用案例？",
                "{}面临哪些挑战？",
            ],
            (Self::CarbonCapture, Phrasing::English) => &[
                "What is the technical principle of {}?",
                "Where has {} been applied?",
                "What challenges does {} face?",
            ],
            (Self::General, Phrasing::Chinese) => &[
                "{}的详细介绍？",
                "{}的相关技术？",
                "{}的应用领域？",
            ],
            (Self::General, Phrasing::English) => &[
                "Can you tell me more about {}?",
                "Which technologies relate to {}?",
                "Where is {} applied?",
            ],
        }
    }
}

// ── Context ──────────────────────────────────────────────────────────────

/// Default number of entities fed to a focused search.
pub const DEFAULT_FOCUS_CAP: usize = 5;
/// Default length of the summary's top-entity list.
pub const DEFAULT_TOP_ENTITIES: usize = 3;
/// Default number of follow-up suggestions.
pub const DEFAULT_MAX_SUGGESTIONS: usize = 3;

/// Conversation tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationConfig {
    #[serde(default = "default_focus_cap")]
    pub focus_cap: usize,
    #[serde(default = "default_top_entities")]
    pub top_entities: usize,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

fn default_focus_cap() -> usize {
    DEFAULT_FOCUS_CAP
}

fn default_top_entities() -> usize {
    DEFAULT_TOP_ENTITIES
}

fn default_max_suggestions() -> usize {
    DEFAULT_MAX_SUGGESTIONS
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            focus_cap: DEFAULT_FOCUS_CAP,
            top_entities: DEFAULT_TOP_ENTITIES,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }
}

/// Snapshot of a session's entity history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub total_entities: usize,
    /// `(entity, turns mentioned)`, most mentioned first.
    pub top_entities: Vec<(String, usize)>,
    pub current_topic: Topic,
    pub entities: Vec<String>,
}

/// Entity history and topic state for one session.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    config: ConversationConfig,
    phrasing: Phrasing,
    /// Unique, in first-mention order.
    entities: Vec<String>,
    mentions: HashMap<String, usize>,
    last_query: String,
    current_topic: Topic,
    last_graph: Option<Graph>,
}

impl ConversationContext {
    pub fn new(config: ConversationConfig, phrasing: Phrasing) -> Self {
        Self {
            config,
            phrasing,
            ..Self::default()
        }
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Turns in which `entity` was mentioned; 0 if never.
    pub fn mention_count(&self, entity: &str) -> usize {
        self.mentions.get(entity).copied().unwrap_or(0)
    }

    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    pub fn current_topic(&self) -> Topic {
        self.current_topic
    }

    pub fn last_graph(&self) -> Option<&Graph> {
        self.last_graph.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Fold one turn into the session.
    ///
    /// Each distinct entity counts once per call. `graph` replaces the last
    /// graph only when present and non-empty.
    pub fn update<S: AsRef<str>>(&mut self, query: &str, entities: &[S], graph: Option<&Graph>) {
        let mut seen_this_turn: Vec<&str> = Vec::new();
        for entity in entities {
            let entity = entity.as_ref().trim();
            if entity.is_empty() || seen_this_turn.contains(&entity) {
                continue;
            }
            seen_this_turn.push(entity);
            match self.mentions.get_mut(entity) {
                Some(count) => *count += 1,
                None => {
                    self.entities.push(entity.to_string());
                    self.mentions.insert(entity.to_string(), 1);
                }
            }
        }

        if let Some(graph) = graph.filter(|g| !g.is_empty()) {
            self.last_graph = Some(graph.clone());
        }
        self.current_topic = Topic::classify(query);
        self.last_query = query.to_string();

        tracing::debug!(
            tracked = self.entities.len(),
            topic = %self.current_topic,
            "conversation context updated"
        );
    }

    /// Entities a focused search should use: `new_entities` first, then
    /// history from most recent to oldest, deduplicated and capped.
    pub fn focus_entities<S: AsRef<str>>(&self, new_entities: &[S]) -> Vec<String> {
        let mut focus: Vec<String> = Vec::new();
        let candidates = new_entities
            .iter()
            .map(|e| e.as_ref().trim())
            .chain(self.entities.iter().rev().map(String::as_str));
        for candidate in candidates {
            if focus.len() == self.config.focus_cap {
                break;
            }
            if !candidate.is_empty() && !focus.iter().any(|f| f == candidate) {
                focus.push(candidate.to_string());
            }
        }
        focus
    }

    /// Search for the focus entities and merge the results in focus order.
    pub fn focused_search<S: AsRef<str>>(
        &self,
        search: &SubgraphSearch<'_>,
        new_entities: &[S],
        depth: usize,
    ) -> Option<Graph> {
        let focus = self.focus_entities(new_entities);
        if focus.is_empty() {
            return None;
        }
        search.search_merged(&focus, depth)
    }

    /// Up to `max_suggestions` follow-up questions about the first entity.
    pub fn suggestions<S: AsRef<str>>(&self, entities: &[S]) -> Vec<String> {
        let Some(entity) = entities
            .iter()
            .map(|e| e.as_ref().trim())
            .find(|e| !e.is_empty())
        else {
            return Vec::new();
        };
        SuggestionFamily::classify(entity)
            .templates(self.phrasing)
            .iter()
            .take(self.config.max_suggestions)
            .map(|t| t.replace("{}", entity))
            .collect()
    }

    /// Entity statistics, or `None` before any entity was tracked.
    pub fn summary(&self) -> Option<ConversationSummary> {
        if self.entities.is_empty() {
            return None;
        }
        let mut ranked: Vec<(String, usize)> = self
            .entities
            .iter()
            .map(|e| (e.clone(), self.mention_count(e)))
            .collect();
        // Stable: ties keep first-mention order.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(self.config.top_entities);

        Some(ConversationSummary {
            total_entities: self.entities.len(),
            top_entities: ranked,
            current_topic: self.current_topic,
            entities: self.entities.clone(),
        })
    }

    /// Lead-in for the next answer based on what the session has covered.
    ///
    /// Elaboration questions continue from the last two entities; otherwise
    /// the first entity mentioned in more than one turn is picked up.
    pub fn response_prefix(&self) -> String {
        if self.entities.is_empty() {
            return String::new();
        }
        if self.current_topic == Topic::Elaboration {
            let start = self.entities.len().saturating_sub(2);
            let recent = self.entities[start..].join(", ");
            return match self.phrasing {
                Phrasing::Chinese => format!("基于前面讨论的{recent}，"),
                Phrasing::English => format!("Building on our discussion of {recent}, "),
            };
        }
        match self.entities.iter().find(|e| self.mention_count(e) > 1) {
            Some(repeated) => match self.phrasing {
                Phrasing::Chinese => format!("继续关于{repeated}的讨论，"),
                Phrasing::English => format!("Continuing with {repeated}, "),
            },
            None => String::new(),
        }
    }
}
