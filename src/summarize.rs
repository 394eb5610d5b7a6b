//! Subgraph → bounded natural-language knowledge text.
//!
//! The summary has two parts: relation sentences built from the triples that
//! touch the focal entity (grouped by relation, large groups aggregated), then
//! numbered supporting sentences from the graph. The result is cut to a
//! character budget on a `char` boundary. Summarisation is a pure function of
//! its inputs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::facts::triples;
use crate::graph::{Graph, Triple};

/// Default character budget.
pub const DEFAULT_MAX_CHARS: usize = 300;

/// Default number of supporting sentences appended.
pub const DEFAULT_SUPPORTING_SENTENCES: usize = 5;

/// Relation groups larger than this are aggregated into one sentence.
pub const DEFAULT_PAIR_EXAMPLES: usize = 3;

/// How many names an aggregated sentence lists before "and others".
const AGGREGATE_NAMES: usize = 3;

/// Sentence templates used for relation sentences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phrasing {
    /// `"{subject} relates to {object} via {relation}."`
    #[default]
    #[serde(rename = "en")]
    English,
    /// `"{subject}与{object}的关系是{relation}"`
    #[serde(rename = "zh")]
    Chinese,
}

impl Phrasing {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Self::English),
            "zh" | "chinese" | "中文" => Some(Self::Chinese),
            _ => None,
        }
    }

    fn pair(self, subject: &str, relation: &str, object: &str) -> String {
        match self {
            Self::English => format!("{subject} relates to {object} via {relation}."),
            Self::Chinese => format!("{subject}与{object}的关系是{relation}"),
        }
    }

    fn aggregate(self, subjects: &[&str], objects: &[&str], relation: &str) -> String {
        match self {
            Self::English => format!(
                "{} and others relate to {} via {relation}.",
                subjects.join(", "),
                objects.join(", ")
            ),
            Self::Chinese => format!(
                "{}等与{}的关系是{relation}",
                subjects.join("、"),
                objects.join("、")
            ),
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Self::English => " ",
            Self::Chinese => "；",
        }
    }
}

impl fmt::Display for Phrasing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::English => write!(f, "en"),
            Self::Chinese => write!(f, "zh"),
        }
    }
}

/// Summariser tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_supporting_sentences")]
    pub supporting_sentences: usize,
    #[serde(default = "default_pair_examples")]
    pub pair_examples: usize,
    #[serde(default)]
    pub phrasing: Phrasing,
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

fn default_supporting_sentences() -> usize {
    DEFAULT_SUPPORTING_SENTENCES
}

fn default_pair_examples() -> usize {
    DEFAULT_PAIR_EXAMPLES
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            supporting_sentences: DEFAULT_SUPPORTING_SENTENCES,
            pair_examples: DEFAULT_PAIR_EXAMPLES,
            phrasing: Phrasing::default(),
        }
    }
}

/// Reduces a subgraph to knowledge text about one entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeSummarizer {
    config: SummaryConfig,
}

impl KnowledgeSummarizer {
    pub fn new(config: SummaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// Summarise with the configured character budget.
    pub fn summarize(&self, graph: &Graph, focal: &str) -> String {
        self.summarize_within(graph, focal, self.config.max_chars)
    }

    /// Summarise with an explicit character budget.
    ///
    /// Empty when the graph is empty or no triple touches `focal`.
    pub fn summarize_within(&self, graph: &Graph, focal: &str, max_chars: usize) -> String {
        if graph.is_empty() {
            return String::new();
        }
        let touching = triples(graph, Some(focal));
        if touching.is_empty() {
            return String::new();
        }

        let phrasing = self.config.phrasing;
        let relation_line = group_by_relation(&touching)
            .into_iter()
            .map(|(relation, pairs)| self.describe_group(relation, &pairs))
            .collect::<Vec<_>>()
            .join(phrasing.separator());

        let mut lines = vec![relation_line];
        lines.extend(
            graph
                .sentences()
                .iter()
                .take(self.config.supporting_sentences)
                .enumerate()
                .map(|(i, text)| format!("{}. {text}", i + 1)),
        );

        truncate_chars(&lines.join("\n"), max_chars).to_string()
    }

    fn describe_group(&self, relation: &str, pairs: &[(&str, &str)]) -> String {
        let phrasing = self.config.phrasing;
        if pairs.len() <= self.config.pair_examples {
            return pairs
                .iter()
                .map(|(s, o)| phrasing.pair(s, relation, o))
                .collect::<Vec<_>>()
                .join(phrasing.separator());
        }
        let subjects = distinct_prefix(pairs.iter().map(|(s, _)| *s), AGGREGATE_NAMES);
        let objects = distinct_prefix(pairs.iter().map(|(_, o)| *o), AGGREGATE_NAMES);
        phrasing.aggregate(&subjects, &objects, relation)
    }
}

/// Summarise `graph` around `focal` with default settings and the given budget.
pub fn summarize(graph: &Graph, focal: &str, max_chars: usize) -> String {
    KnowledgeSummarizer::default().summarize_within(graph, focal, max_chars)
}

/// The longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Relation → (subject, object) pairs, relations in first-seen order.
fn group_by_relation(triples: &[Triple]) -> Vec<(&str, Vec<(&str, &str)>)> {
    let mut groups: Vec<(&str, Vec<(&str, &str)>)> = Vec::new();
    for t in triples {
        let pair = (t.subject.as_str(), t.object.as_str());
        match groups.iter_mut().find(|(r, _)| *r == t.relation) {
            Some((_, pairs)) => pairs.push(pair),
            None => groups.push((t.relation.as_str(), vec![pair])),
        }
    }
    groups
}

fn distinct_prefix<'a>(names: impl Iterator<Item = &'a str>, cap: usize) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for name in names {
        if out.len() == cap {
            break;
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applies_to_graph() -> Graph {
        let mut g = Graph::new();
        for s in ["A1", "A2", "A3", "A4", "A5"] {
            g.add_fact(s, "applies-to", "Target", None);
        }
        g
    }

    #[test]
    fn small_groups_emit_one_sentence_per_pair() {
        let g = Graph::from_triples([("A", "relates", "B"), ("A", "relates", "C")]);
        let text = summarize(&g, "A", 300);
        assert_eq!(text, "A relates to B via relates. A relates to C via relates.");
    }

    #[test]
    fn large_groups_are_aggregated() {
        let text = summarize(&applies_to_graph(), "A", 300);
        assert_eq!(text, "A1, A2, A3 and others relate to Target via applies-to.");
        assert_eq!(text.matches("applies-to").count(), 1);
    }

    #[test]
    fn chinese_phrasing() {
        let config = SummaryConfig {
            phrasing: Phrasing::Chinese,
            ..SummaryConfig::default()
        };
        let summarizer = KnowledgeSummarizer::new(config);
        let g = Graph::from_triples([("灭火器", "用于", "灭火")]);
        assert_eq!(summarizer.summarize(&g, "灭火器"), "灭火器与灭火的关系是用于");

        let aggregated = summarizer.summarize(&applies_to_graph(), "Target");
        assert_eq!(aggregated, "A1、A2、A3等与Target的关系是applies-to");
    }

    #[test]
    fn supporting_sentences_are_numbered_and_capped() {
        let mut g = Graph::new();
        for i in 0..7 {
            g.add_fact("A", &format!("r{i}"), &format!("B{i}"), Some(&format!("s{i}")));
        }
        let config = SummaryConfig {
            pair_examples: 3,
            supporting_sentences: 5,
            ..SummaryConfig::default()
        };
        let text = KnowledgeSummarizer::new(config).summarize_within(&g, "A", 10_000);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "1. s0");
        assert_eq!(lines[5], "5. s4");
    }

    #[test]
    fn output_is_bounded_on_char_boundaries() {
        let g = Graph::from_triples([("二氧化碳", "储存于", "地质构造")]);
        let full = summarize(&g, "二氧化碳", 10_000);
        for max in 0..full.chars().count() + 2 {
            let text = summarize(&g, "二氧化碳", max);
            assert!(text.chars().count() <= max);
            assert!(full.starts_with(&text));
        }
    }

    #[test]
    fn empty_when_nothing_touches_focal() {
        assert_eq!(summarize(&Graph::new(), "A", 300), "");
        let g = Graph::from_triples([("A", "r", "B")]);
        assert_eq!(summarize(&g, "Z", 300), "");
        assert_eq!(summarize(&g, "", 300), "");
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("碳捕集", 2), "碳捕");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn phrasing_parses_loosely() {
        assert_eq!(Phrasing::from_str_loose(" ZH "), Some(Phrasing::Chinese));
        assert_eq!(Phrasing::from_str_loose("english"), Some(Phrasing::English));
        assert_eq!(Phrasing::from_str_loose("fr"), None);
        assert_eq!(Phrasing::Chinese.to_string(), "zh");
    }
}
