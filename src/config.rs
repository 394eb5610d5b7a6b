//! Engine configuration, persisted as TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! graph_path = "data/data.json"
//!
//! [search]
//! depth = 1
//! frontier_cap = 10
//!
//! [summary]
//! max_chars = 300
//! phrasing = "zh"
//!
//! [[synonyms]]
//! canonical = "LNG"
//! aliases = ["液化天然气"]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::graph::matcher::{Matcher, SubstringMatcher, SynonymGroup, SynonymMatcher, SynonymTable};
use crate::graph::search::SearchConfig;
use crate::summarize::SummaryConfig;

/// Graphs with more nodes than this are not handed to the front end.
pub const DEFAULT_DISPLAY_NODE_CAP: usize = 50;

/// Budget for the combined per-entity knowledge text.
pub const DEFAULT_KNOWLEDGE_CHARS: usize = 300;

/// Limits applied to a whole retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_display_node_cap")]
    pub display_node_cap: usize,
    #[serde(default = "default_knowledge_chars")]
    pub knowledge_chars: usize,
}

fn default_display_node_cap() -> usize {
    DEFAULT_DISPLAY_NODE_CAP
}

fn default_knowledge_chars() -> usize {
    DEFAULT_KNOWLEDGE_CHARS
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            display_node_cap: DEFAULT_DISPLAY_NODE_CAP,
            knowledge_chars: DEFAULT_KNOWLEDGE_CHARS,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Knowledge graph JSON export.
    #[serde(default)]
    pub graph_path: Option<PathBuf>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Include the built-in carbon-capture synonym table.
    #[serde(default = "default_builtin_synonyms")]
    pub builtin_synonyms: bool,
    /// Extra synonym groups, merged over the built-in table.
    #[serde(default)]
    pub synonyms: Vec<SynonymGroup>,
}

fn default_builtin_synonyms() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graph_path: None,
            search: SearchConfig::default(),
            summary: SummaryConfig::default(),
            conversation: ConversationConfig::default(),
            retrieval: RetrievalConfig::default(),
            builtin_synonyms: default_builtin_synonyms(),
            synonyms: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<memory>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every result empty.
    pub fn validate(&self) -> ConfigResult<()> {
        let caps = [
            ("search.frontier_cap", self.search.frontier_cap),
            ("summary.max_chars", self.summary.max_chars),
            ("conversation.focus_cap", self.conversation.focus_cap),
            ("conversation.top_entities", self.conversation.top_entities),
            ("retrieval.display_node_cap", self.retrieval.display_node_cap),
            ("retrieval.knowledge_chars", self.retrieval.knowledge_chars),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid {
                message: format!("{name} must be greater than 0"),
            });
        }
        if let Some(group) = self.synonyms.iter().find(|g| g.canonical.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "synonym group with aliases {:?} has an empty canonical form",
                    group.aliases
                ),
            });
        }
        Ok(())
    }

    /// Built-in (if enabled) plus configured synonym groups.
    pub fn synonym_table(&self) -> SynonymTable {
        let mut table = if self.builtin_synonyms {
            SynonymTable::builtin()
        } else {
            SynonymTable::new()
        };
        for group in &self.synonyms {
            table.insert(group);
        }
        table
    }

    /// The matcher searches should use.
    ///
    /// Plain substring matching when no synonyms are configured at all.
    pub fn matcher(&self) -> Arc<dyn Matcher> {
        let table = self.synonym_table();
        if table.is_empty() {
            Arc::new(SubstringMatcher)
        } else {
            Arc::new(SynonymMatcher::new(SubstringMatcher, table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::Phrasing;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.search.depth, 1);
        assert_eq!(config.search.frontier_cap, 10);
        assert_eq!(config.summary.max_chars, 300);
        assert_eq!(config.conversation.focus_cap, 5);
        assert_eq!(config.retrieval.display_node_cap, 50);
        assert!(config.builtin_synonyms);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            graph_path = "data/data.json"

            [search]
            depth = 2

            [summary]
            phrasing = "zh"

            [[synonyms]]
            canonical = "LNG"
            aliases = ["液化天然气"]
            "#,
        )
        .unwrap();
        assert_eq!(config.graph_path, Some(PathBuf::from("data/data.json")));
        assert_eq!(config.search.depth, 2);
        assert_eq!(config.search.frontier_cap, 10);
        assert_eq!(config.summary.phrasing, Phrasing::Chinese);
        assert_eq!(config.summary.supporting_sentences, 5);
        assert_eq!(config.synonyms.len(), 1);
    }

    #[test]
    fn zero_caps_are_rejected() {
        let err = EngineConfig::from_toml_str("[conversation]\nfocus_cap = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref message } if message.contains("focus_cap")));
    }

    #[test]
    fn empty_canonical_is_rejected() {
        let err = EngineConfig::from_toml_str("[[synonyms]]\ncanonical = \" \"\naliases = [\"x\"]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[search\ndepth = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        let err = EngineConfig::from_toml_str("[search]\ndepth = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn configured_synonyms_extend_the_matcher() {
        let mut config = EngineConfig::default();
        config.synonyms.push(SynonymGroup::new("LNG", &["液化天然气"]));
        let matcher = config.matcher();
        assert!(matcher.matches("LNG", "液化天然气储罐"));
        assert!(matcher.matches("二氧化碳", "CO2"));

        config.builtin_synonyms = false;
        let table = config.synonym_table();
        assert!(table.alternates("二氧化碳").is_empty());
        assert!(!table.alternates("lng").is_empty());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/kg-fusion.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
