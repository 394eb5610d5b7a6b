//! Entity-name matching strategies.
//!
//! A [`Matcher`] decides whether a search term refers to a candidate node
//! name. Matchers are stateless after construction, so one instance can be
//! shared by every session and swapped without touching the search code.
//!
//! All comparisons run on normalised text: Unicode NFKC (so full-width
//! `ＣＯ２` equals `CO2`) followed by lowercasing. Hot loops normalise each
//! side once with [`normalize_term`] and call [`Matcher::matches_normalized`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Decides whether `term` refers to `candidate`.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Both arguments have already been through [`normalize_term`].
    fn matches_normalized(&self, term: &str, candidate: &str) -> bool;

    fn matches(&self, term: &str, candidate: &str) -> bool {
        self.matches_normalized(&normalize_term(term), &normalize_term(candidate))
    }
}

/// NFKC + lowercase.
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Trim, then [`normalize`]: the form matchers compare.
pub fn normalize_term(text: &str) -> String {
    normalize(text.trim())
}

/// Whether `haystack` contains `needle` after normalisation.
///
/// An empty needle is contained nowhere.
pub fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let needle = normalize(needle.trim());
    !needle.is_empty() && normalize(haystack).contains(&needle)
}

/// Normalised equality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl Matcher for ExactMatcher {
    fn matches_normalized(&self, term: &str, candidate: &str) -> bool {
        !term.is_empty() && term == candidate
    }
}

/// The base strategy: equality, or either string containing the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl Matcher for SubstringMatcher {
    fn matches_normalized(&self, term: &str, candidate: &str) -> bool {
        if term.is_empty() || candidate.is_empty() {
            return false;
        }
        term == candidate || candidate.contains(term) || term.contains(candidate)
    }
}

/// A synonym group: a canonical key and its alternate surface forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymGroup {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl SynonymGroup {
    pub fn new(canonical: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            canonical: canonical.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Carbon capture, utilisation and storage vocabulary.
pub static BUILTIN_SYNONYMS: &[(&str, &[&str])] = &[
    ("ccus", &["碳捕集利用与储存", "碳捕集", "CCUS技术"]),
    ("ccs", &["碳捕集与储存", "碳封存技术"]),
    ("ccu", &["碳捕集与利用", "碳利用技术"]),
    ("二氧化碳", &["CO2", "温室气体"]),
    ("碳捕集", &["碳捕获", "二氧化碳捕集"]),
    ("碳储存", &["碳封存", "地质储存", "CO2储存"]),
    ("碳利用", &["碳转化", "CO2利用"]),
    ("气候变化", &["全球变暖", "温室效应"]),
    ("碳中和", &["净零排放", "碳达峰"]),
    ("清洁能源", &["可再生能源", "新能源"]),
];

/// Surface form → every form it is interchangeable with.
///
/// Groups are symmetric: looking up the canonical key or any alias yields the
/// whole group. A form listed in several groups expands to their union.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    forms: HashMap<String, Vec<String>>,
    /// Same keys as `forms`, members normalised.
    folded: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in domain table.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (canonical, aliases) in BUILTIN_SYNONYMS {
            table.insert(&SynonymGroup::new(*canonical, aliases));
        }
        table
    }

    pub fn from_groups<'a>(groups: impl IntoIterator<Item = &'a SynonymGroup>) -> Self {
        let mut table = Self::new();
        for group in groups {
            table.insert(group);
        }
        table
    }

    /// Add a group. Forms already present gain the new members.
    pub fn insert(&mut self, group: &SynonymGroup) {
        let members: Vec<String> = std::iter::once(&group.canonical)
            .chain(group.aliases.iter())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let folded_members: Vec<String> = members.iter().map(|m| normalize(m)).collect();
        for key in &folded_members {
            let entry = self.forms.entry(key.clone()).or_default();
            for other in &members {
                if !entry.contains(other) {
                    entry.push(other.clone());
                }
            }
            let entry = self.folded.entry(key.clone()).or_default();
            for other in &folded_members {
                if !entry.contains(other) {
                    entry.push(other.clone());
                }
            }
        }
    }

    /// Forms interchangeable with `term`, including `term` itself when known.
    pub fn alternates(&self, term: &str) -> &[String] {
        self.forms
            .get(&normalize_term(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// [`alternates`](Self::alternates) for an already normalised term,
    /// returned in normalised form.
    pub fn normalized_alternates(&self, term: &str) -> &[String] {
        self.folded.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

/// Wraps another matcher, first expanding the term through a synonym table.
///
/// `matches(term, candidate)` is true if any of `{term} ∪ alternates(term)`
/// matches `candidate` under the inner strategy.
#[derive(Debug, Clone)]
pub struct SynonymMatcher<M = SubstringMatcher> {
    inner: M,
    table: SynonymTable,
}

impl<M: Matcher> SynonymMatcher<M> {
    pub fn new(inner: M, table: SynonymTable) -> Self {
        Self { inner, table }
    }

    pub fn table(&self) -> &SynonymTable {
        &self.table
    }
}

impl SynonymMatcher<SubstringMatcher> {
    /// Substring matching over the built-in domain table.
    pub fn builtin() -> Self {
        Self::new(SubstringMatcher, SynonymTable::builtin())
    }
}

impl<M: Matcher> Matcher for SynonymMatcher<M> {
    fn matches_normalized(&self, term: &str, candidate: &str) -> bool {
        self.inner.matches_normalized(term, candidate)
            || self
                .table
                .normalized_alternates(term)
                .iter()
                .any(|alt| self.inner.matches_normalized(alt, candidate))
    }
}
