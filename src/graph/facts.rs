//! Triples and per-entity relationship details derived from a graph.

use std::fmt;

use serde::Serialize;

use super::matcher::{contains_normalized, Matcher, SubstringMatcher};
use super::{Graph, Triple};

/// Triples in edge order, optionally restricted to those whose subject or
/// object name contains `entity`.
pub fn triples(graph: &Graph, entity: Option<&str>) -> Vec<Triple> {
    graph
        .triples()
        .filter(|t| match entity {
            Some(e) => contains_normalized(&t.subject, e) || contains_normalized(&t.object, e),
            None => true,
        })
        .collect()
}

/// Which end of an edge the entity sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outgoing => write!(f, "->"),
            Self::Incoming => write!(f, "<-"),
        }
    }
}

/// One edge seen from the entity's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub direction: Direction,
    pub relation: String,
    pub counterpart: String,
}

/// Everything a graph says about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDetails {
    pub name: String,
    /// Distinct counterpart names, first-seen order.
    pub related_entities: Vec<String>,
    pub relationships: Vec<Relationship>,
    pub sentences: Vec<String>,
    pub total_connections: usize,
}

/// Collect the relationships of `entity` in `graph`.
///
/// An edge whose source matches is outgoing; otherwise, if its target
/// matches, incoming. `None` for an empty graph.
pub fn entity_details(graph: &Graph, entity: &str) -> Option<EntityDetails> {
    if graph.is_empty() {
        return None;
    }
    let matcher = SubstringMatcher;
    let mut details = EntityDetails {
        name: entity.to_string(),
        related_entities: Vec::new(),
        relationships: Vec::new(),
        sentences: graph.sentences().to_vec(),
        total_connections: 0,
    };

    for edge in graph.edges() {
        let (Some(source), Some(target)) = (graph.node(edge.source), graph.node(edge.target)) else {
            continue;
        };
        let (direction, counterpart) = if matcher.matches(entity, &source.name) {
            (Direction::Outgoing, &target.name)
        } else if matcher.matches(entity, &target.name) {
            (Direction::Incoming, &source.name)
        } else {
            continue;
        };
        if !details.related_entities.contains(counterpart) {
            details.related_entities.push(counterpart.clone());
        }
        details.relationships.push(Relationship {
            direction,
            relation: edge.relation.clone(),
            counterpart: counterpart.clone(),
        });
    }

    details.total_connections = details.relationships.len();
    Some(details)
}
