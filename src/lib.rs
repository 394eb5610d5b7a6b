//! # kg-fusion
//!
//! Entity-centric knowledge-graph retrieval and context fusion for
//! conversational question answering.
//!
//! ## Architecture
//!
//! - **Graph model** (`graph`): append-only node/edge/sentence arena with O(1) dedup
//! - **Store** (`graph::store`): validated, immutable load of the JSON export
//! - **Matching** (`graph::matcher`): exact, substring and synonym strategies
//! - **Search** (`graph::search`): bounded multi-hop frontier expansion
//! - **Merge** (`graph::merge`): associative, idempotent subgraph merge
//! - **Summaries** (`summarize`): subgraph → bounded knowledge text
//! - **Conversation** (`conversation`, `session`): per-session entity history
//!
//! ## Library usage
//!
//! ```no_run
//! use kg_fusion::config::EngineConfig;
//! use kg_fusion::engine::Engine;
//!
//! let config = EngineConfig {
//!     graph_path: Some("data/data.json".into()),
//!     ..EngineConfig::default()
//! };
//! let engine = Engine::open(config).unwrap();
//! let outcome = engine.turn("session-1", "灭火器有哪些类型", &["灭火器"]);
//! println!("{}{}", outcome.prefix, outcome.retrieval.knowledge);
//! ```

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod graph;
pub mod session;
pub mod summarize;
