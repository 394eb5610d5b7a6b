//! Rich diagnostic error types for the kg-fusion engine.
//!
//! Only load-time and configuration failures ever reach a caller. Everything
//! else the engine encounters (a malformed edge, an entity with no match, an
//! empty session) degrades to an empty result and, where useful, a log line.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the kg-fusion engine.
#[derive(Debug, Error, Diagnostic)]
pub enum FusionError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("knowledge graph not found: {path}")]
    #[diagnostic(
        code(fusion::store::not_found),
        help(
            "No file exists at this path. Point `graph_path` in the config \
             (or `--graph` on the command line) at the exported data.json."
        )
    )]
    NotFound { path: String },

    #[error("failed to read knowledge graph: {path}")]
    #[diagnostic(
        code(fusion::store::io),
        help("The file exists but could not be read. Check its permissions.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse knowledge graph: {path}")]
    #[diagnostic(
        code(fusion::store::parse),
        help(
            "The file is not a valid graph document. It must be a JSON object \
             with `nodes`, `links`, `sents` and (optionally) `categories`."
        )
    )]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

/// Recoverable graph defects.
///
/// These are logged where they are found and the offending element is
/// dropped. They are never returned from a public operation.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("edge {index} dropped: {reason}")]
    #[diagnostic(
        code(fusion::graph::malformed_edge),
        help(
            "The edge references a node or sentence index outside the graph. \
             Regenerate the graph export to restore it."
        )
    )]
    MalformedEdge { index: usize, reason: String },

    #[error("edge {index} dropped: duplicate of ({source_name}, {relation}, {target_name})")]
    #[diagnostic(
        code(fusion::graph::duplicate_edge),
        help(
            "An earlier edge already links these nodes with this relation, \
             possibly through a node whose name repeats. The first one is kept."
        )
    )]
    DuplicateEdge {
        index: usize,
        source_name: String,
        relation: String,
        target_name: String,
    },

    #[error("sentence key \"{key}\" ignored: not an integer index")]
    #[diagnostic(
        code(fusion::graph::sentence_key),
        help("Keyed `sents` maps must use string-encoded integer indices.")
    )]
    SentenceKey { key: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(fusion::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(fusion::config::parse),
        help("Check the TOML syntax and field names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(fusion::config::invalid), help("{message}"))]
    Invalid { message: String },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience alias for functions returning kg-fusion results.
pub type FusionResult<T> = std::result::Result<T, FusionError>;
