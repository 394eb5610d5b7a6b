//! kg-fusion CLI: knowledge-graph retrieval and context fusion.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use kg_fusion::config::EngineConfig;
use kg_fusion::engine::Engine;

#[derive(Parser)]
#[command(name = "kg-fusion", version, about = "Knowledge-graph retrieval and context fusion")]
struct Cli {
    /// Knowledge graph JSON export (overrides `graph_path` in the config).
    #[arg(long, global = true)]
    graph: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show graph statistics.
    Info,

    /// Extract the subgraph around some terms and print it as JSON.
    Search {
        /// Search terms (comma-separated).
        #[arg(long)]
        terms: String,

        /// Number of hops (defaults to the configured depth).
        #[arg(long)]
        depth: Option<usize>,
    },

    /// List triples, optionally only those mentioning an entity.
    Triples {
        #[arg(long)]
        entity: Option<String>,
    },

    /// Show an entity's relationships as JSON.
    Details {
        #[arg(long)]
        entity: String,
    },

    /// Summarise the knowledge around an entity.
    Summarize {
        #[arg(long)]
        entity: String,

        /// Character budget (defaults to the configured `max_chars`).
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Run one conversational turn and print what a front end would receive.
    Turn {
        /// The user's raw question.
        #[arg(long)]
        query: String,

        /// Entities recognised in the question (comma-separated).
        #[arg(long)]
        entities: String,

        /// Session identifier.
        #[arg(long, default_value = "cli")]
        session: String,
    },
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(graph) = cli.graph {
        config.graph_path = Some(graph);
    }
    let engine = Engine::open(config)?;

    match cli.command {
        Commands::Info => {
            println!("{}", engine.info());
        }

        Commands::Search { terms, depth } => {
            let terms = split_list(&terms);
            if terms.is_empty() {
                miette::bail!("no search terms provided");
            }
            match engine.search(&terms, depth) {
                Some(graph) => {
                    let json = serde_json::to_string_pretty(&graph.to_document()).into_diagnostic()?;
                    println!("{json}");
                }
                None => println!("No matching subgraph."),
            }
        }

        Commands::Triples { entity } => {
            let triples = engine.triples(entity.as_deref());
            println!("Triples ({}):", triples.len());
            for (i, t) in triples.iter().enumerate() {
                println!("  {}. {t}", i + 1);
            }
        }

        Commands::Details { entity } => match engine.details(&entity) {
            Some(details) => {
                let json = serde_json::to_string_pretty(&details).into_diagnostic()?;
                println!("{json}");
            }
            None => println!("No details for \"{entity}\"."),
        },

        Commands::Summarize { entity, max_chars } => {
            let summary = engine
                .search(&[entity.as_str()], None)
                .map(|graph| engine.summarize(&graph, &entity, max_chars))
                .unwrap_or_default();
            if summary.is_empty() {
                println!("No knowledge available for \"{entity}\".");
            } else {
                println!("{summary}");
            }
        }

        Commands::Turn {
            query,
            entities,
            session,
        } => {
            let entities = split_list(&entities);
            let outcome = engine.turn(&session, &query, &entities);
            let cap = engine.config().retrieval.display_node_cap;

            if !outcome.prefix.is_empty() {
                println!("Prefix: {}", outcome.prefix);
            }
            if outcome.retrieval.knowledge.is_empty() {
                println!("Knowledge: (none)");
            } else {
                println!("Knowledge: {}", outcome.retrieval.knowledge);
            }
            println!("Triples: {}", outcome.retrieval.triples.len());
            match outcome.retrieval.display_graph(cap) {
                Some(graph) => println!("Graph: {} nodes, {} edges", graph.node_count(), graph.edge_count()),
                None if outcome.retrieval.graph.is_some() => println!("Graph: too large to display"),
                None => println!("Graph: (none)"),
            }
            if !outcome.suggestions.is_empty() {
                println!("Suggestions:");
                for s in &outcome.suggestions {
                    println!("  - {s}");
                }
            }
            if let Some(summary) = outcome.summary {
                let top: Vec<String> = summary
                    .top_entities
                    .iter()
                    .map(|(name, count)| format!("{name} ({count})"))
                    .collect();
                println!(
                    "Session: {} entities, topic {}, most discussed: {}",
                    summary.total_entities,
                    summary.current_topic,
                    top.join(", ")
                );
            }
        }
    }

    Ok(())
}
