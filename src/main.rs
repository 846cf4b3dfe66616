//! fliplib-check: validate a graph description.
//!
//! Loads a TOML or JSON graph description, instantiates it with the
//! built-in filter registry and reports the compiled plan. Exits non-zero
//! if anything fails to load, wire or validate.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fliplib::pipeline::{FilterRegistry, GraphDescription};
use fliplib::GraphConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Validate a fliplib graph description
#[derive(Parser, Debug)]
#[command(name = "fliplib-check")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Graph description (.toml or .json)
    graph: Option<PathBuf>,

    /// Configuration file overriding the graph's own configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the connector catalog as JSON
    #[arg(long)]
    catalog: bool,

    /// List the registered filter types
    #[arg(long)]
    filters: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fliplib=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let registry = FilterRegistry::with_builtin();

    if cli.filters {
        for name in registry.type_names() {
            println!("{}", name);
        }
        if cli.graph.is_none() {
            return Ok(());
        }
    }

    let Some(graph_path) = cli.graph else {
        bail!("No graph description given (see --help)");
    };

    let mut description = GraphDescription::load(&graph_path)?;
    if let Some(config_path) = &cli.config {
        tracing::info!("Overriding graph configuration from {:?}", config_path);
        description.config = GraphConfig::load(config_path)?;
    }

    let graph = description
        .instantiate(&registry)
        .with_context(|| format!("Graph {:?} is invalid", graph_path))?;

    let stats = &graph.plan().stats;
    tracing::info!(
        graph = graph.name(),
        nodes = stats.total_nodes,
        sources = stats.source_nodes,
        sinks = stats.sink_nodes,
        connections = stats.connections,
        joins = stats.join_groups,
        unreachable = stats.unreachable_nodes,
        "Graph is valid"
    );

    if cli.catalog {
        let catalog = serde_json::to_string_pretty(&graph.connector_catalog())?;
        println!("{}", catalog);
    }

    Ok(())
}
