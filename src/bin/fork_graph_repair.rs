//! Fork Graph Repair Binary
//!
//! Loads a JSON dump of owner graphs, rebuilds every derived index and
//! counter from the primary records, and writes the repaired dump.
//!
//! ## Configuration
//!
//! Arguments: `fork_graph_repair <input.json> [output.json] [--gc]`
//! (see `--help`)
//!
//! Environment variables:
//! - `FORK_GRAPH_DUMP`: input path when no argument is given
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin fork_graph_repair --features cli -- graphs.json graphs.repaired.json --gc
//! ```

use std::time::Instant;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fork_graph_kernel::{GraphStore, InMemoryGraphStore, OwnerGraph};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fork_graph_repair=info,fork_graph_kernel=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .init();
    }
}

#[derive(Parser)]
#[command(name = "fork_graph_repair")]
#[command(version, about = "Rebuild derived indexes and counters of a fork graph dump", long_about = None)]
struct Cli {
    /// JSON dump of owner graphs
    #[arg(env = "FORK_GRAPH_DUMP")]
    input: String,

    /// Where to write the repaired dump (default: `<input>.repaired`)
    output: Option<String>,

    /// Drop tags no fork references any more
    #[arg(long = "gc")]
    collect_garbage: bool,
}

/// What one owner's repair changed.
#[derive(Debug, Default)]
struct RepairReport {
    references_fixed: usize,
    counts_fixed: usize,
    tags_collected: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        input,
        output,
        collect_garbage,
    } = Cli::parse();
    init_tracing();

    let output = output.unwrap_or_else(|| format!("{input}.repaired"));

    let started = Instant::now();
    let raw = tokio::fs::read_to_string(&input).await?;
    let graphs: Vec<OwnerGraph> = serde_json::from_str(&raw)?;
    info!(path = %input, owners = graphs.len(), "loaded graph dump");

    let store = InMemoryGraphStore::from_graphs(graphs);
    let mut totals = RepairReport::default();
    for owner in store.owners() {
        let report = store
            .transact(&owner, move |g| {
                g.rebuild_adjacency();
                let references_fixed = g.recount_references();
                let counts_fixed = g.repair_neighbor_counts();
                let tags_collected = if collect_garbage {
                    g.collect_garbage().len()
                } else {
                    0
                };
                Ok(RepairReport {
                    references_fixed,
                    counts_fixed,
                    tags_collected,
                })
            })
            .await?;
        if report.references_fixed + report.counts_fixed + report.tags_collected > 0 {
            info!(
                %owner,
                references_fixed = report.references_fixed,
                counts_fixed = report.counts_fixed,
                tags_collected = report.tags_collected,
                "repaired owner graph"
            );
        }
        totals.references_fixed += report.references_fixed;
        totals.counts_fixed += report.counts_fixed;
        totals.tags_collected += report.tags_collected;
    }

    let repaired = serde_json::to_string_pretty(&store.export())?;
    tokio::fs::write(&output, repaired).await?;
    info!(
        path = %output,
        references_fixed = totals.references_fixed,
        counts_fixed = totals.counts_fixed,
        tags_collected = totals.tags_collected,
        latency_ms = started.elapsed().as_millis() as u64,
        "wrote repaired dump"
    );
    Ok(())
}
