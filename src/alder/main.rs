use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use aqueduct::aggregate;
use aqueduct::coverage;
use aqueduct::models::PipeRecord;
use aqueduct::sinks::GraphSink;
use aqueduct::sinks::cypher::{CypherBatchWriter, DEFAULT_BATCH_SIZE};
use aqueduct::sinks::petgraph_sink::AnalysisGraph;

/// Build a water network graph from exported pipe records, optionally
/// emitting a Cypher load script and an acoustic logger coverage report.
#[derive(Parser)]
#[command(name = "alder", version)]
struct Args {
    /// JSON file holding an array of pipe records
    #[arg(long)]
    pipes: PathBuf,

    /// Write a cypher-shell load script here
    #[arg(long)]
    cypher_output: Option<PathBuf>,

    /// Rows per UNWIND batch in the Cypher script
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Write the per-logger coverage rows CSV here; the per-DMA summary
    /// lands next to it with a _summary suffix
    #[arg(long)]
    coverage_output: Option<PathBuf>,

    /// Process pipes across all cores
    #[arg(long)]
    parallel: bool,
}

fn summary_path(rows_path: &Path) -> PathBuf {
    let stem = rows_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "coverage".to_string());
    rows_path.with_file_name(format!("{stem}_summary.csv"))
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.pipes)
        .with_context(|| format!("reading {}", args.pipes.display()))?;
    let records: Vec<PipeRecord> =
        serde_json::from_str(&raw).context("parsing pipe records")?;
    info!(pipes = records.len(), "loaded pipe records");

    let network = if args.parallel {
        aggregate::build_network_parallel(&records)
    } else {
        aggregate::build_network(&records)
    };

    let stats = AnalysisGraph::from_network(&network).stats();
    info!(
        nodes = stats.node_count,
        edges = stats.edge_count,
        isolated = stats.isolated_nodes,
        components = stats.connected_components,
        "graph structure"
    );

    if let Some(path) = &args.cypher_output {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        CypherBatchWriter::new(BufWriter::new(file), args.batch_size)
            .write_graph(&network)
            .context("writing cypher script")?;
        info!(path = %path.display(), "cypher script written");
    }

    if let Some(rows_path) = &args.coverage_output {
        let report = coverage::run_coverage(&network).context("running coverage")?;

        let rows_file = File::create(rows_path)
            .with_context(|| format!("creating {}", rows_path.display()))?;
        coverage::write_rows_csv(BufWriter::new(rows_file), &report.rows)?;

        let summary = summary_path(rows_path);
        let summary_file = File::create(&summary)
            .with_context(|| format!("creating {}", summary.display()))?;
        coverage::write_summary_csv(BufWriter::new(summary_file), &report.summaries)?;

        info!(
            rows = report.rows.len(),
            loggers = report.loggers_processed,
            path = %rows_path.display(),
            "coverage report written"
        );
    }

    Ok(())
}
