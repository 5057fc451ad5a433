//! Acoustic logger coverage: for every logger mounted on the network, walk
//! outward along pipe segments and record how much of each segment the
//! logger can hear. The audible range depends on the pipe material, so the
//! remaining range is rescaled whenever the walk crosses a material change.
//! Coverage from multiple loggers on one segment is summed, then capped at
//! the segment length.

use std::io::Write;

use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use tracing::{info, warn};

use crate::aggregate::NetworkGraph;
use crate::errors::NetworkError;
use crate::materials::detection_distance;
use crate::sinks::fast::FastGraph;

/// An acoustic logger resolved onto the structural graph.
#[derive(Debug, Clone)]
pub struct Logger {
    pub node_key: String,
    pub tag: String,
    pub coords: [f64; 2],
    pub utility: String,
    pub dma: String,
    /// Structural node the logger is attached to; propagation starts here.
    pub start_node: usize,
}

/// One (logger, segment) audibility record.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageRow {
    pub utility: String,
    pub dma: String,
    pub logger_node_key: String,
    pub logger_tag: String,
    pub logger_coords: String,
    pub pipe_id: String,
    pub pipe_tag: String,
    pub pipe_material: String,
    pub pipe_length: f64,
    pub coverage_length: f64,
    pub pipe_wkt: String,
    pub start_node_key: String,
    pub start_node_coords: String,
    pub end_node_key: String,
    pub end_node_coords: String,
}

/// Per-segment totals after all loggers have run.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeCoverage {
    pub pipe_id: String,
    pub pipe_tag: String,
    pub utility: String,
    pub dma: String,
    pub pipe_length: f64,
    pub covered_length: f64,
    /// Percentage of the segment audible to at least the summed coverage,
    /// capped at 100.
    pub coverage_fraction: f64,
    /// Node keys of the loggers that can hear this segment.
    pub covered_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageSummary {
    pub utility: String,
    pub dma: String,
    pub total_length: f64,
    pub covered_length: f64,
    pub covered_percent: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CoverageReport {
    pub rows: Vec<CoverageRow>,
    pub edge_coverage: Vec<EdgeCoverage>,
    pub summaries: Vec<CoverageSummary>,
    pub loggers_processed: usize,
    pub loggers_failed: usize,
}

fn coords_repr(coords: [f64; 2]) -> String {
    format!("{} {}", coords[0], coords[1])
}

/// Resolve every acoustic logger asset onto its structural node. Loggers
/// whose attachment or structural node is missing are skipped with a
/// warning.
pub fn find_loggers(network: &NetworkGraph, fast: &FastGraph) -> Vec<Logger> {
    let attachment: AHashMap<&str, &str> = network
        .attachment_edges
        .iter()
        .map(|e| (e.to_node_key.as_str(), e.from_node_key.as_str()))
        .collect();

    let mut loggers = Vec::new();
    for asset in network.asset_nodes.iter().filter(|a| a.acoustic_logger) {
        let Some(structural_key) = attachment.get(asset.node_key.as_str()) else {
            warn!(node_key = %asset.node_key, "logger has no attachment edge");
            continue;
        };
        let Some(start_node) = fast.node_id(structural_key) else {
            warn!(node_key = %asset.node_key, "logger attachment node is not in the graph");
            continue;
        };

        loggers.push(Logger {
            node_key: asset.node_key.clone(),
            tag: asset.tag.clone(),
            coords: asset.coords,
            utility: asset.utility.clone(),
            dma: asset.dma_codes.first().cloned().unwrap_or_default(),
            start_node,
        });
    }

    loggers
}

/// Walk outward from one logger. `edge_covered` accumulates audible length
/// per edge across loggers; the per-logger rows go to `rows`.
fn propagate_logger(
    fast: &FastGraph,
    logger: &Logger,
    edge_covered: &mut [f64],
    edge_loggers: &mut [AHashSet<String>],
    rows: &mut Vec<CoverageRow>,
) -> Result<(), NetworkError> {
    let mut visited_nodes: AHashSet<usize> = AHashSet::new();
    let mut visited_edges: AHashSet<usize> = AHashSet::new();
    // (node, remaining range and the material it was measured in; None at
    // the logger itself, where each edge starts with its full range)
    let mut worklist: Vec<(usize, Option<(f64, String)>)> = vec![(logger.start_node, None)];

    while let Some((node_id, inbound)) = worklist.pop() {
        if !visited_nodes.insert(node_id) {
            continue;
        }

        for &edge_id in fast.incident_edges(node_id) {
            if visited_edges.contains(&edge_id) {
                continue;
            }
            let edge = fast.edge(edge_id);

            let available = match &inbound {
                None => detection_distance(&edge.material)?,
                Some((remaining, material)) if *material != edge.material => {
                    remaining / detection_distance(material)? * detection_distance(&edge.material)?
                }
                Some((remaining, _)) => *remaining,
            };
            if available <= 0.0 {
                continue;
            }

            visited_edges.insert(edge_id);
            let covered = available.min(edge.length_m);
            edge_covered[edge_id] += covered;
            edge_loggers[edge_id].insert(logger.node_key.clone());

            let (start, end) = (fast.node(edge.a), fast.node(edge.b));
            rows.push(CoverageRow {
                utility: logger.utility.clone(),
                dma: logger.dma.clone(),
                logger_node_key: logger.node_key.clone(),
                logger_tag: logger.tag.clone(),
                logger_coords: coords_repr(logger.coords),
                pipe_id: edge.edge_key.clone(),
                pipe_tag: edge.tag.clone(),
                pipe_material: edge.material.clone(),
                pipe_length: edge.length_m,
                coverage_length: covered,
                pipe_wkt: edge.wkt.clone(),
                start_node_key: start.node_key.clone(),
                start_node_coords: coords_repr(start.coords),
                end_node_key: end.node_key.clone(),
                end_node_coords: coords_repr(end.coords),
            });

            let leftover = available - edge.length_m;
            let far = fast.other_end(edge_id, node_id);
            if leftover > 0.0 && !fast.node(far).is_pipe_end && !visited_nodes.contains(&far) {
                worklist.push((far, Some((leftover, edge.material.clone()))));
            }
        }
    }

    Ok(())
}

/// Run every logger over the network and aggregate per-segment and
/// per-(utility, DMA) coverage. A logger hitting a data error (unknown
/// material on its path) is skipped, not fatal.
pub fn run_coverage(network: &NetworkGraph) -> Result<CoverageReport, NetworkError> {
    let fast = FastGraph::from_network(network)?;
    let loggers = find_loggers(network, &fast);

    let mut report = CoverageReport::default();
    let mut edge_covered = vec![0.0_f64; fast.edge_count()];
    let mut edge_loggers: Vec<AHashSet<String>> = vec![AHashSet::new(); fast.edge_count()];

    for logger in &loggers {
        match propagate_logger(
            &fast,
            logger,
            &mut edge_covered,
            &mut edge_loggers,
            &mut report.rows,
        ) {
            Ok(()) => report.loggers_processed += 1,
            Err(err) => {
                warn!(logger_tag = %logger.tag, error = %err, "skipping logger");
                report.loggers_failed += 1;
            }
        }
    }

    let mut by_zone: AHashMap<(String, String), (f64, f64)> = AHashMap::new();
    for edge_id in 0..fast.edge_count() {
        let edge = fast.edge(edge_id);
        let covered = edge_covered[edge_id].min(edge.length_m);
        let fraction = if edge.length_m == 0.0 {
            100.0
        } else {
            covered / edge.length_m * 100.0
        };

        report.edge_coverage.push(EdgeCoverage {
            pipe_id: edge.edge_key.clone(),
            pipe_tag: edge.tag.clone(),
            utility: edge.utility.clone(),
            dma: edge.dma_code.clone(),
            pipe_length: edge.length_m,
            covered_length: covered,
            coverage_fraction: fraction,
            covered_by: edge_loggers[edge_id].iter().cloned().sorted().collect(),
        });

        let zone = by_zone
            .entry((edge.utility.clone(), edge.dma_code.clone()))
            .or_insert((0.0, 0.0));
        zone.0 += edge.length_m;
        zone.1 += covered;
    }

    report.summaries = by_zone
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|((utility, dma), (total, covered))| CoverageSummary {
            utility,
            dma,
            total_length: total,
            covered_length: covered,
            covered_percent: if total == 0.0 {
                100.0
            } else {
                covered / total * 100.0
            },
        })
        .collect();

    info!(
        loggers = report.loggers_processed,
        failed = report.loggers_failed,
        segments = report.edge_coverage.len(),
        "coverage propagation finished"
    );
    Ok(report)
}

pub fn write_rows_csv<W: Write>(writer: W, rows: &[CoverageRow]) -> Result<(), NetworkError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_summary_csv<W: Write>(
    writer: W,
    summaries: &[CoverageSummary],
) -> Result<(), NetworkError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for summary in summaries {
        csv_writer.serialize(summary)?;
    }
    csv_writer.flush()?;
    Ok(())
}
