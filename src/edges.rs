//! Edge assembly: once a pipe's nodes are materialized in position order,
//! every consecutive pair of structural nodes becomes one pipe-segment edge
//! carrying the pipe's attributes and the substring geometry, and every
//! asset node gets an attachment edge to its structural node.

use crate::geometry;
use crate::models::{AttachmentEdge, PipeEdge, edge_key};
use crate::topology::{BasePipe, MaterializedGroup};
use geo::LineLocatePoint;
use geo_types::Point;
use wkt::ToWkt;

fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

/// One edge per consecutive pair of position groups. The segment geometry is
/// cut from the pipe centerline between the two node positions, so the sum of
/// segment lengths reproduces the pipe length.
pub fn assemble_pipe_edges(base: &BasePipe, groups: &[MaterializedGroup]) -> Vec<PipeEdge> {
    let mut edges = Vec::with_capacity(groups.len().saturating_sub(1));

    for pair in groups.windows(2) {
        let from = &pair[0].pipe_node;
        let to = &pair[1].pipe_node;

        let from_frac = base
            .geometry
            .line_locate_point(&Point::new(from.coords[0], from.coords[1]))
            .unwrap_or(0.0);
        let to_frac = base
            .geometry
            .line_locate_point(&Point::new(to.coords[0], to.coords[1]))
            .unwrap_or(1.0);

        let segment = geometry::line_substring(&base.geometry, from_frac, to_frac);
        let segment_length = round5(geometry::line_length(&segment));

        edges.push(PipeEdge {
            from_node_key: from.node_key.clone(),
            to_node_key: to.node_key.clone(),
            edge_key: edge_key(&from.node_key, &to.node_key),
            tag: base.tag.clone(),
            pipe_type: base.pipe_type.clone(),
            material: base.material.clone(),
            diameter: base.diameter,
            asset_label: base.asset_label.clone(),
            dma_codes: base.dma_codes.clone(),
            dma_names: base.dma_names.clone(),
            utility: base.utility.clone(),
            segment_length,
            segment_wkt: segment.wkt_string(),
        });
    }

    edges
}

/// Attachment edges from each structural node to the asset nodes sharing its
/// position group.
pub fn assemble_attachment_edges(groups: &[MaterializedGroup]) -> Vec<AttachmentEdge> {
    let mut edges = Vec::new();

    for group in groups {
        for asset in &group.asset_nodes {
            edges.push(AttachmentEdge {
                from_node_key: group.pipe_node.node_key.clone(),
                to_node_key: asset.node_key.clone(),
                edge_key: edge_key(&group.pipe_node.node_key, &asset.node_key),
            });
        }
    }

    edges
}
