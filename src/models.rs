//! Data-transfer records for the two external contracts: the per-pipe input
//! supplied by the relational store, and the node/edge/membership output
//! consumed by the graph sinks. The transformation core only ever sees these
//! plain records, never storage objects.

pub const NETWORK_NODE_LABEL: &str = "NetworkNode";
pub const PIPE_NODE_LABEL: &str = "PipeNode";
pub const PIPE_JUNCTION_LABEL: &str = "PipeJunction";
pub const PIPE_END_LABEL: &str = "PipeEnd";
pub const POINT_ASSET_LABEL: &str = "PointAsset";

pub const PIPE_MAIN_NAME: &str = "pipe_main";

/// Relationship label for structural-node-to-asset attachment edges.
pub const HAS_ASSET_LABEL: &str = "HAS_ASSET";

/// Another pipe whose geometry touches the base pipe, as pre-filtered by the
/// storage layer's spatial query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchingPipe {
    pub id: i64,
    pub tag: String,
    pub wkt: String,
}

/// A point asset lying within the join tolerance of the base pipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub tag: String,
    pub asset_name: String,
    pub wkt: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub acoustic_logger: bool,
}

fn default_pipe_asset_name() -> String {
    PIPE_MAIN_NAME.to_string()
}

/// One pipe as supplied by the storage layer, together with the pre-computed
/// lists of touching pipes and nearby assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeRecord {
    pub id: i64,
    pub tag: String,
    pub pipe_type: String,
    #[serde(default = "default_pipe_asset_name")]
    pub asset_name: String,
    pub material: String,
    pub diameter: f64,
    pub wkt: String,
    #[serde(default)]
    pub dma_ids: Vec<i64>,
    #[serde(default)]
    pub dma_codes: Vec<String>,
    #[serde(default)]
    pub dma_names: Vec<String>,
    pub utilities: Vec<String>,
    #[serde(default)]
    pub line_start_intersection_tags: Vec<String>,
    #[serde(default)]
    pub line_start_intersection_ids: Vec<i64>,
    #[serde(default)]
    pub line_end_intersection_tags: Vec<String>,
    #[serde(default)]
    pub line_end_intersection_ids: Vec<i64>,
    #[serde(default)]
    pub touching_pipes: Vec<TouchingPipe>,
    #[serde(default)]
    pub nearby_assets: Vec<AssetRecord>,
}

/// A deduplicated structural vertex (pipe end or junction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeNode {
    pub node_key: String,
    pub node_labels: Vec<String>,
    pub coords: [f64; 2],
    pub pipe_tags: Vec<String>,
    pub utility: String,
    pub dma_codes: Vec<String>,
    pub dma_names: Vec<String>,
    pub dmas: String,
}

/// A deduplicated point-asset vertex, co-located with a structural node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetNode {
    pub node_key: String,
    pub node_labels: Vec<String>,
    pub coords: [f64; 2],
    pub tag: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub acoustic_logger: bool,
    pub utility: String,
    pub dma_codes: Vec<String>,
    pub dma_names: Vec<String>,
    pub dmas: String,
}

/// A pipe-segment connection between two consecutive structural nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeEdge {
    pub from_node_key: String,
    pub to_node_key: String,
    pub edge_key: String,
    pub tag: String,
    pub pipe_type: String,
    pub material: String,
    pub diameter: f64,
    pub asset_label: String,
    pub dma_codes: Vec<String>,
    pub dma_names: Vec<String>,
    pub utility: String,
    pub segment_length: f64,
    pub segment_wkt: String,
}

/// Connects a structural node to an asset node in the same position group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentEdge {
    pub from_node_key: String,
    pub to_node_key: String,
    pub edge_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmaMembership {
    pub code: String,
    pub name: String,
    pub to_node_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityMembership {
    pub name: String,
    pub to_node_key: String,
}

/// `[{"code": ..., "name": ...}, ...]` built from the zipped DMA code/name
/// lists, stored on nodes and edges as a single JSON property.
pub fn dma_json(dma_codes: &[String], dma_names: &[String]) -> String {
    let pairs: Vec<serde_json::Value> = dma_codes
        .iter()
        .zip(dma_names.iter())
        .map(|(code, name)| serde_json::json!({ "code": code, "name": name }))
        .collect();

    serde_json::to_string(&pairs).unwrap_or_default()
}

/// `pipe_main` -> `PipeMain`, `hydrant` -> `Hydrant`. Used for graph labels.
pub fn pascal_label(snake_name: &str) -> String {
    snake_name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn edge_key(from_node_key: &str, to_node_key: &str) -> String {
    format!("{from_node_key}-{to_node_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_label() {
        assert_eq!(pascal_label("pipe_main"), "PipeMain");
        assert_eq!(pascal_label("network_opt_valve"), "NetworkOptValve");
        assert_eq!(pascal_label("hydrant"), "Hydrant");
    }

    #[test]
    fn test_dma_json_zips_codes_and_names() {
        let json = dma_json(
            &["ZDM01".to_string(), "ZDM02".to_string()],
            &["North".to_string(), "South".to_string()],
        );
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["code"], "ZDM01");
        assert_eq!(parsed[1]["name"], "South");
    }

    #[test]
    fn test_pipe_record_defaults() {
        let record: PipeRecord = serde_json::from_str(
            r#"{
                "id": 1,
                "tag": "P1",
                "pipe_type": "distribution",
                "material": "Steel",
                "diameter": 110.0,
                "wkt": "LINESTRING (0 0, 10 0)",
                "utilities": ["severn_trent_water"]
            }"#,
        )
        .unwrap();

        assert_eq!(record.asset_name, PIPE_MAIN_NAME);
        assert!(record.touching_pipes.is_empty());
        assert!(record.nearby_assets.is_empty());
    }
}
