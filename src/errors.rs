use thiserror::Error;

/// Failures raised by the GIS-to-graph transformation and the coverage
/// propagator. Data-integrity variants are fatal for the pipe or logger
/// being processed and carry the offending identifier so upstream contract
/// violations can be traced back to the source record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("pipe {tag} must belong to exactly one utility, found {utilities:?}")]
    MultiUtilityPipe { tag: String, utilities: Vec<String> },

    #[error("unsupported geometry type {found}; allowed types are {allowed}")]
    UnsupportedGeometryType {
        found: String,
        allowed: &'static str,
    },

    #[error("failed to parse WKT: {0}")]
    WktParse(String),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("material {material} is not in the detection distance table")]
    UnknownMaterial { material: String },

    #[error("unknown point asset type {asset_name}")]
    UnknownAssetType { asset_name: String },

    #[error(
        "pipe {tag} has {count} structural nodes consolidated at {distance_cm}cm, expected at most one"
    )]
    InvalidNodeGroup {
        tag: String,
        distance_cm: i64,
        count: usize,
    },

    #[error("graph has no node with key {node_key}")]
    MissingNode { node_key: String },

    #[error("sink write failed: {0}")]
    SinkWrite(String),
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        NetworkError::SinkWrite(err.to_string())
    }
}

impl From<csv::Error> for NetworkError {
    fn from(err: csv::Error) -> Self {
        NetworkError::SinkWrite(err.to_string())
    }
}
