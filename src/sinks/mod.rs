//! Output adapters for the assembled network graph. Each sink turns the
//! storage-neutral [`NetworkGraph`](crate::aggregate::NetworkGraph) into one
//! concrete representation: a Cypher batch script, an analysis graph, or the
//! compact adjacency form the coverage propagator walks.

pub mod cypher;
pub mod fast;
pub mod petgraph_sink;

use crate::aggregate::NetworkGraph;
use crate::errors::NetworkError;

pub trait GraphSink {
    fn write_graph(&mut self, graph: &NetworkGraph) -> Result<(), NetworkError>;
}
