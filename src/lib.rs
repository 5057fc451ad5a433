#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::cmp_owned,
    clippy::op_ref
)]

#[macro_use]
extern crate serde;

pub mod aggregate;
pub mod coverage;
pub mod edges;
pub mod errors;
pub mod geometry;
pub mod materials;
pub mod models;
pub mod node_key;
pub mod sinks;
pub mod topology;

/// EPSG:27700, the British National Grid. All working coordinates are in
/// metres on this grid.
pub const BRITISH_NATIONAL_GRID_SRID: u32 = 27700;
