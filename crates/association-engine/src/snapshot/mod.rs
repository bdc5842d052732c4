//! Binary snapshots of a trained store and the arena-backed reader for them.
//!
//! Layout (little-endian):
//!
//! ```text
//! u16 edge_capacity | i32 node_count | i64[node_count] end_offsets | node records
//! record   = identity, f32 total_mass, u16 edge_count, edge[edge_count]
//! edge     = f32 mass, identity
//! identity = u16 category, u8 name_len (0xFF => u16 len follows), utf8 name
//! ```
//!
//! End offsets are measured from the start of the record area. Snapshots are
//! write-once; a changed graph is rewritten in full.

mod arena;
mod format;
mod writer;

pub use arena::{ArenaGraph, EdgeIter, EdgeView, NodeSlot, NodeView};
pub use format::NODES_PER_CHUNK;
pub use writer::{SnapshotSummary, SnapshotWriter};
