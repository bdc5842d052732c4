use super::format::write_node;
use crate::edges::MIN_EDGE_CAPACITY;
use crate::error::{SnapshotError, SnapshotResult};
use crate::store::{GraphNode, GraphStore};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

/// Counts reported after a snapshot is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub nodes: usize,
    pub edges: usize,
    pub bytes: usize,
}

/// Serialises a trained store into the snapshot format.
///
/// Nodes are written sorted by identity, each with at most `edge_capacity`
/// of its heaviest edges. The record body is assembled in memory first
/// because the header carries every node's end offset.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotWriter {
    edge_capacity: u16,
}

impl SnapshotWriter {
    pub fn new(edge_capacity: u16) -> Self {
        Self { edge_capacity }
    }

    /// A writer keeping every edge the store can hold.
    pub fn for_store(store: &GraphStore) -> Self {
        let capacity = store.config().edge_capacity.max(MIN_EDGE_CAPACITY);
        Self::new(u16::try_from(capacity).unwrap_or(u16::MAX))
    }

    pub fn edge_capacity(&self) -> u16 {
        self.edge_capacity
    }

    /// Writes every node of `store`. Training should be paused: if the table
    /// grows mid-walk the snapshot only holds the nodes seen before it grew.
    pub fn write_store<W: Write>(&self, store: &GraphStore, out: W) -> SnapshotResult<SnapshotSummary> {
        let mut iter = store.iter();
        let mut nodes: Vec<Arc<GraphNode>> = iter.by_ref().collect();
        if iter.was_truncated() {
            warn!(
                captured = nodes.len(),
                "store grew while snapshotting; snapshot is partial"
            );
        }
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        self.write_nodes(&nodes, out)
    }

    fn write_nodes<W: Write>(&self, nodes: &[Arc<GraphNode>], mut out: W) -> SnapshotResult<SnapshotSummary> {
        let node_count = i32::try_from(nodes.len()).map_err(|_| SnapshotError::TooManyNodes(nodes.len()))?;

        let mut body = Vec::new();
        let mut offsets = Vec::with_capacity(nodes.len());
        let mut edge_total = 0;
        for node in nodes {
            let edges = node.edges();
            let kept = edges.top(self.edge_capacity as usize);
            write_node(&mut body, node.id(), kept)?;
            edge_total += kept.len();
            offsets.push(body.len() as i64);
        }

        out.write_all(&self.edge_capacity.to_le_bytes())?;
        out.write_all(&node_count.to_le_bytes())?;
        for offset in &offsets {
            out.write_all(&offset.to_le_bytes())?;
        }
        out.write_all(&body)?;
        out.flush()?;

        let summary = SnapshotSummary {
            nodes: nodes.len(),
            edges: edge_total,
            bytes: 6 + offsets.len() * 8 + body.len(),
        };
        info!(
            nodes = summary.nodes,
            edges = summary.edges,
            bytes = summary.bytes,
            "wrote association snapshot"
        );
        Ok(summary)
    }
}
