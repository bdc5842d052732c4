//! Read-only, arena-backed graph loaded from a snapshot.
//!
//! Node records are copied chunk by chunk into a handful of large blocks and
//! never decoded into heap objects. Lookups hash a borrowed identity, follow a
//! short collision chain and return views that borrow the arena, so a view
//! cannot outlive the graph that owns its bytes.

use super::format::{validate_record, ByteCursor, NODES_PER_CHUNK};
use crate::error::{SnapshotError, SnapshotResult};
use crate::identity::{IdentityRef, NodeIdentity};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use tracing::{debug, info};

/// Dense position of a node in snapshot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeSlot(pub u32);

impl NodeSlot {
    fn index(self) -> usize {
        self.0 as usize
    }
}

const NO_SLOT: u32 = u32::MAX;

/// Sole owner of every block a snapshot was loaded into. Blocks are freed
/// exactly once, when the arena drops.
#[derive(Debug, Default)]
pub struct Arena {
    blocks: Vec<Box<[u8]>>,
    bytes: usize,
}

impl Arena {
    fn push_block(&mut self, bytes: &[u8]) -> u32 {
        self.blocks.push(Box::from(bytes));
        self.bytes += bytes.len();
        (self.blocks.len() - 1) as u32
    }

    fn block(&self, index: u32) -> &[u8] {
        &self.blocks[index as usize]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        debug!(
            blocks = self.blocks.len(),
            bytes = self.bytes,
            "releasing snapshot arena"
        );
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeLocation {
    block: u32,
    offset: usize,
    len: usize,
}

/// Immutable association graph. `Send + Sync`; any number of threads may
/// query it at once.
#[derive(Debug)]
pub struct ArenaGraph {
    arena: Arena,
    edge_capacity: u16,
    locations: Vec<NodeLocation>,
    /// Identity hash -> most recently loaded slot with that hash.
    index: HashMap<u64, u32>,
    /// Next slot sharing the same hash, or `NO_SLOT`.
    chain: Vec<u32>,
}

impl ArenaGraph {
    /// Loads a snapshot from any byte stream. Any malformation aborts the
    /// load; no partially built graph is ever returned.
    pub fn load<R: Read>(mut reader: R) -> SnapshotResult<Self> {
        let edge_capacity = u16::from_le_bytes(read_array(&mut reader, "header")?);
        let node_count = i32::from_le_bytes(read_array(&mut reader, "header")?);
        let node_count = usize::try_from(node_count).map_err(|_| SnapshotError::NegativeNodeCount(node_count))?;

        // The count is untrusted until the offsets are actually read.
        let mut offsets = Vec::with_capacity(node_count.min(1 << 20));
        let mut previous = 0i64;
        for index in 0..node_count {
            let end = i64::from_le_bytes(read_array(&mut reader, "offset table")?);
            if end <= previous {
                return Err(SnapshotError::NonMonotonicOffset {
                    index,
                    previous,
                    current: end,
                });
            }
            offsets.push(end);
            previous = end;
        }

        let mut arena = Arena::default();
        let mut locations = Vec::with_capacity(offsets.len());
        let mut index: HashMap<u64, u32> = HashMap::with_capacity(offsets.len());
        let mut chain = Vec::with_capacity(offsets.len());
        let mut scratch: Vec<u8> = Vec::new();
        let mut spans: Vec<(usize, usize, u64)> = Vec::with_capacity(NODES_PER_CHUNK);
        let mut chunk_start = 0i64;

        for (chunk_number, chunk) in offsets.chunks(NODES_PER_CHUNK).enumerate() {
            let first_slot = chunk_number * NODES_PER_CHUNK;
            let chunk_end = chunk[chunk.len() - 1];
            let chunk_len = usize::try_from(chunk_end - chunk_start)
                .map_err(|_| SnapshotError::Truncated("chunk larger than addressable memory"))?;

            // The claimed length is untrusted, so the buffer only grows as
            // bytes actually arrive.
            scratch.clear();
            let read = reader
                .by_ref()
                .take(chunk_len as u64)
                .read_to_end(&mut scratch)?;
            if read < chunk_len {
                return Err(SnapshotError::Truncated("node records"));
            }
            let bytes = &scratch[..chunk_len];

            spans.clear();
            let mut start = 0usize;
            for (i, end) in chunk.iter().enumerate() {
                let end = (end - chunk_start) as usize;
                let record = &bytes[start..end];
                let (consumed, hash) = validate_record(record)?;
                if consumed != record.len() {
                    return Err(SnapshotError::LengthMismatch {
                        index: first_slot + i,
                        expected: record.len(),
                        actual: consumed,
                    });
                }
                spans.push((start, record.len(), hash));
                start = end;
            }

            let block = arena.push_block(bytes);
            for (i, (offset, len, hash)) in spans.iter().copied().enumerate() {
                let slot = (first_slot + i) as u32;
                locations.push(NodeLocation { block, offset, len });
                match index.entry(hash) {
                    Entry::Vacant(entry) => {
                        entry.insert(slot);
                        chain.push(NO_SLOT);
                    }
                    Entry::Occupied(mut entry) => {
                        chain.push(*entry.get());
                        entry.insert(slot);
                    }
                }
            }
            debug!(
                chunk = chunk_number,
                nodes = chunk.len(),
                bytes = chunk_len,
                "loaded snapshot chunk"
            );
            chunk_start = chunk_end;
        }

        index.shrink_to_fit();
        let graph = Self {
            arena,
            edge_capacity,
            locations,
            index,
            chain,
        };
        info!(
            nodes = graph.len(),
            blocks = graph.block_count(),
            bytes = graph.arena_bytes(),
            "loaded association snapshot"
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Edge capacity the snapshot was written with.
    pub fn edge_capacity(&self) -> u16 {
        self.edge_capacity
    }

    pub fn block_count(&self) -> usize {
        self.arena.block_count()
    }

    pub fn arena_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }

    pub fn node(&self, id: &NodeIdentity) -> Option<NodeView<'_>> {
        self.node_by_ref(id.borrowed())
    }

    pub fn node_by_ref(&self, id: IdentityRef<'_>) -> Option<NodeView<'_>> {
        self.slot_of(id).and_then(|slot| self.node_at(slot))
    }

    pub fn slot_of(&self, id: IdentityRef<'_>) -> Option<NodeSlot> {
        let mut slot = *self.index.get(&id.hash_code())?;
        while slot != NO_SLOT {
            let view = self.node_at(NodeSlot(slot))?;
            if view.id == id {
                return Some(NodeSlot(slot));
            }
            slot = self.chain[slot as usize];
        }
        None
    }

    pub fn node_at(&self, slot: NodeSlot) -> Option<NodeView<'_>> {
        let location = self.locations.get(slot.index())?;
        let block = self.arena.block(location.block);
        let record = &block[location.offset..location.offset + location.len];
        NodeView::parse(slot, record).ok()
    }

    /// Every node in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = NodeView<'_>> + '_ {
        (0..self.locations.len() as u32).filter_map(move |slot| self.node_at(NodeSlot(slot)))
    }
}

/// A node record borrowed from the arena.
#[derive(Clone)]
pub struct NodeView<'a> {
    slot: NodeSlot,
    id: IdentityRef<'a>,
    total_mass: f32,
    edge_count: u16,
    edges: ByteCursor<'a>,
}

impl<'a> NodeView<'a> {
    fn parse(slot: NodeSlot, record: &'a [u8]) -> SnapshotResult<Self> {
        let mut cursor = ByteCursor::new(record);
        let id = cursor.identity()?;
        let total_mass = cursor.f32()?;
        let edge_count = cursor.u16()?;
        Ok(Self {
            slot,
            id,
            total_mass,
            edge_count,
            edges: cursor,
        })
    }

    pub fn slot(&self) -> NodeSlot {
        self.slot
    }

    pub fn id(&self) -> IdentityRef<'a> {
        self.id
    }

    pub fn total_mass(&self) -> f32 {
        self.total_mass
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count as usize
    }

    /// Edges in descending mass order, decoded lazily from the arena.
    pub fn edges(&self) -> EdgeIter<'a> {
        EdgeIter {
            cursor: self.edges.clone(),
            remaining: self.edge_count,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub mass: f32,
    pub target: IdentityRef<'a>,
}

pub struct EdgeIter<'a> {
    cursor: ByteCursor<'a>,
    remaining: u16,
}

impl<'a> Iterator for EdgeIter<'a> {
    type Item = EdgeView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        // Records were fully validated on load.
        let mass = self.cursor.f32().ok()?;
        let target = self.cursor.identity().ok()?;
        Some(EdgeView { mass, target })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

fn read_array<const N: usize, R: Read>(reader: &mut R, what: &'static str) -> SnapshotResult<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| eof_as_truncated(e, what))?;
    Ok(buf)
}

fn eof_as_truncated(err: std::io::Error, what: &'static str) -> SnapshotError {
    if err.kind() == ErrorKind::UnexpectedEof {
        SnapshotError::Truncated(what)
    } else {
        SnapshotError::Io(err)
    }
}
