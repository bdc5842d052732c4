//! Mutable, concurrently trainable association store.
//!
//! Keys hash into bins, and bins are partitioned over a fixed set of lock
//! stripes: the global bin index is `hash & (bins - 1)` and its stripe is the
//! low `STRIPE_BITS` of that index. Because the bin count is always a power of
//! two no smaller than the stripe count, a key's stripe depends only on its
//! hash and never changes when the table doubles; each stripe owns its slice
//! of bins and splits them in place during growth.

use crate::config::StoreConfig;
use crate::edges::{BoundedEdgeSet, IncrementOutcome};
use crate::identity::NodeIdentity;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

const STRIPE_BITS: u32 = 7;
pub const STRIPE_COUNT: usize = 1 << STRIPE_BITS;
const STRIPE_MASK: u64 = (STRIPE_COUNT as u64) - 1;

/// A concept and its outgoing associations.
#[derive(Debug)]
pub struct GraphNode {
    id: NodeIdentity,
    edges: Mutex<BoundedEdgeSet>,
}

impl GraphNode {
    fn new(id: NodeIdentity, edge_capacity: usize) -> Self {
        Self {
            id,
            edges: Mutex::new(BoundedEdgeSet::new(edge_capacity)),
        }
    }

    pub fn id(&self) -> &NodeIdentity {
        &self.id
    }

    /// Locks the node's edge set. Hold the guard for as long as the edges are
    /// being read; training on this node waits until it is dropped.
    pub fn edges(&self) -> MutexGuard<'_, BoundedEdgeSet> {
        self.edges.lock()
    }

    pub fn mass_of(&self, target: &NodeIdentity) -> Option<f32> {
        self.edges.lock().mass_of(target)
    }
}

type Bin = Vec<Arc<GraphNode>>;

/// The bins owned by one lock stripe.
struct Stripe {
    bins: Vec<Bin>,
}

impl Stripe {
    fn local_index(&self, hash: u64) -> usize {
        ((hash >> STRIPE_BITS) as usize) & (self.bins.len() - 1)
    }

    fn find(&self, id: &NodeIdentity) -> Option<&Arc<GraphNode>> {
        self.bins[self.local_index(id.hash_code())]
            .iter()
            .find(|node| node.id == *id)
    }

    /// Doubles this stripe's bins. Every entry of old local bin `i` lands in
    /// `i` or `i + old_len` depending on `split_bit`, and keeps its position
    /// relative to the other entries that land in the same bin.
    fn unzip(&mut self, split_bit: u64) {
        let old_len = self.bins.len();
        let mut upper = Vec::with_capacity(old_len);
        for bin in &mut self.bins {
            let (low, high): (Bin, Bin) = bin
                .drain(..)
                .partition(|node| node.id.hash_code() & split_bit == 0);
            *bin = low;
            upper.push(high);
        }
        self.bins.extend(upper);
    }
}

/// Lock-striped hash table of concept nodes.
pub struct GraphStore {
    stripes: Box<[Mutex<Stripe>]>,
    bin_count: AtomicUsize,
    /// Bumped under every stripe lock each time the table doubles.
    generation: AtomicU64,
    count: AtomicUsize,
    config: StoreConfig,
    max_bins: usize,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl GraphStore {
    pub fn new(config: StoreConfig) -> Self {
        let initial_bins = config.initial_bins.max(STRIPE_COUNT).next_power_of_two();
        let max_bins = config.max_bins.next_power_of_two().max(initial_bins);
        let per_stripe = initial_bins / STRIPE_COUNT;

        let stripes = (0..STRIPE_COUNT)
            .map(|_| {
                Mutex::new(Stripe {
                    bins: (0..per_stripe).map(|_| Vec::new()).collect(),
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            stripes,
            bin_count: AtomicUsize::new(initial_bins),
            generation: AtomicU64::new(0),
            count: AtomicUsize::new(0),
            config,
            max_bins,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Approximate node count; may lag concurrent inserts.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count.load(Ordering::Acquire)
    }

    fn stripe_for(&self, hash: u64) -> &Mutex<Stripe> {
        &self.stripes[(hash & STRIPE_MASK) as usize]
    }

    /// Adds `weight` to the association `source -> target`, creating the
    /// source node on first use. Directional: callers wanting a symmetric
    /// relation train both ways (see [`GraphStore::train_symmetric`]).
    pub fn train(&self, source: &NodeIdentity, target: &NodeIdentity, weight: f32) -> IncrementOutcome {
        self.get_or_insert(source).edges.lock().increment(target, weight)
    }

    pub fn train_symmetric(&self, a: &NodeIdentity, b: &NodeIdentity, weight: f32) {
        self.train(a, b, weight);
        self.train(b, a, weight);
    }

    /// Looks up a node. A miss is `None`; nothing is allocated either way.
    pub fn get(&self, id: &NodeIdentity) -> Option<Arc<GraphNode>> {
        self.stripe_for(id.hash_code()).lock().find(id).cloned()
    }

    /// Mass of `source -> target`, if both the node and the edge exist.
    pub fn mass(&self, source: &NodeIdentity, target: &NodeIdentity) -> Option<f32> {
        self.get(source)?.mass_of(target)
    }

    fn get_or_insert(&self, id: &NodeIdentity) -> Arc<GraphNode> {
        let hash = id.hash_code();
        let node = {
            let mut stripe = self.stripe_for(hash).lock();
            if let Some(node) = stripe.find(id) {
                return Arc::clone(node);
            }
            let node = Arc::new(GraphNode::new(id.clone(), self.config.edge_capacity));
            let index = stripe.local_index(hash);
            stripe.bins[index].push(Arc::clone(&node));
            node
        };

        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        self.maybe_grow(count);
        node
    }

    fn maybe_grow(&self, count: usize) {
        let bins = self.bin_count();
        if bins >= self.max_bins || count <= bins.saturating_mul(self.config.load_ratio) {
            return;
        }
        self.grow(bins);
    }

    /// Doubles the table. Takes every stripe lock in index order, so no other
    /// operation can observe a half-split table.
    fn grow(&self, observed_bins: usize) {
        let mut guards: Vec<MutexGuard<'_, Stripe>> =
            self.stripes.iter().map(|stripe| stripe.lock()).collect();

        // Another writer may have grown the table while we queued for locks.
        if self.bin_count.load(Ordering::Acquire) != observed_bins {
            return;
        }

        let split_bit = observed_bins as u64;
        for stripe in guards.iter_mut() {
            stripe.unzip(split_bit);
        }
        let new_bins = observed_bins * 2;
        self.bin_count.store(new_bins, Ordering::Release);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        drop(guards);

        debug!(
            bins = new_bins,
            items = self.count(),
            generation,
            "grew association table"
        );
    }

    /// Iterates over every node, one stripe at a time. If the table grows
    /// while the iterator is live it stops early rather than walking a
    /// rearranged table; check [`StoreIter::was_truncated`] afterwards.
    /// Pause training when a complete dump is required.
    pub fn iter(&self) -> StoreIter<'_> {
        StoreIter {
            store: self,
            generation: self.generation.load(Ordering::Acquire),
            next_stripe: 0,
            buffer: Vec::new().into_iter(),
            truncated: false,
        }
    }
}

pub struct StoreIter<'a> {
    store: &'a GraphStore,
    generation: u64,
    next_stripe: usize,
    buffer: std::vec::IntoIter<Arc<GraphNode>>,
    truncated: bool,
}

impl StoreIter<'_> {
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }
}

impl Iterator for StoreIter<'_> {
    type Item = Arc<GraphNode>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self.buffer.next() {
                return Some(node);
            }
            if self.next_stripe >= STRIPE_COUNT {
                return None;
            }

            let stripe = self.store.stripes[self.next_stripe].lock();
            if self.store.generation.load(Ordering::Acquire) != self.generation {
                drop(stripe);
                debug!(
                    stripe = self.next_stripe,
                    "table grew during iteration, stopping early"
                );
                self.truncated = true;
                self.next_stripe = STRIPE_COUNT;
                return None;
            }
            let nodes: Vec<Arc<GraphNode>> = stripe.bins.iter().flatten().cloned().collect();
            drop(stripe);

            self.next_stripe += 1;
            self.buffer = nodes.into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn small_store(initial_bins: usize, max_bins: usize) -> GraphStore {
        GraphStore::new(StoreConfig::default().with_bins(initial_bins, max_bins))
    }

    #[test]
    fn test_train_then_get() {
        let store = GraphStore::default();
        let grace = NodeIdentity::word("grace");
        let mercy = NodeIdentity::word("mercy");

        assert!(store.get(&grace).is_none());
        store.train(&grace, &mercy, 1.5);
        store.train(&grace, &mercy, 0.5);

        let node = store.get(&grace).expect("node was trained");
        assert_eq!(node.id(), &grace);
        assert_eq!(node.mass_of(&mercy), Some(2.0));
        assert_eq!(store.mass(&grace, &mercy), Some(2.0));
        // Directional: the target has no node of its own.
        assert!(store.get(&mercy).is_none());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_symmetric_training_creates_both_nodes() {
        let store = GraphStore::default();
        let a = NodeIdentity::entity("Nephi");
        let b = NodeIdentity::entity("Lehi");
        store.train_symmetric(&a, &b, 1.0);
        assert_eq!(store.mass(&a, &b), Some(1.0));
        assert_eq!(store.mass(&b, &a), Some(1.0));
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_verse_against_digits() {
        let store = GraphStore::default();
        let verse = NodeIdentity::new(crate::identity::Category::VERSE, "1-ne 1:1");
        for c in 0..10 {
            store.train(&verse, &NodeIdentity::word(&c.to_string()), 1.0 + 0.1 * c as f32);
        }

        let node = store.get(&verse).unwrap();
        let edges = node.edges();
        assert_eq!(edges.len(), 10);
        let names: Vec<&str> = edges.iter().map(|e| e.target().name()).collect();
        assert_eq!(names, ["9", "8", "7", "6", "5", "4", "3", "2", "1", "0"]);
    }

    #[test]
    fn test_growth_keeps_every_entry() {
        let store = small_store(STRIPE_COUNT, 1 << 16);
        let hub = NodeIdentity::word("hub");
        for i in 0..5_000 {
            store.train(&NodeIdentity::word(&format!("n{i}")), &hub, i as f32);
        }

        assert!(store.bin_count() > STRIPE_COUNT);
        assert_eq!(store.count(), 5_000);
        for i in 0..5_000 {
            let id = NodeIdentity::word(&format!("n{i}"));
            assert_eq!(store.mass(&id, &hub), Some(i as f32), "lost {id}");
        }

        let seen: HashSet<NodeIdentity> = store.iter().map(|n| n.id().clone()).collect();
        assert_eq!(seen.len(), 5_000);
    }

    #[test]
    fn test_saturated_table_stops_growing() {
        let store = small_store(STRIPE_COUNT, STRIPE_COUNT);
        let hub = NodeIdentity::word("hub");
        for i in 0..2_000 {
            store.train(&NodeIdentity::word(&format!("n{i}")), &hub, 1.0);
        }
        assert_eq!(store.bin_count(), STRIPE_COUNT);
        assert_eq!(store.count(), 2_000);
        assert!(store.get(&NodeIdentity::word("n1999")).is_some());
    }

    #[test]
    fn test_unzip_preserves_chain_order() {
        let mut stripe = Stripe {
            bins: vec![Vec::new()],
        };
        let ids: Vec<NodeIdentity> = (0..64).map(|i| NodeIdentity::word(&format!("k{i}"))).collect();
        for id in &ids {
            stripe.bins[0].push(Arc::new(GraphNode::new(id.clone(), 4)));
        }

        let split_bit = 1u64 << STRIPE_BITS;
        stripe.unzip(split_bit);
        assert_eq!(stripe.bins.len(), 2);

        let expected_low: Vec<&NodeIdentity> =
            ids.iter().filter(|id| id.hash_code() & split_bit == 0).collect();
        let expected_high: Vec<&NodeIdentity> =
            ids.iter().filter(|id| id.hash_code() & split_bit != 0).collect();
        let low: Vec<&NodeIdentity> = stripe.bins[0].iter().map(|n| n.id()).collect();
        let high: Vec<&NodeIdentity> = stripe.bins[1].iter().map(|n| n.id()).collect();
        assert_eq!(low, expected_low);
        assert_eq!(high, expected_high);
    }

    #[test]
    fn test_iteration_truncates_on_growth() {
        let store = small_store(STRIPE_COUNT, 1 << 16);
        let hub = NodeIdentity::word("hub");
        // Just under the first growth threshold (128 bins * 3).
        for i in 0..380 {
            store.train(&NodeIdentity::word(&format!("a{i}")), &hub, 1.0);
        }

        let mut iter = store.iter();
        let mut yielded = usize::from(iter.next().is_some());

        for i in 0..400 {
            store.train(&NodeIdentity::word(&format!("b{i}")), &hub, 1.0);
        }
        assert!(store.bin_count() > STRIPE_COUNT);

        yielded += iter.by_ref().count();
        assert!(iter.was_truncated());
        assert!(yielded < 780);
    }
}
