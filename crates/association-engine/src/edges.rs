//! Per-node adjacency: a capacity-bounded edge list kept sorted by mass.
//!
//! The heaviest associations are always retained. When the list is full and a
//! new target arrives, the lightest quarter is pruned to make room, so the cost
//! of a hot node (a common word, say) stays flat however much text is ingested.

use crate::identity::NodeIdentity;

/// Smallest capacity a set is ever configured with.
pub const MIN_EDGE_CAPACITY: usize = 4;

const INITIAL_BACKING: usize = 4;

/// A weighted association to `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    target: NodeIdentity,
    mass: f32,
}

impl Edge {
    pub fn new(target: NodeIdentity, mass: f32) -> Self {
        Self { target, mass }
    }

    pub fn target(&self) -> &NodeIdentity {
        &self.target
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }
}

/// What an [`BoundedEdgeSet::increment`] call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IncrementOutcome {
    Updated,
    Inserted,
    InsertedAfterEviction { evicted: usize, released_mass: f32 },
}

#[derive(Debug, Clone)]
pub struct BoundedEdgeSet {
    edges: Vec<Edge>,
    capacity: usize,
    total_mass: f32,
}

impl BoundedEdgeSet {
    pub fn new(configured_capacity: usize) -> Self {
        let capacity = configured_capacity.max(MIN_EDGE_CAPACITY);
        Self {
            edges: Vec::with_capacity(INITIAL_BACKING.min(capacity)),
            capacity,
            total_mass: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Sum of the mass of every retained edge.
    pub fn total_mass(&self) -> f32 {
        self.total_mass
    }

    /// Edges in descending mass order.
    pub fn iter(&self) -> std::slice::Iter<'_, Edge> {
        self.edges.iter()
    }

    pub fn as_slice(&self) -> &[Edge] {
        &self.edges
    }

    /// The `k` heaviest edges.
    pub fn top(&self, k: usize) -> &[Edge] {
        &self.edges[..k.min(self.edges.len())]
    }

    pub fn mass_of(&self, target: &NodeIdentity) -> Option<f32> {
        self.edges
            .iter()
            .find(|edge| edge.target == *target)
            .map(|edge| edge.mass)
    }

    pub fn increment(&mut self, target: &NodeIdentity, delta: f32) -> IncrementOutcome {
        if let Some(index) = self.edges.iter().position(|edge| edge.target == *target) {
            self.edges[index].mass += delta;
            self.total_mass += delta;
            if delta >= 0.0 {
                self.sift_left(index);
            } else {
                self.sift_right(index);
            }
            return IncrementOutcome::Updated;
        }

        let outcome = if self.edges.len() < self.capacity {
            self.grow_backing();
            IncrementOutcome::Inserted
        } else {
            let (evicted, released_mass) = self.evict_lightest();
            IncrementOutcome::InsertedAfterEviction {
                evicted,
                released_mass,
            }
        };

        self.edges.push(Edge::new(target.clone(), delta));
        self.total_mass += delta;
        let last = self.edges.len() - 1;
        self.sift_left(last);
        outcome
    }

    /// Moves a grown edge towards the front. Equal mass never swaps, so ties
    /// keep their relative order.
    fn sift_left(&mut self, mut index: usize) {
        while index > 0 && self.edges[index - 1].mass < self.edges[index].mass {
            self.edges.swap(index - 1, index);
            index -= 1;
        }
    }

    fn sift_right(&mut self, mut index: usize) {
        while index + 1 < self.edges.len() && self.edges[index + 1].mass > self.edges[index].mass {
            self.edges.swap(index, index + 1);
            index += 1;
        }
    }

    fn grow_backing(&mut self) {
        let backing = self.edges.capacity();
        if self.edges.len() == backing && backing < self.capacity {
            let target = (backing * 2).clamp(1, self.capacity);
            self.edges.reserve_exact(target - self.edges.len());
        }
    }

    /// Drops the lightest `max(1, ceil(len / 4))` edges.
    fn evict_lightest(&mut self) -> (usize, f32) {
        let len = self.edges.len();
        let count = len.div_ceil(4).max(1);
        let released: f32 = self.edges.drain(len - count..).map(|edge| edge.mass).sum();
        self.total_mass -= released;
        (count, released)
    }
}
