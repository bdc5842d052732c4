use super::{Query, QueryTunables};
use crate::identity::NodeIdentity;
use crate::snapshot::{ArenaGraph, NodeSlot};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;
use tracing::{debug, warn};

/// Scopes beyond this many share the last bit of the scope mask.
pub const MAX_SCOPE_BITS: usize = 32;

type Activation = BTreeMap<NodeSlot, f32>;

/// Lifecycle of a scope pass. Reports only ever carry a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeState {
    Initialized,
    Spreading,
    Converged,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredNode {
    pub id: NodeIdentity,
    pub score: f32,
}

/// How one scope pass (independent or combined) ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeReport {
    pub name: String,
    pub mask: u32,
    pub state: ScopeState,
    pub iterations: usize,
    /// Sum of the activation the pass was seeded with.
    pub seed_mass: f32,
    /// Nodes that ended with non-zero cumulative activation, roots included.
    pub activated: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutcome {
    pub ranked: Vec<ScoredNode>,
    pub scopes: Vec<ScopeReport>,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// One scope's seeds before its pass runs.
struct ScopeSeed {
    name: String,
    mask: u32,
    seeds: Activation,
}

/// One bounded forward-spreading pass. Activation never flows back into the
/// pass's own seed nodes, so a seed's cumulative value stays its seed weight.
struct ScopePass<'g> {
    graph: &'g ArenaGraph,
    roots: BTreeSet<NodeSlot>,
    state: ScopeState,
    current: Activation,
    cumulative: Activation,
    iterations: usize,
}

impl<'g> ScopePass<'g> {
    fn new(graph: &'g ArenaGraph, seeds: &Activation) -> Self {
        Self {
            graph,
            roots: seeds.keys().copied().collect(),
            state: ScopeState::Initialized,
            current: seeds.clone(),
            cumulative: seeds.clone(),
            iterations: 0,
        }
    }

    fn run(mut self, tunables: &QueryTunables) -> Self {
        let started = Instant::now();
        self.state = ScopeState::Spreading;
        while self.state == ScopeState::Spreading {
            if started.elapsed() > tunables.max_search_time {
                self.state = ScopeState::TimedOut;
                break;
            }
            self.step(tunables.min_activation);
        }
        self
    }

    fn step(&mut self, floor: f32) {
        let mut next = Activation::new();
        for (&slot, &activation) in &self.current {
            if activation < floor {
                continue;
            }
            let Some(node) = self.graph.node_at(slot) else {
                continue;
            };
            let degree = node.edge_count();
            if degree == 0 || node.total_mass() <= 0.0 {
                continue;
            }

            let normalized = activation / degree as f32;
            let scale = degree as f32 / node.total_mass();
            // Edges arrive heaviest first, so contributions only shrink along
            // the list and the first one under the floor ends this node.
            for edge in node.edges() {
                let spread = normalized * sigmoid((edge.mass * scale - 1.0) * 0.5);
                if spread < floor {
                    break;
                }
                let Some(target) = self.graph.slot_of(edge.target) else {
                    continue;
                };
                if self.roots.contains(&target) {
                    continue;
                }
                *next.entry(target).or_insert(0.0) += spread;
                *self.cumulative.entry(target).or_insert(0.0) += spread;
            }
        }

        self.iterations += 1;
        if next.is_empty() {
            self.state = ScopeState::Converged;
        }
        self.current = next;
    }
}

/// A finished pass together with the seed it came from.
struct Processed {
    name: String,
    mask: u32,
    cumulative: Activation,
}

/// Runs [`Query`]s against one immutable graph. Cheap to construct; share
/// the graph, not the engine, across threads.
pub struct ActivationQueryEngine<'g> {
    graph: &'g ArenaGraph,
}

impl<'g> ActivationQueryEngine<'g> {
    pub fn new(graph: &'g ArenaGraph) -> Self {
        Self { graph }
    }

    /// Ranked `(identity, score)` pairs for `query`.
    pub fn run(query: &Query, graph: &ArenaGraph) -> Vec<ScoredNode> {
        ActivationQueryEngine::new(graph).execute(query).ranked
    }

    pub fn execute(&self, query: &Query) -> QueryOutcome {
        let tunables = query.tunables();
        let (seeds, roots) = self.resolve_scopes(query);

        let mut reports = Vec::new();
        let mut processed: Vec<Processed> = Vec::new();
        self.spread_all(seeds, tunables, &mut processed, &mut reports);
        self.combine_overlaps(tunables, &mut processed, &mut reports);

        let mut totals = Activation::new();
        for scope in &processed {
            for (&slot, &activation) in &scope.cumulative {
                *totals.entry(slot).or_insert(0.0) += activation;
            }
        }

        let mut ranked: Vec<ScoredNode> = totals
            .into_iter()
            .filter(|(slot, _)| !roots.contains(slot))
            .filter_map(|(slot, score)| {
                self.graph.node_at(slot).map(|node| ScoredNode {
                    id: node.id().to_identity(),
                    score,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = tunables.limit {
            ranked.truncate(limit);
        }

        debug!(
            scopes = reports.len(),
            results = ranked.len(),
            "activation query finished"
        );
        QueryOutcome {
            ranked,
            scopes: reports,
        }
    }

    /// Resolves root identities to slots and assigns scope bits. Roots the
    /// graph does not know are skipped.
    fn resolve_scopes(&self, query: &Query) -> (Vec<ScopeSeed>, BTreeSet<NodeSlot>) {
        let scopes = query.scopes();
        if scopes.len() > MAX_SCOPE_BITS {
            warn!(
                scopes = scopes.len(),
                max = MAX_SCOPE_BITS,
                "too many scopes; folding the overflow into the last scope bit"
            );
        }

        let mut roots = BTreeSet::new();
        let mut seeds: Vec<ScopeSeed> = Vec::with_capacity(scopes.len().min(MAX_SCOPE_BITS));
        for (i, scope) in scopes.iter().enumerate() {
            if i >= MAX_SCOPE_BITS {
                let last = &mut seeds[MAX_SCOPE_BITS - 1];
                for root in &scope.roots {
                    if let Some(slot) = self.graph.slot_of(root.id.borrowed()) {
                        roots.insert(slot);
                        *last.seeds.entry(slot).or_insert(0.0) += root.weight;
                    }
                }
                continue;
            }

            let mut activation = Activation::new();
            for root in &scope.roots {
                if let Some(slot) = self.graph.slot_of(root.id.borrowed()) {
                    roots.insert(slot);
                    *activation.entry(slot).or_insert(0.0) += root.weight;
                }
            }
            seeds.push(ScopeSeed {
                name: scope.name.clone(),
                mask: 1u32 << i,
                seeds: activation,
            });
        }
        (seeds, roots)
    }

    /// Runs one pass per seed in parallel and records the results in seed
    /// order. Returns once every pass has finished.
    fn spread_all(
        &self,
        seeds: Vec<ScopeSeed>,
        tunables: &QueryTunables,
        processed: &mut Vec<Processed>,
        reports: &mut Vec<ScopeReport>,
    ) {
        let passes: Vec<ScopePass<'_>> = seeds
            .par_iter()
            .map(|seed| ScopePass::new(self.graph, &seed.seeds).run(tunables))
            .collect();

        for (seed, pass) in seeds.into_iter().zip(passes) {
            reports.push(ScopeReport {
                name: seed.name.clone(),
                mask: seed.mask,
                state: pass.state,
                iterations: pass.iterations,
                seed_mass: seed.seeds.values().sum(),
                activated: pass.cumulative.values().filter(|a| **a > 0.0).count(),
            });
            processed.push(Processed {
                name: seed.name,
                mask: seed.mask,
                cumulative: pass.cumulative,
            });
        }
    }

    /// Repeatedly pairs up processed scopes whose activated sets intersect
    /// and spreads from the overlap, until a round creates nothing new.
    fn combine_overlaps(
        &self,
        tunables: &QueryTunables,
        processed: &mut Vec<Processed>,
        reports: &mut Vec<ScopeReport>,
    ) {
        let mut known_masks: HashSet<u32> = processed.iter().map(|p| p.mask).collect();
        let mut paired: HashSet<(usize, usize)> = HashSet::new();
        let mut created = 0usize;

        loop {
            let mut fresh = Vec::new();
            let mut capped = false;

            'pairs: for i in 0..processed.len() {
                for j in (i + 1)..processed.len() {
                    if !paired.insert((i, j)) {
                        continue;
                    }
                    let (a, b) = (&processed[i], &processed[j]);
                    let mask = a.mask | b.mask;
                    if known_masks.contains(&mask) {
                        continue;
                    }
                    let seeds = overlap_seeds(&a.cumulative, &b.cumulative, tunables.scope_overlap_multiplier);
                    if seeds.is_empty() {
                        continue;
                    }
                    if created >= tunables.max_combined_scopes {
                        warn!(
                            limit = tunables.max_combined_scopes,
                            "combined scope limit reached; stopping overlap search"
                        );
                        capped = true;
                        break 'pairs;
                    }
                    known_masks.insert(mask);
                    created += 1;
                    fresh.push(ScopeSeed {
                        name: format!("{}+{}", a.name, b.name),
                        mask,
                        seeds,
                    });
                }
            }

            if fresh.is_empty() {
                break;
            }
            debug!(combined = fresh.len(), "spreading from scope overlaps");
            self.spread_all(fresh, tunables, processed, reports);
            if capped {
                break;
            }
        }
    }
}

/// Seeds for a combined scope: every node both scopes activated, weighted
/// by `multiplier * (a + b)`.
fn overlap_seeds(a: &Activation, b: &Activation, multiplier: f32) -> Activation {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(slot, from_small)| {
            large
                .get(slot)
                .map(|from_large| (*slot, multiplier * (from_small + from_large)))
        })
        .collect()
}
