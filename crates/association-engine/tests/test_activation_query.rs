use std::time::Duration;
use synapse_assoc::query::{ScopeState, MAX_SCOPE_BITS};
use synapse_assoc::{
    ActivationQueryEngine, ArenaGraph, GraphStore, NodeIdentity, Query, QueryTunables, Scope, SnapshotWriter,
};

fn word(name: &str) -> NodeIdentity {
    NodeIdentity::word(name)
}

fn freeze(store: &GraphStore) -> ArenaGraph {
    let mut bytes = Vec::new();
    SnapshotWriter::for_store(store).write_store(store, &mut bytes).unwrap();
    ArenaGraph::load(bytes.as_slice()).unwrap()
}

/// `a -> c` and `b -> c`, with `c -> d` so that `c` has a node of its own.
/// Nothing points back at the roots.
fn fork_graph() -> ArenaGraph {
    let store = GraphStore::default();
    store.train(&word("a"), &word("c"), 1.0);
    store.train(&word("b"), &word("c"), 1.0);
    store.train(&word("c"), &word("d"), 1.0);
    freeze(&store)
}

#[test]
fn test_single_scope_ranks_neighbours() {
    let store = GraphStore::default();
    store.train(&word("faith"), &word("hope"), 3.0);
    store.train(&word("faith"), &word("charity"), 1.0);
    store.train(&word("hope"), &word("faith"), 1.0);
    store.train(&word("charity"), &word("faith"), 1.0);
    let graph = freeze(&store);

    let query = Query::new(
        vec![Scope::new("virtues").with_root(word("faith"), 1.0)],
        QueryTunables::default(),
    )
    .unwrap();
    let ranked = ActivationQueryEngine::run(&query, &graph);

    let ids: Vec<_> = ranked.iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids, vec![word("hope"), word("charity")]);
    assert!(ranked[0].score > ranked[1].score);
    assert!(ranked.iter().all(|n| n.id != word("faith")), "root leaked into results");
}

#[test]
fn test_overlapping_scopes_spawn_combined_scope() {
    let graph = fork_graph();
    let tunables = QueryTunables {
        scope_overlap_multiplier: 2.0,
        ..Default::default()
    };
    let query = Query::new(
        vec![
            Scope::new("left").with_root(word("a"), 2.0),
            Scope::new("right").with_root(word("b"), 1.0),
        ],
        tunables,
    )
    .unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);

    assert_eq!(outcome.scopes.len(), 3);
    let combined = &outcome.scopes[2];
    assert_eq!(combined.name, "left+right");
    assert_eq!(combined.mask, 0b11);
    assert_eq!(combined.state, ScopeState::Converged);
    // `c` received 2.0 * 0.5 from the left and 1.0 * 0.5 from the right.
    assert!((combined.seed_mass - 2.0 * (1.0 + 0.5)).abs() < 1e-6);

    assert_eq!(outcome.ranked.len(), 1);
    assert_eq!(outcome.ranked[0].id, word("c"));
    assert!((outcome.ranked[0].score - (1.0 + 0.5 + 3.0)).abs() < 1e-6);
}

#[test]
fn test_shared_root_seeds_combined_scope_with_both_weights() {
    let store = GraphStore::default();
    // `leaf` has no node of its own, so each pass only activates the root.
    store.train(&word("root"), &word("leaf"), 1.0);
    let graph = freeze(&store);

    let tunables = QueryTunables {
        scope_overlap_multiplier: 1.5,
        ..Default::default()
    };
    let query = Query::new(
        vec![
            Scope::new("first").with_root(word("root"), 0.75),
            Scope::new("second").with_root(word("root"), 2.0),
        ],
        tunables,
    )
    .unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);

    assert_eq!(outcome.scopes.len(), 3);
    assert!((outcome.scopes[2].seed_mass - 1.5 * (0.75 + 2.0)).abs() < 1e-6);
    assert!(outcome.ranked.is_empty(), "roots must not be ranked");
}

#[test]
fn test_shared_root_on_symmetric_graph_keeps_seed_weights() {
    let store = GraphStore::default();
    store.train_symmetric(&word("root"), &word("leaf"), 1.0);
    let graph = freeze(&store);

    let tunables = QueryTunables {
        scope_overlap_multiplier: 1.5,
        ..Default::default()
    };
    let query = Query::new(
        vec![
            Scope::new("a").with_root(word("root"), 0.75),
            Scope::new("b").with_root(word("root"), 2.0),
        ],
        tunables,
    )
    .unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);

    assert_eq!(outcome.scopes.len(), 3);
    // root: 1.5 * (0.75 + 2.0); leaf: 1.5 * (0.375 + 1.0).
    let expected = 1.5 * (0.75 + 2.0) + 1.5 * (0.375 + 1.0);
    assert!(
        (outcome.scopes[2].seed_mass - expected).abs() < 1e-5,
        "seed mass {}",
        outcome.scopes[2].seed_mass
    );
    assert_eq!(outcome.ranked.len(), 1);
    assert_eq!(outcome.ranked[0].id, word("leaf"));
}

#[test]
fn test_disjoint_scopes_stay_apart() {
    let store = GraphStore::default();
    store.train(&word("a"), &word("x"), 1.0);
    store.train(&word("b"), &word("y"), 1.0);
    store.train(&word("x"), &word("end"), 1.0);
    store.train(&word("y"), &word("end"), 1.0);
    let graph = freeze(&store);

    let query = Query::new(
        vec![
            Scope::new("one").with_root(word("a"), 1.0),
            Scope::new("two").with_root(word("b"), 1.0),
        ],
        QueryTunables::default(),
    )
    .unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);
    assert_eq!(outcome.scopes.len(), 2);
    assert_eq!(outcome.ranked.len(), 2);
}

#[test]
fn test_query_is_idempotent() {
    let graph = fork_graph();
    let query = Query::new(
        vec![
            Scope::new("left").with_root(word("a"), 1.0),
            Scope::new("right").with_root(word("b"), 0.5),
        ],
        QueryTunables::default(),
    )
    .unwrap();

    let engine = ActivationQueryEngine::new(&graph);
    let first = engine.execute(&query);
    let second = engine.execute(&query);
    assert_eq!(first.ranked, second.ranked);
    assert_eq!(first.scopes.len(), second.scopes.len());
}

#[test]
fn test_unknown_roots_yield_nothing() {
    let graph = fork_graph();
    let query = Query::new(
        vec![Scope::new("ghost").with_root(word("nowhere"), 1.0)],
        QueryTunables::default(),
    )
    .unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);
    assert!(outcome.ranked.is_empty());
    assert_eq!(outcome.scopes[0].seed_mass, 0.0);
    assert_eq!(outcome.scopes[0].state, ScopeState::Converged);
}

#[test]
fn test_scopes_past_the_mask_width_fold_into_last_bit() {
    let store = GraphStore::default();
    let count = MAX_SCOPE_BITS + 2;
    for i in 0..count {
        store.train(&word(&format!("r{}", i)), &word(&format!("leaf{}", i)), 1.0);
    }
    let graph = freeze(&store);

    let scopes = (0..count)
        .map(|i| Scope::new(format!("s{}", i)).with_root(word(&format!("r{}", i)), 1.0))
        .collect();
    let query = Query::new(scopes, QueryTunables::default()).unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);

    assert_eq!(outcome.scopes.len(), MAX_SCOPE_BITS);
    let last = &outcome.scopes[MAX_SCOPE_BITS - 1];
    assert_eq!(last.mask, 1 << 31);
    assert_eq!(last.seed_mass, 3.0);
}

/// `serve -> ping` with `ping <-> pong`: the cycle never passes back
/// through the root.
fn rally_graph() -> ArenaGraph {
    let store = GraphStore::default();
    store.train(&word("serve"), &word("ping"), 1.0);
    store.train_symmetric(&word("ping"), &word("pong"), 1.0);
    freeze(&store)
}

#[test]
fn test_cycle_without_floor_times_out() {
    let graph = rally_graph();
    let tunables = QueryTunables {
        min_activation: 0.0,
        max_search_time: Duration::from_millis(5),
        ..Default::default()
    };
    let query = Query::new(vec![Scope::new("loop").with_root(word("serve"), 1.0)], tunables).unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);

    assert_eq!(outcome.scopes[0].state, ScopeState::TimedOut);
    assert!(outcome.scopes[0].iterations > 0);
    assert_eq!(outcome.ranked[0].id, word("ping"));
}

#[test]
fn test_cycle_with_floor_converges() {
    let graph = rally_graph();
    let query = Query::new(
        vec![Scope::new("loop").with_root(word("serve"), 1.0)],
        QueryTunables::default(),
    )
    .unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);
    assert_eq!(outcome.scopes[0].state, ScopeState::Converged);
    assert_eq!(outcome.ranked.len(), 2);
}

#[test]
fn test_activation_does_not_return_to_own_root() {
    let store = GraphStore::default();
    store.train_symmetric(&word("ping"), &word("pong"), 1.0);
    let graph = freeze(&store);

    let query = Query::new(
        vec![Scope::new("loop").with_root(word("ping"), 1.0)],
        QueryTunables::default(),
    )
    .unwrap();
    let outcome = ActivationQueryEngine::new(&graph).execute(&query);
    // ping -> pong spreads once; pong -> ping is dropped, so the pass ends.
    assert_eq!(outcome.scopes[0].state, ScopeState::Converged);
    assert_eq!(outcome.scopes[0].iterations, 2);
    assert_eq!(outcome.ranked.len(), 1);
    assert_eq!(outcome.ranked[0].score, 0.5);
}

#[test]
fn test_limit_truncates_ranking() {
    let store = GraphStore::default();
    for i in 0..10 {
        let leaf = word(&format!("leaf{}", i));
        store.train(&word("hub"), &leaf, 1.0 + i as f32);
        store.train(&leaf, &word("sink"), 1.0);
    }
    let graph = freeze(&store);

    let tunables = QueryTunables {
        limit: Some(3),
        ..Default::default()
    };
    let query = Query::new(vec![Scope::new("hub").with_root(word("hub"), 1.0)], tunables).unwrap();
    let ranked = ActivationQueryEngine::run(&query, &graph);
    assert_eq!(ranked.len(), 3);
    assert_eq!(ranked[0].id, word("leaf9"));
    assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
}
