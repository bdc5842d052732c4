use crate::query::QueryTunables;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_EDGE_CAPACITY: usize = 64;
pub const DEFAULT_INITIAL_BINS: usize = 1024;
pub const DEFAULT_MAX_BINS: usize = 1 << 24;
pub const DEFAULT_LOAD_RATIO: usize = 3;

pub const DEFAULT_MIN_ACTIVATION: f32 = 0.01;
pub const DEFAULT_MAX_SEARCH_MS: u64 = 250;
pub const DEFAULT_OVERLAP_MULTIPLIER: f32 = 1.0;
pub const DEFAULT_MAX_COMBINED_SCOPES: usize = 256;

/// Read an environment variable, falling back to `default` when it is unset
/// or does not parse.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Sizing of the mutable graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum edges retained per node (floored at 4).
    pub edge_capacity: usize,
    /// Bin count the table starts with; rounded up to a power of two.
    pub initial_bins: usize,
    /// Hard ceiling on the bin count; once reached the table stops growing.
    pub max_bins: usize,
    /// Items per bin that triggers a doubling.
    pub load_ratio: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            edge_capacity: DEFAULT_EDGE_CAPACITY,
            initial_bins: DEFAULT_INITIAL_BINS,
            max_bins: DEFAULT_MAX_BINS,
            load_ratio: DEFAULT_LOAD_RATIO,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            edge_capacity: env_or("SYNAPSE_EDGE_CAPACITY", defaults.edge_capacity),
            initial_bins: env_or("SYNAPSE_INITIAL_BINS", defaults.initial_bins),
            max_bins: env_or("SYNAPSE_MAX_BINS", defaults.max_bins),
            load_ratio: env_or("SYNAPSE_LOAD_RATIO", defaults.load_ratio),
        }
    }

    pub fn with_edge_capacity(mut self, edge_capacity: usize) -> Self {
        self.edge_capacity = edge_capacity;
        self
    }

    pub fn with_bins(mut self, initial_bins: usize, max_bins: usize) -> Self {
        self.initial_bins = initial_bins;
        self.max_bins = max_bins;
        self
    }
}

impl QueryTunables {
    /// Tunables from `SYNAPSE_*` environment variables. Values are not
    /// validated here; `Query::new` does that.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let limit = std::env::var("SYNAPSE_RESULT_LIMIT")
            .ok()
            .and_then(|s| s.trim().parse().ok());
        Self {
            min_activation: env_or("SYNAPSE_MIN_ACTIVATION", defaults.min_activation),
            max_search_time: Duration::from_millis(env_or(
                "SYNAPSE_MAX_SEARCH_MS",
                DEFAULT_MAX_SEARCH_MS,
            )),
            scope_overlap_multiplier: env_or(
                "SYNAPSE_OVERLAP_MULTIPLIER",
                defaults.scope_overlap_multiplier,
            ),
            max_combined_scopes: env_or("SYNAPSE_MAX_COMBINED", defaults.max_combined_scopes),
            limit,
        }
    }
}
