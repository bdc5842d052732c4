//! Spreading-activation queries over a loaded [`ArenaGraph`](crate::snapshot::ArenaGraph).

mod engine;

pub use engine::{ActivationQueryEngine, QueryOutcome, ScopeReport, ScopeState, ScoredNode, MAX_SCOPE_BITS};

use crate::config::{DEFAULT_MAX_COMBINED_SCOPES, DEFAULT_MAX_SEARCH_MS, DEFAULT_MIN_ACTIVATION, DEFAULT_OVERLAP_MULTIPLIER};
use crate::error::{QueryError, ScopeParseError};
use crate::identity::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

fn unit_weight() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeRoot {
    pub id: NodeIdentity,
    #[serde(default = "unit_weight")]
    pub weight: f32,
}

/// A named, weighted set of roots that activation spreads out from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    pub roots: Vec<ScopeRoot>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roots: Vec::new(),
        }
    }

    pub fn with_root(mut self, id: NodeIdentity, weight: f32) -> Self {
        self.roots.push(ScopeRoot { id, weight });
        self
    }
}

/// `name=category:term[@weight][,category:term[@weight]...]`
impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, roots) = s
            .split_once('=')
            .ok_or_else(|| ScopeParseError::MissingName(s.to_string()))?;
        let mut scope = Scope::new(name.trim());
        for root in roots.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            let (id, weight) = match root.rsplit_once('@') {
                Some((id, raw)) => (
                    id,
                    raw.trim()
                        .parse::<f32>()
                        .map_err(|_| ScopeParseError::BadWeight(raw.to_string()))?,
                ),
                None => (root, 1.0),
            };
            let id = id.parse().map_err(|source| ScopeParseError::BadRoot {
                root: root.to_string(),
                source,
            })?;
            scope = scope.with_root(id, weight);
        }
        if scope.roots.is_empty() {
            return Err(ScopeParseError::NoRoots(s.to_string()));
        }
        Ok(scope)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Knobs shared by every scope of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTunables {
    /// Activation floor; anything below it stops spreading. In [0, 1].
    pub min_activation: f32,
    /// Wall-clock budget per scope pass, checked between iterations.
    #[serde(rename = "max_search_ms", with = "duration_ms")]
    pub max_search_time: Duration,
    /// Scale applied to the summed activation where two scopes overlap.
    pub scope_overlap_multiplier: f32,
    /// Upper bound on combined scopes created by one query.
    pub max_combined_scopes: usize,
    /// Truncate the ranked output to this many nodes.
    pub limit: Option<usize>,
}

impl Default for QueryTunables {
    fn default() -> Self {
        Self {
            min_activation: DEFAULT_MIN_ACTIVATION,
            max_search_time: Duration::from_millis(DEFAULT_MAX_SEARCH_MS),
            scope_overlap_multiplier: DEFAULT_OVERLAP_MULTIPLIER,
            max_combined_scopes: DEFAULT_MAX_COMBINED_SCOPES,
            limit: None,
        }
    }
}

impl QueryTunables {
    fn validate(&self) -> Result<(), QueryError> {
        if !(0.0..=1.0).contains(&self.min_activation) {
            return Err(QueryError::MinActivationOutOfRange(self.min_activation));
        }
        if self.max_search_time.is_zero() {
            return Err(QueryError::NonPositiveSearchTime);
        }
        if self.scope_overlap_multiplier.is_nan() || self.scope_overlap_multiplier < 0.0 {
            return Err(QueryError::NegativeOverlapMultiplier(self.scope_overlap_multiplier));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawQuery {
    scopes: Vec<Scope>,
    #[serde(default)]
    tunables: QueryTunables,
}

/// A validated query. Construction fails before any search work if a
/// tunable is out of range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawQuery")]
pub struct Query {
    scopes: Vec<Scope>,
    tunables: QueryTunables,
}

impl Query {
    pub fn new(scopes: Vec<Scope>, tunables: QueryTunables) -> Result<Self, QueryError> {
        if scopes.is_empty() {
            return Err(QueryError::NoScopes);
        }
        tunables.validate()?;
        for scope in &scopes {
            if let Some(root) = scope.roots.iter().find(|root| !root.weight.is_finite()) {
                return Err(QueryError::NonFiniteWeight {
                    scope: scope.name.clone(),
                    root: root.id.to_string(),
                });
            }
        }
        Ok(Self { scopes, tunables })
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn tunables(&self) -> &QueryTunables {
        &self.tunables
    }
}

impl TryFrom<RawQuery> for Query {
    type Error = QueryError;

    fn try_from(raw: RawQuery) -> Result<Self, Self::Error> {
        Query::new(raw.scopes, raw.tunables)
    }
}
