//! A weighted associative concept graph.
//!
//! Associations are trained into a concurrent [`GraphStore`], frozen into a
//! binary snapshot, loaded back as an [`ArenaGraph`] and queried with
//! multi-scope spreading activation through [`ActivationQueryEngine`].

pub mod config;
pub mod edges;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod persistence;
pub mod query;
pub mod snapshot;
pub mod store;

pub use config::StoreConfig;
pub use edges::{BoundedEdgeSet, Edge, IncrementOutcome};
pub use error::{IdentityParseError, QueryError, ScopeParseError, SnapshotError};
pub use identity::{Category, IdentityRef, NodeIdentity};
pub use query::{ActivationQueryEngine, Query, QueryOutcome, QueryTunables, Scope, ScoredNode};
pub use snapshot::{ArenaGraph, SnapshotWriter};
pub use store::GraphStore;
