use thiserror::Error;

/// Failure to parse the `category:name` text form of an identity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityParseError {
    #[error("missing ':' separator in identity {0:?}")]
    MissingSeparator(String),

    #[error("unknown category {0:?}")]
    UnknownCategory(String),
}

/// Failure to parse a `name=category:term[@weight],...` scope.
#[derive(Debug, Error, PartialEq)]
pub enum ScopeParseError {
    #[error("scope {0:?} is missing '=' between name and roots")]
    MissingName(String),

    #[error("scope {0:?} has no roots")]
    NoRoots(String),

    #[error("bad root {root:?}: {source}")]
    BadRoot {
        root: String,
        #[source]
        source: IdentityParseError,
    },

    #[error("bad weight {0:?}")]
    BadWeight(String),
}

/// Rejected query parameters. Raised before any search work starts.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("a query needs at least one scope")]
    NoScopes,

    #[error("min_activation must lie in [0, 1], got {0}")]
    MinActivationOutOfRange(f32),

    #[error("max_search_time must be positive")]
    NonPositiveSearchTime,

    #[error("scope_overlap_multiplier must be non-negative, got {0}")]
    NegativeOverlapMultiplier(f32),

    #[error("root weight for {root} in scope {scope:?} is not finite")]
    NonFiniteWeight { scope: String, root: String },
}

/// Fatal snapshot encode/decode failure. A failed load never yields a graph.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot truncated: {0}")]
    Truncated(&'static str),

    #[error("negative node count {0}")]
    NegativeNodeCount(i32),

    #[error("node end offsets not strictly increasing at node {index}: {previous} -> {current}")]
    NonMonotonicOffset {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("node {index} spans {expected} bytes but its record decodes to {actual}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("name of {len} bytes exceeds the encodable maximum")]
    NameTooLong { len: usize },

    #[error("node name is not valid utf-8")]
    InvalidName(#[from] std::str::Utf8Error),

    #[error("snapshot holds {0} nodes, more than the format can address")]
    TooManyNodes(usize),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
