use thiserror::Error;

/// Canonical result for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dimension mismatch on {variable}: domain size {left} vs {right}")]
    DimensionMismatch {
        variable: String,
        left: usize,
        right: usize,
    },

    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("value {value} out of range for {variable} (domain size {domain_size})")]
    ValueOutOfRange {
        variable: String,
        value: usize,
        domain_size: usize,
    },

    #[error("incomplete instantiation: {0}")]
    IncompleteInstantiation(String),

    #[error("domain size overflow: the product of the domain sizes does not fit in memory")]
    DomainOverflow,

    #[error("cannot combine an empty set of tables")]
    EmptyCombination,

    #[error("degenerate distribution: {0}")]
    DegenerateDistribution(String),

    #[error("tables have incompatible zero patterns")]
    ZeroPatternMismatch,

    #[error("memory budget exceeded: requested {requested} bytes, capacity {capacity}")]
    BudgetExceeded { requested: usize, capacity: usize },

    #[error("schedule error: {0}")]
    Schedule(String),

    #[error("operation `{0}` has already been executed")]
    AlreadyExecuted(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
