use thiserror::Error;

/// Errors raised by `AgentRegistry`/`SectorRegistry` CRUD and validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("role '{0}' is not a recognized role token")]
    UnknownRole(String),

    #[error("{0} must be in [{1}, {2}], got {3}")]
    OutOfRange(String, f64, f64, f64),
}

/// Raised when a referenced id does not exist.
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("agent '{0}' not found")]
    Agent(String),

    #[error("sector '{0}' not found")]
    Sector(uuid::Uuid),

    #[error("discussion '{0}' not found")]
    Discussion(uuid::Uuid),
}

/// Raised when a capacity limit would be exceeded by a create operation.
#[derive(Debug, Error)]
pub enum CapacityExceededError {
    #[error("global agent count {current} >= MAX_TOTAL_AGENTS {max}")]
    TotalAgents { current: usize, max: usize },

    #[error("sector '{sector_id}' agent count {current} >= MAX_AGENTS_PER_SECTOR {max}")]
    SectorAgents {
        sector_id: uuid::Uuid,
        current: usize,
        max: usize,
    },
}

/// Raised when a `DiscussionRoom` state transition is attempted out of order.
#[derive(Debug, Error)]
pub enum IllegalStateTransitionError {
    #[error("discussion '{id}' cannot move from {from:?} to {to:?}")]
    Forward {
        id: uuid::Uuid,
        from: crate::domain::discussion::DiscussionStatus,
        to: crate::domain::discussion::DiscussionStatus,
    },

    #[error("discussion '{id}' precondition not met: {reason}")]
    Precondition { id: uuid::Uuid, reason: String },
}

/// Raised when the `ReasoningOracle` boundary cannot produce a usable response.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle is disabled")]
    Disabled,

    #[error("oracle call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("oracle response was not parseable JSON: {0}")]
    Unparseable(String),

    #[error("oracle transport error: {0}")]
    Transport(String),
}

/// Raised by `PersistenceStore` on I/O failure. The prior state remains visible on disk.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read document '{name}': {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write document '{name}': {source}")]
    Write {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse document '{name}' as JSON: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Unified engine-facing error. Periodic drivers log and skip on any of these;
/// user-initiated operations propagate them to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceededError),

    #[error(transparent)]
    IllegalStateTransition(#[from] IllegalStateTransitionError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type EngineResult<T> = Result<T, EngineError>;
