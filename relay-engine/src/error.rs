//! Engine error types.

use relay_domain::DomainError;
use thiserror::Error;

/// Errors raised while deciding or settling a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Signal carries no size and no default size is configured
    #[error("Signal {0} has no size and no default size is configured")]
    MissingSize(String),

    /// A simulated fill needs a price the signal does not carry
    #[error("Signal {0} has no entry price; simulated fills need one")]
    MissingPrice(String),

    /// Decision does not fit the state it is applied to
    #[error("Stale decision: {0}")]
    StaleDecision(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
