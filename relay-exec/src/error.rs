//! Execution layer error types.

use thiserror::Error;

use crate::ports::OrderLeg;

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Broker, chat or mailbox could not be reached
    #[error("Transport error: {0}")]
    Transport(String),

    /// Broker answered but did not fill the order
    #[error("{leg} order rejected: {reason}")]
    OrderRejected {
        /// Which leg of the decision failed
        leg: OrderLeg,
        /// Broker-supplied reason
        reason: String,
    },

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] relay_engine::EngineError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] relay_domain::DomainError),

    /// Decision no longer matches the shared state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExecError {
    /// True for failures the next poll cycle may not hit again
    pub fn is_transport(&self) -> bool {
        matches!(self, ExecError::Transport(_))
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
