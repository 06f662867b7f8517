//! Errors surfaced by the relay daemon.

use relay_exec::ExecError;
use relay_store::StoreError;
use std::io;
use thiserror::Error;

/// Anything that can stop a poll cycle or daemon startup.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Reconciliation, broker, notifier or signal source failure
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Processed-id store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Missing or inconsistent settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Status API listener could not be set up
    #[error("API listener on {addr}: {source}")]
    Listener {
        addr: String,
        #[source]
        source: io::Error,
    },
}

pub type DaemonResult<T> = Result<T, DaemonError>;
