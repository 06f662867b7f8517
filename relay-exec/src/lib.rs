//! Relay Execution Layer
//!
//! Carries engine decisions out, either against the simulation ledger or
//! against a broker.
//!
//! # Architecture
//!
//! ```text
//! Engine Decision → Executor → (Ledger | OrderExecutor) → ExecutionReport
//! ```
//!
//! # Components
//!
//! - **Ports**: traits for the broker, the notifier and the message sources
//! - **Executor**: runs a decision's legs in order, stopping at the first failure
//! - **Stub**: scripted implementations of every port for development and tests
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_exec::{Executor, StubExecutor};
//! use std::sync::Arc;
//!
//! let broker = Arc::new(StubExecutor::new(dec!(100)));
//! let executor = Executor::live(engine, broker);
//!
//! let report = executor.execute(&mut state, &decision).await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use executor::{ExecutionMode, ExecutionReport, Executor};
pub use ports::{
    CommandSource, Notifier, OrderExecutor, OrderLeg, OrderOutcome, OrderReceipt, SignalSource,
};
pub use stub::{RecordingNotifier, ScriptedCommands, ScriptedSource, StubCall, StubExecutor};
