//! Relay Daemon Library
//!
//! Runtime orchestrator for the relay: polls a signal channel, reconciles
//! each new signal against the single tracked position, and reports back.
//!
//! # Architecture
//!
//! ```text
//! Signal Source → Signal Processor → Engine → Executor → (Ledger | Broker)
//!                        ↑     ↓
//!          Admin loop ───┘   Notifier
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator (loops, API, shutdown)
//! - **Signal Processor**: dedup, parsing, reconciliation, admin commands
//! - **API**: HTTP status endpoints
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use relayd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let daemon = Daemon::from_config(config).await?;
//!     daemon.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod processor;

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, PollingConfig, TradingConfig, TradingMode};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use processor::{BatchInterrupted, CommandOutcome, MessageOutcome, SignalProcessor, StatusSnapshot};
