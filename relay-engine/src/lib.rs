//! Relay Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes the current position and a signal → returns the actions to execute.
//!
//! # Transition table
//!
//! ```text
//! current   signal   actions
//! -------   ------   -------------------------
//! flat      BUY      open LONG
//! flat      SELL     open SHORT
//! LONG      BUY      none (hold)
//! SHORT     SELL     none (hold)
//! LONG      SELL     close LONG, open SHORT
//! SHORT     BUY      close SHORT, open LONG
//! ```

#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod pnl;

pub use engine::{Engine, EngineAction, EngineDecision, Settlement, Transition};
pub use error::{EngineError, EngineResult};
pub use pnl::realized_pnl;
