//! Relay Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains trade signals, the tracked position, the simulation ledger
//! and the parser that turns raw message text into a [`Signal`].

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod parser;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{AdminCommand, CommandKind, EngineState, InboundMessage, Ledger, Position, Signal};
pub use parser::{parse_signal, ParseError, SignalFormat};
pub use value_objects::{Direction, DomainError, Leverage, MessageId, Price, Quantity, Side};
