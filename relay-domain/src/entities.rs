//! Domain Entities for Relay
//!
//! The single tracked position, the simulation ledger, and the
//! messages/commands that flow into the reconciliation loop.

use crate::value_objects::{Direction, DomainError, Leverage, MessageId, Price, Quantity, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Inbound messages
// =============================================================================

/// A raw message handed over by a signal source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Source-assigned identifier, never reused
    pub id: MessageId,
    /// Raw message text
    pub text: String,
    /// Identity of whoever posted the message, when the source knows it
    pub sender: Option<String>,
}

impl InboundMessage {
    /// Create a message without a known sender
    pub fn new(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            sender: None,
        }
    }

    /// Attach the sender identity
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}

// =============================================================================
// Signal
// =============================================================================

/// Canonical trade instruction parsed from a message.
///
/// Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Identifier of the message this signal came from
    pub id: MessageId,
    /// Instrument as written in the message (e.g. BTCUSD)
    pub pair: String,
    /// Requested direction
    pub direction: Direction,
    /// Stated entry price, if the format carries one
    pub entry_price: Option<Price>,
    /// Stated (unleveraged) size, if the format carries one
    pub size: Option<Quantity>,
    /// Original message text, echoed back in notifications
    pub text: String,
}

// =============================================================================
// Position
// =============================================================================

/// The single open directional position.
///
/// `size` is the leveraged notional, already multiplied by the leverage
/// factor when the position was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Long or short
    pub side: Side,
    /// Signal entry (simulated) or broker fill (live)
    pub entry_price: Price,
    /// Leveraged size
    pub size: Quantity,
    /// Message that opened this position
    pub opened_by: MessageId,
    /// Broker reference of the opening order (live mode only)
    pub order_reference: Option<String>,
    /// When the position was opened
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Open a new position
    pub fn open(side: Side, entry_price: Price, size: Quantity, opened_by: MessageId) -> Self {
        Self {
            side,
            entry_price,
            size,
            opened_by,
            order_reference: None,
            opened_at: Utc::now(),
        }
    }

    /// Record the broker reference of the opening order
    pub fn with_order_reference(mut self, reference: impl Into<String>) -> Self {
        self.order_reference = Some(reference.into());
        self
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Simulated account balance.
///
/// Mutated only by realized closes and by the administrative reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    balance: Decimal,
    initial_balance: Decimal,
    leverage: Leverage,
}

impl Ledger {
    /// Create a ledger at its initial balance
    pub fn new(initial_balance: Decimal, leverage: Leverage) -> Self {
        Self {
            balance: initial_balance,
            initial_balance,
            leverage,
        }
    }

    /// Current balance
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Configured starting balance
    pub fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    /// Fixed leverage for the process lifetime
    pub fn leverage(&self) -> Leverage {
        self.leverage
    }

    /// Balance after crediting `profit`, without mutating the ledger.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidBalance` if the sum overflows
    pub fn balance_after(&self, profit: Decimal) -> Result<Decimal, DomainError> {
        self.balance.checked_add(profit).ok_or_else(|| {
            DomainError::InvalidBalance(format!("{} + {} overflows", self.balance, profit))
        })
    }

    /// Add realized profit (negative for a loss).
    pub fn credit(&mut self, profit: Decimal) -> Result<Decimal, DomainError> {
        self.balance = self.balance_after(profit)?;
        Ok(self.balance)
    }

    /// Restore the initial balance
    pub fn reset(&mut self) {
        self.balance = self.initial_balance;
    }
}

// =============================================================================
// Engine State
// =============================================================================

/// Everything the reconciliation loop and the admin listener share.
///
/// Exactly one instance exists per process, behind a single lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    /// The open position, `None` when flat
    pub position: Option<Position>,
    /// Simulation ledger (balance is informational in live mode)
    pub ledger: Ledger,
}

impl EngineState {
    /// Flat state with a fresh ledger
    pub fn new(ledger: Ledger) -> Self {
        Self { position: None, ledger }
    }

    /// Side of the open position, if any
    pub fn side(&self) -> Option<Side> {
        self.position.as_ref().map(|p| p.side)
    }

    /// Administrative reset: initial balance, no position.
    pub fn reset(&mut self) {
        self.position = None;
        self.ledger.reset();
    }
}

// =============================================================================
// Admin commands
// =============================================================================

/// Administrative command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Restore initial balance and clear the position
    Reset,
}

/// An administrative command with the identity that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCommand {
    /// What to do
    pub kind: CommandKind,
    /// Identity checked against the operator allow-list
    pub issuer: Option<String>,
}

impl AdminCommand {
    /// Reset issued by `issuer`
    pub fn reset(issuer: Option<String>) -> Self {
        Self {
            kind: CommandKind::Reset,
            issuer,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger() -> Ledger {
        Ledger::new(dec!(1000), Leverage::new(10).unwrap())
    }

    #[test]
    fn test_ledger_credit_and_reset() {
        let mut ledger = ledger();

        assert_eq!(ledger.credit(dec!(50)).unwrap(), dec!(1050));
        assert_eq!(ledger.credit(dec!(-75.5)).unwrap(), dec!(974.5));

        ledger.reset();
        assert_eq!(ledger.balance(), dec!(1000));
        assert_eq!(ledger.initial_balance(), dec!(1000));
    }

    #[test]
    fn test_ledger_overflow_is_rejected() {
        let mut ledger = Ledger::new(Decimal::MAX, Leverage::new(1).unwrap());
        assert!(matches!(ledger.credit(dec!(1)), Err(DomainError::InvalidBalance(_))));
        assert_eq!(ledger.balance(), Decimal::MAX);
    }

    #[test]
    fn test_engine_state_reset_clears_position() {
        let mut state = EngineState::new(ledger());
        state.position = Some(Position::open(
            Side::Long,
            Price::new(dec!(100)).unwrap(),
            Quantity::new(dec!(500)).unwrap(),
            MessageId::new("1").unwrap(),
        ));
        state.ledger.credit(dec!(25)).unwrap();

        assert_eq!(state.side(), Some(Side::Long));

        state.reset();

        assert_eq!(state.side(), None);
        assert_eq!(state.ledger.balance(), dec!(1000));
    }

    #[test]
    fn test_inbound_message_builder() {
        let msg = InboundMessage::new(MessageId::new("7").unwrap(), "Pair: BTCUSD").with_sender("-100");
        assert_eq!(msg.sender.as_deref(), Some("-100"));
    }
}
