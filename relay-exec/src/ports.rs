//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services (broker, chat, mailbox).
//! Adapters implement these ports for specific services (Binance, Telegram,
//! stub, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use relay_domain::{AdminCommand, InboundMessage, Position, Price, Quantity, Side};

use crate::error::ExecError;

// =============================================================================
// Order Executor Port
// =============================================================================

/// Port for broker order placement.
///
/// Implementations:
/// - `StubExecutor` - immediate fills at a configured price
/// - `BinanceExecutor` - isolated margin market orders
///
/// `Err` means the broker could not be reached; a reachable broker that
/// refuses the order answers `Ok(OrderOutcome::Failure)`.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Open a position on `side` for `size` (already leveraged).
    async fn open(&self, side: Side, size: Quantity) -> Result<OrderOutcome, ExecError>;

    /// Close `position` with an opposite order for its recorded size.
    async fn close(&self, position: &Position) -> Result<OrderOutcome, ExecError>;
}

/// Leg of a decision, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderLeg {
    /// Closing the current position
    Close,
    /// Opening the new position
    Open,
}

impl fmt::Display for OrderLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderLeg::Close => write!(f, "close"),
            OrderLeg::Open => write!(f, "open"),
        }
    }
}

/// Tagged broker answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOutcome {
    /// Order filled
    Success(OrderReceipt),
    /// Order refused or not filled
    Failure {
        /// Broker-supplied reason
        reason: String,
    },
}

impl OrderOutcome {
    /// Shorthand for a failure outcome
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure { reason: reason.into() }
    }

    /// True for a filled order
    pub fn is_success(&self) -> bool {
        matches!(self, OrderOutcome::Success(_))
    }
}

/// Fill details of a successful order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    /// Broker-assigned order reference
    pub reference: String,
    /// Average fill price
    pub fill_price: Price,
    /// When the order was filled
    pub filled_at: DateTime<Utc>,
}

impl OrderReceipt {
    /// Receipt filled now
    pub fn new(reference: impl Into<String>, fill_price: Price) -> Self {
        Self {
            reference: reference.into(),
            fill_price,
            filled_at: Utc::now(),
        }
    }
}

// =============================================================================
// Notifier Port
// =============================================================================

/// Port for human-readable reports.
///
/// Delivery is best-effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send to the default destination.
    async fn send(&self, text: &str) -> Result<(), ExecError>;

    /// Send to a specific recipient. Defaults to the default destination.
    async fn send_to(&self, recipient: &str, text: &str) -> Result<(), ExecError> {
        let _ = recipient;
        self.send(text).await
    }
}

// =============================================================================
// Source Ports
// =============================================================================

/// Port for the signal channel.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Messages received since the last poll, oldest first.
    async fn poll(&self) -> Result<Vec<InboundMessage>, ExecError>;

    /// Return messages that were polled but not processed. The next poll
    /// yields them first, in the given order.
    async fn requeue(&self, messages: Vec<InboundMessage>);
}

/// Port for the administrative channel.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Commands received since the last poll, oldest first.
    async fn poll_commands(&self) -> Result<Vec<AdminCommand>, ExecError>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_outcome_serialization() {
        let outcome = OrderOutcome::Success(OrderReceipt::new(
            "12345",
            Price::new(dec!(95000)).unwrap(),
        ));

        let json = serde_json::to_string(&outcome).unwrap();
        let parsed: OrderOutcome = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, outcome);
        assert!(parsed.is_success());
    }

    #[test]
    fn test_failure_outcome() {
        let outcome = OrderOutcome::failure("insufficient margin");
        assert!(!outcome.is_success());
        assert_eq!(
            outcome,
            OrderOutcome::Failure {
                reason: "insufficient margin".to_string()
            }
        );
    }

    #[test]
    fn test_order_leg_display() {
        assert_eq!(OrderLeg::Close.to_string(), "close");
        assert_eq!(
            ExecError::OrderRejected {
                leg: OrderLeg::Open,
                reason: "no".to_string()
            }
            .to_string(),
            "open order rejected: no"
        );
    }
}
