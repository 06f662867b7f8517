//! Reconciliation decisions.
//!
//! [`Engine::decide`] compares a signal with the current position and returns
//! the minimal close/open actions. [`Engine::settle_simulated`] applies a
//! decision to the simulation ledger; live execution happens elsewhere.

use relay_domain::{EngineState, Leverage, MessageId, Position, Price, Quantity, Side, Signal};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::pnl::realized_pnl;

// =============================================================================
// Decision types
// =============================================================================

/// What a decision does to the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Transition {
    /// Flat → side
    Open(Side),
    /// Already on this side, nothing to do
    Hold(Side),
    /// Close `from`, then open `to`
    Reverse { from: Side, to: Side },
}

/// A single step of a decision. Steps run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Close the current position
    Close {
        position: Position,
        /// Exit price stated by the signal (market price in live mode)
        exit_price: Option<Price>,
    },

    /// Open a new position
    Open {
        side: Side,
        /// Leveraged size
        size: Quantity,
        /// Entry price stated by the signal (market price in live mode)
        entry_price: Option<Price>,
    },
}

/// Output of [`Engine::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDecision {
    /// Signal that triggered the decision
    pub signal_id: MessageId,
    pub transition: Transition,
    pub actions: Vec<EngineAction>,
}

impl EngineDecision {
    /// True when the decision changes nothing
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Outcome of a simulated settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Profit realized by a close, if one happened
    pub realized_pnl: Option<Decimal>,
    /// Ledger balance afterwards
    pub balance: Decimal,
}

// =============================================================================
// Engine
// =============================================================================

/// Pure reconciliation engine.
#[derive(Debug, Clone)]
pub struct Engine {
    leverage: Leverage,
    default_size: Option<Quantity>,
}

impl Engine {
    /// Create an engine with a fixed leverage
    pub fn new(leverage: Leverage) -> Self {
        Self {
            leverage,
            default_size: None,
        }
    }

    /// Size used for signals that do not state one
    pub fn with_default_size(mut self, size: Quantity) -> Self {
        self.default_size = Some(size);
        self
    }

    /// Fixed leverage
    pub fn leverage(&self) -> Leverage {
        self.leverage
    }

    /// Decide what `signal` means for the current position.
    ///
    /// # Errors
    /// `EngineError::MissingSize` when a position must be opened but neither
    /// the signal nor the engine provides a size.
    pub fn decide(&self, current: Option<&Position>, signal: &Signal) -> EngineResult<EngineDecision> {
        let target = signal.direction.target_side();

        let (transition, actions) = match current {
            Some(position) if position.side == target => (Transition::Hold(target), Vec::new()),
            Some(position) => (
                Transition::Reverse {
                    from: position.side,
                    to: target,
                },
                vec![
                    EngineAction::Close {
                        position: position.clone(),
                        exit_price: signal.entry_price,
                    },
                    self.open_action(target, signal)?,
                ],
            ),
            None => (Transition::Open(target), vec![self.open_action(target, signal)?]),
        };

        debug!(
            signal_id = %signal.id,
            direction = %signal.direction,
            ?transition,
            actions = actions.len(),
            "Engine decision"
        );

        Ok(EngineDecision {
            signal_id: signal.id.clone(),
            transition,
            actions,
        })
    }

    fn open_action(&self, side: Side, signal: &Signal) -> EngineResult<EngineAction> {
        let stated = signal
            .size
            .or(self.default_size)
            .ok_or_else(|| EngineError::MissingSize(signal.id.to_string()))?;

        Ok(EngineAction::Open {
            side,
            size: self.leverage.apply(stated)?,
            entry_price: signal.entry_price,
        })
    }

    /// Apply a decision to the simulation ledger at the signal's prices.
    ///
    /// All-or-nothing: on error `state` is left untouched.
    pub fn settle_simulated(
        &self,
        state: &mut EngineState,
        decision: &EngineDecision,
    ) -> EngineResult<Settlement> {
        let mut position = state.position.clone();
        let mut realized = None;

        for action in &decision.actions {
            match action {
                EngineAction::Close {
                    position: closing,
                    exit_price,
                } => {
                    if position.as_ref() != Some(closing) {
                        return Err(EngineError::StaleDecision(format!(
                            "close of {} {} does not match current position",
                            closing.side, closing.opened_by
                        )));
                    }
                    let exit = exit_price
                        .ok_or_else(|| EngineError::MissingPrice(decision.signal_id.to_string()))?;
                    realized = Some(realized_pnl(closing, exit)?);
                    position = None;
                }
                EngineAction::Open {
                    side,
                    size,
                    entry_price,
                } => {
                    if position.is_some() {
                        return Err(EngineError::StaleDecision(format!(
                            "open {} while a position is still open",
                            side
                        )));
                    }
                    let entry = entry_price
                        .ok_or_else(|| EngineError::MissingPrice(decision.signal_id.to_string()))?;
                    position = Some(Position::open(*side, entry, *size, decision.signal_id.clone()));
                }
            }
        }

        let balance = match realized {
            Some(profit) => state.ledger.balance_after(profit)?,
            None => state.ledger.balance(),
        };

        // Commit
        if let Some(profit) = realized {
            state.ledger.credit(profit)?;
        }
        state.position = position;

        Ok(Settlement {
            realized_pnl: realized,
            balance,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
