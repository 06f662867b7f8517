//! Executor: carries engine decisions out.
//!
//! The Executor is the bridge between the pure Engine (decisions) and the
//! impure broker (I/O). In simulated mode it settles the decision against
//! the ledger; in live mode it places one broker order per leg.
//!
//! # Flow
//!
//! ```text
//! Engine Decision → Executor → (Ledger | OrderExecutor) → ExecutionReport
//! ```
//!
//! Live legs run strictly in order. A leg that fails stops the decision, so
//! the position is never left half-reversed: a failed close keeps the old
//! position and skips the open; a failed open after a successful close
//! leaves the state flat.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};

use relay_domain::{EngineState, MessageId, Position};
use relay_engine::{Engine, EngineAction, EngineDecision, Transition};

use crate::error::{ExecError, ExecResult};
use crate::ports::{OrderExecutor, OrderLeg, OrderOutcome, OrderReceipt};

// =============================================================================
// Execution Report
// =============================================================================

/// What an executed decision did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Signal that triggered the decision
    pub signal_id: MessageId,
    pub transition: Transition,
    /// Profit credited to the ledger (simulated mode only)
    pub realized_pnl: Option<Decimal>,
    /// Ledger balance afterwards
    pub balance: Decimal,
    /// Broker receipts, one per leg (live mode only)
    pub receipts: Vec<(OrderLeg, OrderReceipt)>,
}

// =============================================================================
// Executor
// =============================================================================

/// Where decisions are carried out.
#[derive(Clone)]
pub enum ExecutionMode {
    /// Ledger only, at the prices stated by the signal
    Simulated,
    /// Real orders through a broker port
    Live(Arc<dyn OrderExecutor>),
}

impl ExecutionMode {
    /// Mode name for logs and the status API
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionMode::Simulated => "simulated",
            ExecutionMode::Live(_) => "live",
        }
    }
}

/// Executes engine decisions against the shared state.
pub struct Executor {
    engine: Engine,
    mode: ExecutionMode,
}

impl Executor {
    /// Create an executor in the given mode.
    pub fn new(engine: Engine, mode: ExecutionMode) -> Self {
        Self { engine, mode }
    }

    /// Ledger-only executor
    pub fn simulated(engine: Engine) -> Self {
        Self::new(engine, ExecutionMode::Simulated)
    }

    /// Broker-backed executor
    pub fn live(engine: Engine, broker: Arc<dyn OrderExecutor>) -> Self {
        Self::new(engine, ExecutionMode::Live(broker))
    }

    /// Current mode
    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Engine used to settle simulated decisions
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Execute a decision.
    ///
    /// The caller holds the state lock for the whole call, so a reset cannot
    /// interleave with the legs.
    ///
    /// # Errors
    /// - `ExecError::Engine` when a simulated decision cannot be settled
    /// - `ExecError::OrderRejected` / `ExecError::Transport` when a live leg fails;
    ///   legs that already completed stay applied
    pub async fn execute(
        &self,
        state: &mut EngineState,
        decision: &EngineDecision,
    ) -> ExecResult<ExecutionReport> {
        match &self.mode {
            ExecutionMode::Simulated => {
                let settlement = self.engine.settle_simulated(state, decision)?;

                info!(
                    signal_id = %decision.signal_id,
                    transition = ?decision.transition,
                    realized_pnl = ?settlement.realized_pnl,
                    balance = %settlement.balance,
                    "Decision settled"
                );

                Ok(ExecutionReport {
                    signal_id: decision.signal_id.clone(),
                    transition: decision.transition,
                    realized_pnl: settlement.realized_pnl,
                    balance: settlement.balance,
                    receipts: Vec::new(),
                })
            },
            ExecutionMode::Live(broker) => self.execute_live(broker.as_ref(), state, decision).await,
        }
    }

    async fn execute_live(
        &self,
        broker: &dyn OrderExecutor,
        state: &mut EngineState,
        decision: &EngineDecision,
    ) -> ExecResult<ExecutionReport> {
        let mut receipts = Vec::with_capacity(decision.actions.len());

        for action in &decision.actions {
            match action {
                EngineAction::Close { position, .. } => {
                    if state.position.as_ref() != Some(position) {
                        return Err(ExecError::InvalidState(format!(
                            "close of {} opened by {} does not match current position",
                            position.side, position.opened_by
                        )));
                    }

                    info!(
                        signal_id = %decision.signal_id,
                        side = %position.side,
                        size = %position.size,
                        "Placing close order"
                    );

                    let receipt = settle_leg(OrderLeg::Close, &decision.signal_id, broker.close(position).await)?;

                    info!(
                        signal_id = %decision.signal_id,
                        reference = %receipt.reference,
                        fill_price = %receipt.fill_price,
                        "Close order filled"
                    );

                    state.position = None;
                    receipts.push((OrderLeg::Close, receipt));
                },
                EngineAction::Open { side, size, .. } => {
                    if state.position.is_some() {
                        return Err(ExecError::InvalidState(format!(
                            "open {} while a position is still open",
                            side
                        )));
                    }

                    info!(
                        signal_id = %decision.signal_id,
                        %side,
                        %size,
                        "Placing open order"
                    );

                    let receipt = settle_leg(OrderLeg::Open, &decision.signal_id, broker.open(*side, *size).await)?;

                    info!(
                        signal_id = %decision.signal_id,
                        reference = %receipt.reference,
                        fill_price = %receipt.fill_price,
                        "Open order filled"
                    );

                    state.position = Some(
                        Position::open(*side, receipt.fill_price, *size, decision.signal_id.clone())
                            .with_order_reference(receipt.reference.clone()),
                    );
                    receipts.push((OrderLeg::Open, receipt));
                },
            }
        }

        Ok(ExecutionReport {
            signal_id: decision.signal_id.clone(),
            transition: decision.transition,
            realized_pnl: None,
            balance: state.ledger.balance(),
            receipts,
        })
    }
}

/// Turn a broker answer into a receipt or a leg error.
fn settle_leg(
    leg: OrderLeg,
    signal_id: &MessageId,
    result: ExecResult<OrderOutcome>,
) -> ExecResult<OrderReceipt> {
    match result {
        Ok(OrderOutcome::Success(receipt)) => Ok(receipt),
        Ok(OrderOutcome::Failure { reason }) => {
            error!(%signal_id, %leg, %reason, "Order rejected");
            Err(ExecError::OrderRejected { leg, reason })
        },
        Err(e) => {
            error!(%signal_id, %leg, error = %e, "Order failed");
            Err(e)
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
