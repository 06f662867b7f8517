//! Signal Processor: the single serialized access point to the engine state.
//!
//! Both the signal loop and the admin loop go through the processor. Every
//! mutation of [`EngineState`] happens while holding one lock, so a reset can
//! never interleave with an in-flight reconciliation.
//!
//! # Message flow
//!
//! ```text
//! InboundMessage → dedup check → echo filter → #RESET? → parse → mark seen
//!                → decide → execute → notify
//! ```
//!
//! Identifiers are marked seen before any effect. A crash between marking and
//! acting loses that signal's effect but never repeats it.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use relay_domain::{
    parse_signal, AdminCommand, CommandKind, EngineState, InboundMessage, ParseError, Position, Side, SignalFormat,
};
use relay_exec::{ExecError, ExecutionMode, ExecutionReport, Executor, Notifier};
use relay_store::DedupStore;

use crate::error::{DaemonError, DaemonResult};

/// Header of the live trade confirmation
const TRADE_CONFIRMATION: &str = "Signal received! Executing trade";

/// Prefix of the reset confirmation
const RESET_CONFIRMATION: &str = "Balance has been reset to";

/// Reply to an unrecognized issuer
const UNAUTHORIZED_REPLY: &str = "Unauthorized command.";

/// Balance line appended to simulated reports
const BALANCE_LABEL: &str = "BALANCE:";

/// In-band reset token accepted on the signal channel
const RESET_TOKEN: &str = "#RESET";

// =============================================================================
// Outcomes
// =============================================================================

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Identifier already processed
    Duplicate,
    /// One of our own notifications coming back
    Echo,
    /// Not a signal; marked seen so it is reported once
    Malformed(ParseError),
    /// Already positioned on this side
    Held(Side),
    /// Decision carried out
    Executed(ExecutionReport),
    /// Decision failed; state left at the last consistent point
    Failed(String),
    /// In-band admin command
    Command(CommandOutcome),
}

/// Result of an admin command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// State reset
    Applied,
    /// Issuer is not the operator
    Rejected,
}

/// A batch stopped by a dedup store failure.
///
/// Store failures happen before a message has any effect, so the failing
/// message and everything after it can be handed back to the source.
#[derive(Debug, Error)]
#[error("batch stopped with {} message(s) unprocessed: {error}", .unprocessed.len())]
pub struct BatchInterrupted {
    /// Outcomes of the messages handled before the failure
    pub completed: Vec<MessageOutcome>,
    /// The failing message followed by the rest of the batch
    pub unprocessed: Vec<InboundMessage>,
    /// What stopped the batch
    #[source]
    pub error: DaemonError,
}

/// Point-in-time view for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub mode: &'static str,
    pub position: Option<Position>,
    pub balance: Decimal,
    pub initial_balance: Decimal,
    pub leverage: u32,
    pub processed_ids: usize,
}

// =============================================================================
// Signal Processor
// =============================================================================

/// Applies inbound messages and admin commands to the shared state.
pub struct SignalProcessor {
    executor: Executor,
    state: Mutex<EngineState>,
    dedup: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
    format: SignalFormat,
    operator_id: Option<String>,
}

impl SignalProcessor {
    /// Create a processor over a fresh state.
    pub fn new(
        executor: Executor,
        state: EngineState,
        dedup: Arc<dyn DedupStore>,
        notifier: Arc<dyn Notifier>,
        format: SignalFormat,
        operator_id: Option<String>,
    ) -> Self {
        Self {
            executor,
            state: Mutex::new(state),
            dedup,
            notifier,
            format,
            operator_id,
        }
    }

    /// Process a poll result in order.
    ///
    /// Each message is reconciled against the state left by the previous one.
    ///
    /// # Errors
    /// Stops at the first dedup store failure. Messages before it are done;
    /// the failing one and those after it come back untouched in
    /// [`BatchInterrupted::unprocessed`].
    pub async fn process_batch(&self, messages: Vec<InboundMessage>) -> Result<Vec<MessageOutcome>, BatchInterrupted> {
        let mut outcomes = Vec::with_capacity(messages.len());
        let mut pending = messages.into_iter();

        while let Some(message) = pending.next() {
            match self.process_message(&message).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    let unprocessed = std::iter::once(message).chain(pending).collect();
                    return Err(BatchInterrupted {
                        completed: outcomes,
                        unprocessed,
                        error,
                    });
                },
            }
        }

        Ok(outcomes)
    }

    /// Process a single message.
    pub async fn process_message(&self, message: &InboundMessage) -> DaemonResult<MessageOutcome> {
        let id = &message.id;

        if self.dedup.has_seen(id).await? {
            info!(message_id = %id, "Skipping duplicate message");
            return Ok(MessageOutcome::Duplicate);
        }

        if is_echo(&message.text) {
            self.dedup.mark_seen(id).await?;
            debug!(message_id = %id, "Ignoring own notification");
            return Ok(MessageOutcome::Echo);
        }

        if message.text.contains(RESET_TOKEN) {
            self.dedup.mark_seen(id).await?;
            info!(message_id = %id, "In-band reset received");
            let outcome = self.handle_command(AdminCommand::reset(message.sender.clone())).await;
            return Ok(MessageOutcome::Command(outcome));
        }

        let signal = match parse_signal(message, &self.format) {
            Ok(signal) => signal,
            Err(e) => {
                self.dedup.mark_seen(id).await?;
                warn!(message_id = %id, reason = %e, "Dropping malformed signal");
                return Ok(MessageOutcome::Malformed(e));
            },
        };

        self.dedup.mark_seen(id).await?;

        info!(
            message_id = %id,
            pair = %signal.pair,
            direction = %signal.direction,
            "Signal received"
        );

        let mut state = self.state.lock().await;

        let result = match self.executor.engine().decide(state.position.as_ref(), &signal) {
            Ok(decision) if decision.is_noop() => {
                info!(message_id = %id, side = ?state.side(), "Already positioned, nothing to do");
                let balance = state.ledger.balance();
                drop(state);

                // The simulated channel echoes every signal with the balance
                if let ExecutionMode::Simulated = self.executor.mode() {
                    self.notify(&simulated_report(&signal.text, balance)).await;
                }
                return Ok(MessageOutcome::Held(signal.direction.target_side()));
            },
            Ok(decision) => self.executor.execute(&mut state, &decision).await,
            Err(e) => Err(ExecError::from(e)),
        };
        drop(state);

        match result {
            Ok(report) => {
                let text = match self.executor.mode() {
                    ExecutionMode::Simulated => simulated_report(&signal.text, report.balance),
                    ExecutionMode::Live(_) => live_report(&report),
                };
                self.notify(&text).await;
                Ok(MessageOutcome::Executed(report))
            },
            Err(e) => {
                error!(message_id = %id, error = %e, "Signal execution failed");
                self.notify(&format!("Signal {} failed: {}", id, e)).await;
                Ok(MessageOutcome::Failed(e.to_string()))
            },
        }
    }

    /// Apply an admin command.
    ///
    /// Only the configured operator may reset. Anyone else gets a refusal and
    /// the state is untouched.
    pub async fn handle_command(&self, command: AdminCommand) -> CommandOutcome {
        let authorized = matches!(
            (&command.issuer, &self.operator_id),
            (Some(issuer), Some(operator)) if issuer == operator
        );

        if !authorized {
            warn!(issuer = ?command.issuer, kind = ?command.kind, "Unauthorized command");
            if let Some(issuer) = &command.issuer {
                if let Err(e) = self.notifier.send_to(issuer, UNAUTHORIZED_REPLY).await {
                    warn!(error = %e, "Failed to send refusal");
                }
            }
            return CommandOutcome::Rejected;
        }

        match command.kind {
            CommandKind::Reset => {
                let initial = {
                    let mut state = self.state.lock().await;
                    state.reset();
                    state.ledger.initial_balance()
                };

                info!(balance = %initial, "State reset by operator");
                self.notify(&format!("{} {} USD.", RESET_CONFIRMATION, initial)).await;
            },
        }

        CommandOutcome::Applied
    }

    /// Current position, balance and dedup size.
    pub async fn snapshot(&self) -> DaemonResult<StatusSnapshot> {
        let processed_ids = self.dedup.len().await?;
        let state = self.state.lock().await;

        Ok(StatusSnapshot {
            mode: self.executor.mode().name(),
            position: state.position.clone(),
            balance: state.ledger.balance(),
            initial_balance: state.ledger.initial_balance(),
            leverage: state.ledger.leverage().multiplier(),
            processed_ids,
        })
    }

    /// Copy of the current state.
    pub async fn state(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    /// Best-effort notification.
    async fn notify(&self, text: &str) {
        if let Err(e) = self.notifier.send(text).await {
            error!(error = %e, "Failed to send notification");
        }
    }
}

/// Text produced by this process, seen again on the channel it posts to.
fn is_echo(text: &str) -> bool {
    let text = text.trim();
    text.starts_with(TRADE_CONFIRMATION)
        || text.starts_with(RESET_CONFIRMATION)
        || text == UNAUTHORIZED_REPLY
        || text.lines().any(|line| line.trim_start().starts_with(BALANCE_LABEL))
}

fn simulated_report(signal_text: &str, balance: Decimal) -> String {
    format!("{}\n{} {:.2} USD", signal_text.trim(), BALANCE_LABEL, balance)
}

fn live_report(report: &ExecutionReport) -> String {
    let mut text = TRADE_CONFIRMATION.to_string();
    for (leg, receipt) in &report.receipts {
        text.push_str(&format!("\n{} {} @ {}", leg, receipt.reference, receipt.fill_price));
    }
    text
}

// =============================================================================
// Tests
// =============================================================================
