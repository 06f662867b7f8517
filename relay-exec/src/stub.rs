//! Stub implementations for testing.
//!
//! These implementations simulate broker, chat and mailbox behavior
//! without making real API calls.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use relay_domain::{AdminCommand, InboundMessage, Position, Price, Quantity, Side};

use crate::error::ExecError;
use crate::ports::{
    CommandSource, Notifier, OrderExecutor, OrderLeg, OrderOutcome, OrderReceipt, SignalSource,
};

/// A panicking test thread must not hide what the stub recorded.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Stub Executor
// =============================================================================

/// Order the stub was asked to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    Open { side: Side, size: Quantity },
    Close { side: Side, size: Quantity },
}

#[derive(Default)]
struct StubExecutorState {
    price: Decimal,
    order_counter: u64,
    fail_next: Option<(OrderLeg, String)>,
    unreachable: bool,
    calls: Vec<StubCall>,
}

/// Stub broker.
///
/// Fills every order immediately at the configured price.
pub struct StubExecutor {
    state: Mutex<StubExecutorState>,
}

impl StubExecutor {
    /// Create a stub filling at `price`.
    pub fn new(price: Decimal) -> Self {
        Self {
            state: Mutex::new(StubExecutorState {
                price,
                ..Default::default()
            }),
        }
    }

    /// Change the fill price.
    pub fn set_price(&self, price: Decimal) {
        lock(&self.state).price = price;
    }

    /// Refuse the next order for `leg` with `reason`.
    pub fn fail_next(&self, leg: OrderLeg, reason: impl Into<String>) {
        lock(&self.state).fail_next = Some((leg, reason.into()));
    }

    /// Simulate the broker being unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    /// Orders requested so far, in order.
    pub fn calls(&self) -> Vec<StubCall> {
        lock(&self.state).calls.clone()
    }

    fn place(&self, leg: OrderLeg, call: StubCall) -> Result<OrderOutcome, ExecError> {
        let mut state = lock(&self.state);
        state.calls.push(call);

        if state.unreachable {
            return Err(ExecError::Transport("Simulated broker outage".to_string()));
        }

        if matches!(&state.fail_next, Some((failing, _)) if *failing == leg) {
            if let Some((_, reason)) = state.fail_next.take() {
                return Ok(OrderOutcome::failure(reason));
            }
        }

        state.order_counter += 1;
        let reference = format!("STUB-{}", state.order_counter);
        let fill_price = Price::new(state.price)?;

        tracing::debug!(%reference, %leg, %fill_price, "Stub: order filled");
        Ok(OrderOutcome::Success(OrderReceipt::new(reference, fill_price)))
    }
}

#[async_trait]
impl OrderExecutor for StubExecutor {
    async fn open(&self, side: Side, size: Quantity) -> Result<OrderOutcome, ExecError> {
        self.place(OrderLeg::Open, StubCall::Open { side, size })
    }

    async fn close(&self, position: &Position) -> Result<OrderOutcome, ExecError> {
        self.place(
            OrderLeg::Close,
            StubCall::Close {
                side: position.side,
                size: position.size,
            },
        )
    }
}

// =============================================================================
// Recording Notifier
// =============================================================================

/// Notifier that keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Option<String>, String)>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    /// Create an empty notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Texts sent to the default destination
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter(|(recipient, _)| recipient.is_none())
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Texts sent to `recipient`
    pub fn sent_to(&self, recipient: &str) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter(|(r, _)| r.as_deref() == Some(recipient))
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Every message regardless of destination
    pub fn count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Make every send fail (messages are still recorded)
    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    fn record(&self, recipient: Option<&str>, text: &str) -> Result<(), ExecError> {
        lock(&self.sent).push((recipient.map(str::to_string), text.to_string()));
        if *lock(&self.failing) {
            return Err(ExecError::Transport("Simulated notifier failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), ExecError> {
        self.record(None, text)
    }

    async fn send_to(&self, recipient: &str, text: &str) -> Result<(), ExecError> {
        self.record(Some(recipient), text)
    }
}

// =============================================================================
// Scripted sources
// =============================================================================

/// One scripted poll result.
enum Scripted<T> {
    Batch(Vec<T>),
    Outage,
}

fn next_batch<T>(queue: &Mutex<VecDeque<Scripted<T>>>) -> Result<Vec<T>, ExecError> {
    match lock(queue).pop_front() {
        Some(Scripted::Batch(items)) => Ok(items),
        Some(Scripted::Outage) => Err(ExecError::Transport("Simulated source outage".to_string())),
        None => Ok(Vec::new()),
    }
}

/// Signal source returning pre-arranged batches, then nothing.
#[derive(Default)]
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Scripted<InboundMessage>>>,
}

impl ScriptedSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch for a later poll
    pub fn push_batch(&self, messages: Vec<InboundMessage>) {
        lock(&self.batches).push_back(Scripted::Batch(messages));
    }

    /// Queue a failed poll
    pub fn push_outage(&self) {
        lock(&self.batches).push_back(Scripted::Outage);
    }

    /// Polls still queued
    pub fn pending(&self) -> usize {
        lock(&self.batches).len()
    }
}

#[async_trait]
impl SignalSource for ScriptedSource {
    async fn poll(&self) -> Result<Vec<InboundMessage>, ExecError> {
        next_batch(&self.batches)
    }

    async fn requeue(&self, messages: Vec<InboundMessage>) {
        if !messages.is_empty() {
            lock(&self.batches).push_front(Scripted::Batch(messages));
        }
    }
}

/// Command source returning pre-arranged batches, then nothing.
#[derive(Default)]
pub struct ScriptedCommands {
    batches: Mutex<VecDeque<Scripted<AdminCommand>>>,
}

impl ScriptedCommands {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch for a later poll
    pub fn push_batch(&self, commands: Vec<AdminCommand>) {
        lock(&self.batches).push_back(Scripted::Batch(commands));
    }

    /// Queue a failed poll
    pub fn push_outage(&self) {
        lock(&self.batches).push_back(Scripted::Outage);
    }
}

#[async_trait]
impl CommandSource for ScriptedCommands {
    async fn poll_commands(&self) -> Result<Vec<AdminCommand>, ExecError> {
        next_batch(&self.batches)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::MessageId;
    use rust_decimal_macros::dec;

    fn qty(value: Decimal) -> Quantity {
        Quantity::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_stub_executor_fills_at_price() {
        let broker = StubExecutor::new(dec!(95000));

        let outcome = broker.open(Side::Long, qty(dec!(0.5))).await.unwrap();

        match outcome {
            OrderOutcome::Success(receipt) => {
                assert_eq!(receipt.fill_price.as_decimal(), dec!(95000));
                assert_eq!(receipt.reference, "STUB-1");
            },
            OrderOutcome::Failure { reason } => panic!("unexpected failure: {reason}"),
        }
    }

    #[tokio::test]
    async fn test_stub_executor_fail_next_is_one_shot() {
        let broker = StubExecutor::new(dec!(100));
        let position = Position::open(
            Side::Long,
            Price::new(dec!(100)).unwrap(),
            qty(dec!(500)),
            MessageId::new("a").unwrap(),
        );

        broker.fail_next(OrderLeg::Close, "rejected");

        // An open does not consume a pending close failure
        assert!(broker.open(Side::Long, qty(dec!(1))).await.unwrap().is_success());
        assert_eq!(
            broker.close(&position).await.unwrap(),
            OrderOutcome::failure("rejected")
        );
        assert!(broker.close(&position).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_stub_executor_unreachable() {
        let broker = StubExecutor::new(dec!(100));
        broker.set_unreachable(true);

        let result = broker.open(Side::Short, qty(dec!(1))).await;

        assert!(matches!(result, Err(ExecError::Transport(_))));
        assert_eq!(broker.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();

        notifier.send("hello").await.unwrap();
        notifier.send_to("42", "psst").await.unwrap();

        notifier.set_failing(true);
        assert!(notifier.send("lost").await.is_err());

        assert_eq!(notifier.sent(), vec!["hello", "lost"]);
        assert_eq!(notifier.sent_to("42"), vec!["psst"]);
        assert_eq!(notifier.count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_source_drains_in_order() {
        let source = ScriptedSource::new();
        let msg = |id: &str| InboundMessage::new(MessageId::new(id).unwrap(), "text");

        source.push_batch(vec![msg("1"), msg("2")]);
        source.push_outage();
        source.push_batch(vec![msg("3")]);

        assert_eq!(source.poll().await.unwrap().len(), 2);
        assert!(source.poll().await.is_err());
        assert_eq!(source.poll().await.unwrap()[0].id.as_str(), "3");
        assert!(source.poll().await.unwrap().is_empty());
        assert_eq!(source.pending(), 0);
    }

    #[tokio::test]
    async fn test_scripted_source_requeue_comes_first() {
        let source = ScriptedSource::new();
        let msg = |id: &str| InboundMessage::new(MessageId::new(id).unwrap(), "text");

        source.push_batch(vec![msg("3")]);
        source.requeue(vec![msg("1"), msg("2")]).await;
        source.requeue(Vec::new()).await;

        let first = source.poll().await.unwrap();
        assert_eq!(first.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), ["1", "2"]);
        assert_eq!(source.poll().await.unwrap()[0].id.as_str(), "3");
        assert_eq!(source.pending(), 0);
    }

    #[tokio::test]
    async fn test_scripted_commands() {
        let commands = ScriptedCommands::new();
        commands.push_batch(vec![AdminCommand::reset(Some("7".to_string()))]);

        let polled = commands.poll_commands().await.unwrap();
        assert_eq!(polled[0].issuer.as_deref(), Some("7"));
        assert!(commands.poll_commands().await.unwrap().is_empty());
    }
}
