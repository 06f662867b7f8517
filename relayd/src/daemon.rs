//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Signal Processor (dedup, reconciliation, notifications)
//! - Signal loop (polls the signal channel on a fixed interval)
//! - Admin loop (polls the command channel on its own interval)
//! - API Server (HTTP status endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components (rehydrate the dedup store)
//! 3. Start API server
//! 4. Spawn the signal and admin loops
//! 5. Graceful shutdown on Ctrl-C or cancellation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_connectors::{BinanceExecutor, BinanceRestClient, TelegramClient, TelegramGateway};
use relay_domain::{EngineState, Ledger};
use relay_engine::Engine;
use relay_exec::{
    CommandSource, Executor, Notifier, OrderExecutor, RecordingNotifier, ScriptedCommands, ScriptedSource,
    SignalSource, StubExecutor,
};
use relay_store::{DedupStore, FileDedupStore, MemoryDedupStore};

use crate::api::{create_router, ApiState};
use crate::config::{Config, Environment, TradingMode};
use crate::error::{DaemonError, DaemonResult};
use crate::processor::{MessageOutcome, SignalProcessor};

/// Fill price of the stub broker
const STUB_PRICE: Decimal = Decimal::ONE_HUNDRED;

// =============================================================================
// Daemon
// =============================================================================

/// The main relay daemon.
pub struct Daemon {
    /// Configuration
    config: Config,
    /// Serialized access to the engine state
    processor: Arc<SignalProcessor>,
    /// Signal channel
    signals: Arc<dyn SignalSource>,
    /// Admin command channel
    commands: Arc<dyn CommandSource>,
    /// Cancelled on shutdown
    shutdown: CancellationToken,
}

impl Daemon {
    /// Create a new daemon with provided components.
    pub fn new(
        config: Config,
        processor: Arc<SignalProcessor>,
        signals: Arc<dyn SignalSource>,
        commands: Arc<dyn CommandSource>,
    ) -> Self {
        Self {
            config,
            processor,
            signals,
            commands,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a new daemon with stub components (for testing/development).
    pub fn new_stub(config: Config) -> Self {
        let broker: Option<Arc<dyn OrderExecutor>> = match config.trading.mode {
            TradingMode::Simulated => None,
            TradingMode::Live => Some(Arc::new(StubExecutor::new(STUB_PRICE))),
        };

        let processor = Arc::new(build_processor(
            &config,
            Arc::new(MemoryDedupStore::new()),
            Arc::new(RecordingNotifier::new()),
            broker,
        ));

        Self::new(
            config,
            processor,
            Arc::new(ScriptedSource::new()),
            Arc::new(ScriptedCommands::new()),
        )
    }

    /// Wire the real adapters described by `config`.
    ///
    /// The test environment gets stubs; every other environment needs the
    /// Telegram credentials, and live mode needs the Binance ones.
    pub async fn from_config(config: Config) -> DaemonResult<Self> {
        if config.environment == Environment::Test {
            return Ok(Self::new_stub(config));
        }

        let telegram = config.telegram.clone().ok_or_else(|| {
            DaemonError::Config("RELAY_TELEGRAM_TOKEN and RELAY_TELEGRAM_CHAT_ID are required".to_string())
        })?;

        let gateway = Arc::new(TelegramGateway::new(
            TelegramClient::new(telegram.token),
            telegram.chat_id,
            telegram.signal_chat_id,
        ));
        let dedup = Arc::new(FileDedupStore::open(&config.dedup_path).await?);

        let broker: Option<Arc<dyn OrderExecutor>> = match config.trading.mode {
            TradingMode::Simulated => None,
            TradingMode::Live => {
                let credentials = config.binance.clone().ok_or_else(|| {
                    DaemonError::Config("Live mode requires Binance credentials".to_string())
                })?;

                let client = BinanceRestClient::new(credentials.api_key, credentials.api_secret);
                if let Err(e) = client.ping().await {
                    warn!(error = %e, "Binance is not reachable yet; orders will fail until it is");
                }

                Some(Arc::new(BinanceExecutor::new(client, config.trading.symbol.clone())))
            },
        };

        let processor = Arc::new(build_processor(&config, dedup, gateway.clone(), broker));

        Ok(Self::new(config, processor, gateway.clone(), gateway))
    }

    /// Token that stops the daemon when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Shared processor
    pub fn processor(&self) -> &Arc<SignalProcessor> {
        &self.processor
    }

    /// Run the daemon.
    ///
    /// This method blocks until Ctrl-C or until the shutdown token is cancelled.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            mode = %self.config.trading.mode,
            "Starting relay daemon"
        );

        // 1. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 2. Spawn the loops
        let signal_task = tokio::spawn(signal_loop(
            self.processor.clone(),
            self.signals.clone(),
            self.config.polling.signal_interval,
            self.shutdown.clone(),
        ));
        let command_task = tokio::spawn(command_loop(
            self.processor.clone(),
            self.commands.clone(),
            self.config.polling.command_interval,
            self.shutdown.clone(),
        ));

        // 3. Wait for shutdown
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        // 4. Graceful shutdown
        self.shutdown.cancel();
        for (name, task) in [("signal", signal_task), ("command", command_task)] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Loop task failed");
            }
        }

        self.log_shutdown().await;

        Ok(())
    }

    /// Poll the signal channel once and process what it returns.
    pub async fn poll_once(&self) -> DaemonResult<Vec<MessageOutcome>> {
        poll_signals(&self.processor, self.signals.as_ref()).await
    }

    /// Poll the command channel once and apply what it returns.
    pub async fn poll_commands_once(&self) -> DaemonResult<usize> {
        poll_commands(&self.processor, self.commands.as_ref()).await
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            processor: self.processor.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| DaemonError::Listener { addr: addr.clone(), source })?;

        let local_addr = listener
            .local_addr()
            .map_err(|source| DaemonError::Listener { addr: addr.clone(), source })?;

        // Spawn the server task
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = server.await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    async fn log_shutdown(&self) {
        match self.processor.snapshot().await {
            Ok(snapshot) => info!(
                position = ?snapshot.position.as_ref().map(|p| p.side),
                balance = %snapshot.balance,
                processed_ids = snapshot.processed_ids,
                "Shutdown complete"
            ),
            Err(e) => warn!(error = %e, "Shutdown complete, state unavailable"),
        }
    }
}

// =============================================================================
// Wiring
// =============================================================================

fn build_processor(
    config: &Config,
    dedup: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
    broker: Option<Arc<dyn OrderExecutor>>,
) -> SignalProcessor {
    let trading = &config.trading;

    let mut engine = Engine::new(trading.leverage);
    if let Some(size) = trading.default_size {
        engine = engine.with_default_size(size);
    }

    let executor = match broker {
        Some(broker) => Executor::live(engine, broker),
        None => Executor::simulated(engine),
    };

    SignalProcessor::new(
        executor,
        EngineState::new(Ledger::new(trading.initial_balance, trading.leverage)),
        dedup,
        notifier,
        trading.signal_format.clone(),
        config.operator_id.clone(),
    )
}

// =============================================================================
// Loops
// =============================================================================

async fn poll_signals(processor: &SignalProcessor, source: &dyn SignalSource) -> DaemonResult<Vec<MessageOutcome>> {
    let messages = source.poll().await?;
    if messages.is_empty() {
        return Ok(Vec::new());
    }

    debug!(count = messages.len(), "Polled messages");
    match processor.process_batch(messages).await {
        Ok(outcomes) => Ok(outcomes),
        Err(interrupted) => {
            warn!(
                completed = interrupted.completed.len(),
                requeued = interrupted.unprocessed.len(),
                "Batch interrupted, returning the rest to the source"
            );
            source.requeue(interrupted.unprocessed).await;
            Err(interrupted.error)
        },
    }
}

async fn poll_commands(processor: &SignalProcessor, source: &dyn CommandSource) -> DaemonResult<usize> {
    let commands = source.poll_commands().await?;
    let count = commands.len();
    for command in commands {
        processor.handle_command(command).await;
    }
    Ok(count)
}

/// Poll signals until cancelled. Errors skip the cycle.
async fn signal_loop(
    processor: Arc<SignalProcessor>,
    source: Arc<dyn SignalSource>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = poll_signals(&processor, source.as_ref()).await {
                    error!(error = %e, "Signal poll failed, retrying next cycle");
                }
            }
        }
    }

    debug!("Signal loop stopped");
}

/// Poll admin commands until cancelled. Errors skip the cycle.
async fn command_loop(
    processor: Arc<SignalProcessor>,
    source: Arc<dyn CommandSource>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = poll_commands(&processor, source.as_ref()).await {
                    error!(error = %e, "Command poll failed, retrying next cycle");
                }
            }
        }
    }

    debug!("Command loop stopped");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::{AdminCommand, InboundMessage, MessageId, Side};
    use rust_decimal_macros::dec;

    fn message(id: &str, kind: &str, entry: &str) -> InboundMessage {
        InboundMessage::new(
            MessageId::new(id).unwrap(),
            format!("#BTCUSD\nPair: BTCUSD\nType: {}\nEntry: {}\nSize: 50 USD", kind, entry),
        )
    }

    fn scripted(config: Config) -> (Daemon, Arc<ScriptedSource>, Arc<ScriptedCommands>) {
        let signals = Arc::new(ScriptedSource::new());
        let commands = Arc::new(ScriptedCommands::new());
        let processor = Arc::new(build_processor(
            &config,
            Arc::new(MemoryDedupStore::new()),
            Arc::new(RecordingNotifier::new()),
            None,
        ));
        let daemon = Daemon::new(config, processor, signals.clone(), commands.clone());
        (daemon, signals, commands)
    }

    #[tokio::test]
    async fn test_daemon_stub_creation() {
        let daemon = Daemon::new_stub(Config::test());

        let snapshot = daemon.processor().snapshot().await.unwrap();
        assert_eq!(snapshot.mode, "simulated");
        assert_eq!(snapshot.balance, dec!(1000));
        assert!(daemon.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_config_uses_stubs_in_test_env() {
        let mut config = Config::test();
        config.trading.mode = TradingMode::Live;

        let daemon = Daemon::from_config(config).await.unwrap();

        assert_eq!(daemon.processor().snapshot().await.unwrap().mode, "live");
    }

    #[tokio::test]
    async fn test_from_config_requires_telegram() {
        let mut config = Config::test();
        config.environment = Environment::Development;

        assert!(matches!(Daemon::from_config(config).await, Err(DaemonError::Config(_))));
    }

    #[tokio::test]
    async fn test_poll_once_skips_outage() {
        let (daemon, signals, _) = scripted(Config::test());
        signals.push_outage();
        signals.push_batch(vec![message("m1", "Buy", "100")]);

        assert!(matches!(daemon.poll_once().await, Err(DaemonError::Exec(e)) if e.is_transport()));

        let outcomes = daemon.poll_once().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(daemon.processor().state().await.side(), Some(Side::Long));
    }

    #[tokio::test]
    async fn test_poll_commands_once() {
        let (daemon, signals, commands) = scripted(Config::test());
        signals.push_batch(vec![message("m1", "Buy", "100")]);
        daemon.poll_once().await.unwrap();

        commands.push_batch(vec![AdminCommand::reset(Some("operator".to_string()))]);
        assert_eq!(daemon.poll_commands_once().await.unwrap(), 1);

        assert_eq!(daemon.processor().state().await.position, None);
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let (daemon, signals, _) = scripted(Config::test());
        signals.push_outage();
        signals.push_batch(vec![message("m1", "Buy", "100"), message("m2", "Sell", "110")]);

        let processor = daemon.processor().clone();
        let token = daemon.shutdown_token();
        let handle = tokio::spawn(daemon.run());

        for _ in 0..200 {
            if signals.pending() == 0 && processor.state().await.side() == Some(Side::Short) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        token.cancel();

        handle.await.unwrap().unwrap();

        let state = processor.state().await;
        assert_eq!(state.side(), Some(Side::Short));
        assert_eq!(state.ledger.balance(), dec!(1050));
    }
}
