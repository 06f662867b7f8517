//! Relay Daemon
//!
//! Polls the signal channel, keeps one position in line with the latest
//! signal, and answers operator commands.
//!
//! # Usage
//!
//! ```bash
//! # Simulated ledger against a Telegram channel
//! RELAY_TELEGRAM_TOKEN=... RELAY_TELEGRAM_CHAT_ID=... RELAY_OPERATOR_ID=... cargo run -p relayd
//!
//! # Stubs only, no network
//! RELAY_ENV=test RELAY_API_PORT=8081 cargo run -p relayd
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_ENV`: Environment (test, development, production)
//! - `RELAY_MODE`: simulated (default) or live
//! - `RELAY_SIGNAL_FORMAT`: tagged (default) or plain
//! - `RELAY_INITIAL_BALANCE`: Ledger start and reset value (default: 1000)
//! - `RELAY_LEVERAGE`: Fixed leverage (default: 10)
//! - `RELAY_DEDUP_PATH`: Processed id record (default: processed_ids.txt)
//! - `RELAY_LOG_FORMAT`: `json` for JSON log lines

use relayd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIRECTIVES: [&str; 5] = [
    "relayd=info",
    "relay_engine=info",
    "relay_exec=info",
    "relay_store=info",
    "relay_connectors=info",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up .env before the log format is read
    let _ = dotenvy::dotenv();

    // Initialize tracing
    let mut filter = EnvFilter::from_default_env();
    for directive in LOG_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }

    let json = std::env::var("RELAY_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        mode = %config.trading.mode,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Relay Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::from_config(config).await?;
    daemon.run().await?;

    Ok(())
}
