//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use relay_domain::{Leverage, Quantity, SignalFormat};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Trading configuration
    pub trading: TradingConfig,

    /// Poll intervals
    pub polling: PollingConfig,

    /// Append-only record of processed message ids
    pub dedup_path: PathBuf,

    /// The single identity allowed to issue admin commands
    pub operator_id: Option<String>,

    /// Telegram bot credentials (signals, commands, notifications)
    pub telegram: Option<TelegramConfig>,

    /// Binance credentials (live mode only)
    pub binance: Option<BinanceConfig>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Trading configuration.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// Ledger simulation or real orders
    pub mode: TradingMode,
    /// Accepted signal layout
    pub signal_format: SignalFormat,
    /// Instrument traded by the live executor
    pub symbol: String,
    /// Starting (and reset) ledger balance
    pub initial_balance: Decimal,
    /// Fixed leverage multiplier
    pub leverage: Leverage,
    /// Size used for signals that do not state one
    pub default_size: Option<Quantity>,
}

/// Poll intervals.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Delay between signal polls
    pub signal_interval: Duration,
    /// Delay between admin command polls
    pub command_interval: Duration,
}

/// Telegram bot credentials.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token
    pub token: String,
    /// Chat receiving notifications
    pub chat_id: String,
    /// Only chat whose posts are read as signals
    pub signal_chat_id: String,
}

/// Binance API credentials.
#[derive(Clone)]
pub struct BinanceConfig {
    /// API key
    pub api_key: String,
    /// API secret
    pub api_secret: String,
}

// Credentials never reach logs
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"***")
            .field("chat_id", &self.chat_id)
            .field("signal_chat_id", &self.signal_chat_id)
            .finish()
    }
}

impl std::fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

/// Where decisions are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    /// Ledger only
    Simulated,
    /// Real broker orders
    Live,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

const DEFAULT_MARKER: &str = "#BTCUSD";
const DEFAULT_SYMBOL: &str = "BTCUSDT";
const DEFAULT_DEDUP_PATH: &str = "processed_ids.txt";
const DEFAULT_INITIAL_BALANCE: Decimal = Decimal::ONE_THOUSAND;
const DEFAULT_LEVERAGE: u32 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let environment = Self::load_environment(&vars)?;
        let api = Self::load_api_config(&vars)?;
        let trading = Self::load_trading_config(&vars)?;
        let polling = PollingConfig {
            signal_interval: vars.millis("RELAY_POLL_INTERVAL_MS")?,
            command_interval: vars.millis("RELAY_COMMAND_POLL_INTERVAL_MS")?,
        };

        let telegram = match (vars.get("RELAY_TELEGRAM_TOKEN"), vars.get("RELAY_TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig {
                token,
                signal_chat_id: vars.get("RELAY_TELEGRAM_SIGNAL_CHAT_ID").unwrap_or_else(|| chat_id.clone()),
                chat_id,
            }),
            (None, None) => None,
            _ => {
                return Err(DaemonError::Config(
                    "RELAY_TELEGRAM_TOKEN and RELAY_TELEGRAM_CHAT_ID must be set together".to_string(),
                ))
            },
        };

        let binance = match (vars.get("RELAY_BINANCE_API_KEY"), vars.get("RELAY_BINANCE_API_SECRET")) {
            (Some(api_key), Some(api_secret)) => Some(BinanceConfig { api_key, api_secret }),
            _ => None,
        };

        if trading.mode == TradingMode::Live && binance.is_none() && environment != Environment::Test {
            return Err(DaemonError::Config(
                "RELAY_MODE=live requires RELAY_BINANCE_API_KEY and RELAY_BINANCE_API_SECRET".to_string(),
            ));
        }

        Ok(Self {
            api,
            trading,
            polling,
            dedup_path: vars
                .get("RELAY_DEDUP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEDUP_PATH)),
            operator_id: vars.get("RELAY_OPERATOR_ID"),
            telegram,
            binance,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            polling: PollingConfig {
                signal_interval: Duration::from_millis(10),
                command_interval: Duration::from_millis(10),
            },
            operator_id: Some("operator".to_string()),
            environment: Environment::Test,
            ..Self::default()
        }
    }

    fn load_environment(vars: &Vars<impl Fn(&str) -> Option<String>>) -> DaemonResult<Environment> {
        let env_str = vars.get("RELAY_ENV").unwrap_or_else(|| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid RELAY_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config(vars: &Vars<impl Fn(&str) -> Option<String>>) -> DaemonResult<ApiConfig> {
        let host = vars.get("RELAY_API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port_str = vars.get("RELAY_API_PORT").unwrap_or_else(|| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid RELAY_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_trading_config(vars: &Vars<impl Fn(&str) -> Option<String>>) -> DaemonResult<TradingConfig> {
        let mode = match vars.get("RELAY_MODE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("simulated") | Some("sim") => TradingMode::Simulated,
            Some("live") => TradingMode::Live,
            Some(other) => {
                return Err(DaemonError::Config(format!(
                    "Invalid RELAY_MODE: {}. Expected: simulated, live",
                    other
                )))
            },
        };

        let marker = vars.get("RELAY_MARKER").unwrap_or_else(|| DEFAULT_MARKER.to_string());
        let signal_format = match vars.get("RELAY_SIGNAL_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("tagged") => SignalFormat::tagged(marker),
            Some("plain") => SignalFormat::Plain,
            Some(other) => {
                return Err(DaemonError::Config(format!(
                    "Invalid RELAY_SIGNAL_FORMAT: {}. Expected: plain, tagged",
                    other
                )))
            },
        };

        let initial_balance = vars.decimal("RELAY_INITIAL_BALANCE", DEFAULT_INITIAL_BALANCE)?;

        let leverage_str = vars
            .get("RELAY_LEVERAGE")
            .unwrap_or_else(|| DEFAULT_LEVERAGE.to_string());
        let leverage = leverage_str
            .parse::<u32>()
            .map_err(|_| DaemonError::Config(format!("Invalid RELAY_LEVERAGE value: {}", leverage_str)))
            .and_then(|m| Leverage::new(m).map_err(|e| DaemonError::Config(e.to_string())))?;

        let default_size = Quantity::new(vars.decimal("RELAY_DEFAULT_SIZE", default_size())?)
            .map_err(|e| DaemonError::Config(format!("Invalid RELAY_DEFAULT_SIZE: {}", e)))?;

        // Plain signals carry no entry price, which only a broker fill can supply
        if mode == TradingMode::Simulated && signal_format == SignalFormat::Plain {
            return Err(DaemonError::Config(
                "RELAY_SIGNAL_FORMAT=plain needs RELAY_MODE=live; simulated trades settle at the signal's Entry"
                    .to_string(),
            ));
        }

        Ok(TradingConfig {
            mode,
            signal_format,
            symbol: vars.get("RELAY_SYMBOL").unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
            initial_balance,
            leverage,
            default_size: Some(default_size),
        })
    }
}

/// 0.05
fn default_size() -> Decimal {
    Decimal::new(5, 2)
}

/// Typed access to a key lookup.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Non-blank value for `key`
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn decimal(&self, key: &str, default: Decimal) -> DaemonResult<Decimal> {
        match self.get(key) {
            Some(val) => Decimal::from_str(&val)
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str) -> DaemonResult<Duration> {
        match self.get(key) {
            Some(val) => val
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .ok_or_else(|| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            None => Ok(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            trading: TradingConfig {
                mode: TradingMode::Simulated,
                signal_format: SignalFormat::tagged(DEFAULT_MARKER),
                symbol: DEFAULT_SYMBOL.to_string(),
                initial_balance: DEFAULT_INITIAL_BALANCE,
                leverage: Leverage::new(DEFAULT_LEVERAGE).unwrap_or_else(|_| unreachable!()),
                default_size: Quantity::new(default_size()).ok(),
            },
            polling: PollingConfig {
                signal_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
                command_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            },
            dedup_path: PathBuf::from(DEFAULT_DEDUP_PATH),
            operator_id: None,
            telegram: None,
            binance: None,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Simulated => write!(f, "simulated"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
