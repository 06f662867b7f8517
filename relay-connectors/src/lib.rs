//! Relay Connectors
//!
//! Adapters for the external collaborators: the Telegram Bot API (signals,
//! admin commands, notifications) and the Binance margin REST API (orders).
//! Normalizes service-specific payloads to domain types.

#![warn(clippy::all)]

// Public modules
pub mod binance_rest;
pub mod telegram;

// Re-exports
pub use binance_rest::{
    BinanceExecutor, BinanceOrderResponse, BinanceRestClient, BinanceRestError, MarginOrder, SideEffect,
};
pub use telegram::{TelegramClient, TelegramError, TelegramGateway, Update};
