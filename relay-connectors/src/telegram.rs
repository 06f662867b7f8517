//! Telegram Bot API Connector
//!
//! One bot serves three roles:
//! - signal source: posts in the signal chat become [`InboundMessage`]s
//! - command source: `/reset` messages from any chat become [`AdminCommand`]s
//! - notifier: `sendMessage` to the configured chat
//!
//! Signals and commands share one `getUpdates` cursor, so the
//! [`TelegramGateway`] fetches updates once and routes them into two queues
//! that the signal loop and the admin loop drain independently.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use relay_domain::{AdminCommand, InboundMessage, MessageId};
use relay_exec::{CommandSource, ExecError, Notifier, SignalSource};

// =============================================================================
// Constants
// =============================================================================

/// Telegram Bot API base URL
const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Admin command that resets the ledger
const RESET_COMMAND: &str = "/reset";

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the Telegram client.
#[derive(Debug, Clone, Error)]
pub enum TelegramError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// API answered `ok: false`
    #[error("Telegram API error: {code} - {description}")]
    ApiError { code: i64, description: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

impl From<TelegramError> for ExecError {
    fn from(e: TelegramError) -> Self {
        ExecError::Transport(e.to_string())
    }
}

// =============================================================================
// Telegram Types (from API responses)
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

/// One entry of `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update identifier
    pub update_id: i64,
    /// Message in a private chat or group
    pub message: Option<Message>,
    /// Post in a channel
    pub channel_post: Option<Message>,
}

/// Telegram message
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Identifier unique within its chat
    pub message_id: i64,
    /// Chat the message belongs to
    pub chat: Chat,
    /// Text, absent for media
    pub text: Option<String>,
}

/// Telegram chat
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat identifier (negative for groups and channels)
    pub id: i64,
}

// =============================================================================
// Telegram Client
// =============================================================================

/// Minimal Telegram Bot API client.
pub struct TelegramClient {
    client: Client,
    token: String,
}

impl TelegramClient {
    /// Create a client for the bot `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", TELEGRAM_API_URL, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, TelegramError> {
        let response = timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client.post(self.url(method)).json(&body).send(),
        )
        .await
        .map_err(|_| TelegramError::Timeout)?
        // The URL carries the token; keep it out of logs
        .map_err(|e| TelegramError::RequestFailed(e.without_url().to_string()))?;

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| TelegramError::ParseError(e.without_url().to_string()))?;

        match envelope {
            Envelope {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            Envelope {
                error_code,
                description,
                ..
            } => Err(TelegramError::ApiError {
                code: error_code.unwrap_or_default(),
                description: description.unwrap_or_else(|| "no result".to_string()),
            }),
        }
    }

    /// Fetch updates starting at `offset`.
    ///
    /// # Endpoint
    ///
    /// `POST /bot<token>/getUpdates`
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        let mut body = json!({ "timeout": 0 });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", body).await
    }

    /// Send `text` to `chat_id`.
    ///
    /// # Endpoint
    ///
    /// `POST /bot<token>/sendMessage`
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Where an update goes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Routed {
    Signal(InboundMessage),
    Command(AdminCommand),
}

/// Classify an update. Media, edits and empty texts are dropped, and so is
/// anything outside `signal_chat` that is not a command.
fn route(update: &Update, signal_chat: &str) -> Option<Routed> {
    let message = update.channel_post.as_ref().or(update.message.as_ref())?;
    let text = message.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }

    let chat = message.chat.id.to_string();

    if is_reset(text) {
        return Some(Routed::Command(AdminCommand::reset(Some(chat))));
    }

    if chat != signal_chat {
        warn!(update_id = update.update_id, %chat, "Dropping message from foreign chat");
        return None;
    }

    let id = MessageId::new(format!("tg:{}:{}", chat, message.message_id)).ok()?;
    Some(Routed::Signal(InboundMessage::new(id, text).with_sender(chat)))
}

/// `/reset` or `/reset@botname`, optionally followed by arguments.
fn is_reset(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    let name = command.split('@').next().unwrap_or_default();
    name.eq_ignore_ascii_case(RESET_COMMAND)
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Default)]
struct Inbox {
    signal_chat: String,
    offset: Option<i64>,
    signals: VecDeque<InboundMessage>,
    commands: VecDeque<AdminCommand>,
}

impl Inbox {
    fn new(signal_chat: String) -> Self {
        Self {
            signal_chat,
            ..Self::default()
        }
    }

    fn absorb(&mut self, updates: Vec<Update>) {
        for update in updates {
            self.offset = Some(self.offset.map_or(update.update_id + 1, |o| o.max(update.update_id + 1)));

            match route(&update, &self.signal_chat) {
                Some(Routed::Signal(message)) => self.signals.push_back(message),
                Some(Routed::Command(command)) => self.commands.push_back(command),
                None => debug!(update_id = update.update_id, "Update not routed"),
            }
        }
    }
}

/// Telegram bot acting as signal source, command source and notifier.
pub struct TelegramGateway {
    client: TelegramClient,
    chat_id: String,
    inbox: Mutex<Inbox>,
}

impl TelegramGateway {
    /// Gateway notifying `chat_id` and reading signals from `signal_chat_id`.
    pub fn new(client: TelegramClient, chat_id: impl Into<String>, signal_chat_id: impl Into<String>) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
            inbox: Mutex::new(Inbox::new(signal_chat_id.into())),
        }
    }

    /// Chat receiving notifications
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Pull new updates into the queues. Returns the locked inbox.
    async fn fetch(&self) -> Result<tokio::sync::MutexGuard<'_, Inbox>, ExecError> {
        let mut inbox = self.inbox.lock().await;

        let updates = self.client.get_updates(inbox.offset).await.map_err(|e| {
            warn!(error = %e, "getUpdates failed");
            ExecError::from(e)
        })?;

        if !updates.is_empty() {
            debug!(count = updates.len(), "Fetched Telegram updates");
        }
        inbox.absorb(updates);
        Ok(inbox)
    }
}

#[async_trait]
impl SignalSource for TelegramGateway {
    async fn poll(&self) -> Result<Vec<InboundMessage>, ExecError> {
        let mut inbox = self.fetch().await?;
        Ok(inbox.signals.drain(..).collect())
    }

    async fn requeue(&self, messages: Vec<InboundMessage>) {
        let mut inbox = self.inbox.lock().await;
        for message in messages.into_iter().rev() {
            inbox.signals.push_front(message);
        }
    }
}

#[async_trait]
impl CommandSource for TelegramGateway {
    async fn poll_commands(&self) -> Result<Vec<AdminCommand>, ExecError> {
        let mut inbox = self.fetch().await?;
        Ok(inbox.commands.drain(..).collect())
    }
}

#[async_trait]
impl Notifier for TelegramGateway {
    async fn send(&self, text: &str) -> Result<(), ExecError> {
        self.client.send_message(&self.chat_id, text).await?;
        Ok(())
    }

    async fn send_to(&self, recipient: &str, text: &str) -> Result<(), ExecError> {
        self.client.send_message(recipient, text).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNAL_CHAT: &str = "-1002277376839";

    fn updates(body: &str) -> Vec<Update> {
        let envelope: Envelope<Vec<Update>> = serde_json::from_str(body).unwrap();
        envelope.result.unwrap()
    }

    const BODY: &str = r#"{
        "ok": true,
        "result": [
            {
                "update_id": 100,
                "channel_post": {
                    "message_id": 7,
                    "chat": { "id": -1002277376839, "type": "channel" },
                    "date": 1700000000,
                    "text": "Pair: BTCUSD\nType: Buy\nx\ny\nz"
                }
            },
            {
                "update_id": 101,
                "message": {
                    "message_id": 3,
                    "chat": { "id": 42, "type": "private" },
                    "from": { "id": 42, "is_bot": false, "first_name": "Op" },
                    "date": 1700000001,
                    "text": "/reset@relay_bot"
                }
            },
            {
                "update_id": 102,
                "message": {
                    "message_id": 4,
                    "chat": { "id": 42, "type": "private" },
                    "date": 1700000002,
                    "photo": []
                }
            }
        ]
    }"#;

    #[test]
    fn test_route_channel_post_as_signal() {
        let parsed = updates(BODY);

        match route(&parsed[0], SIGNAL_CHAT) {
            Some(Routed::Signal(message)) => {
                assert_eq!(message.id.as_str(), "tg:-1002277376839:7");
                assert_eq!(message.sender.as_deref(), Some("-1002277376839"));
                assert!(message.text.starts_with("Pair: BTCUSD"));
            },
            other => panic!("expected signal, got {other:?}"),
        }
    }

    #[test]
    fn test_route_reset_command() {
        let parsed = updates(BODY);

        assert_eq!(
            route(&parsed[1], SIGNAL_CHAT),
            Some(Routed::Command(AdminCommand::reset(Some("42".to_string()))))
        );
        assert_eq!(route(&parsed[2], SIGNAL_CHAT), None);
    }

    #[test]
    fn test_route_drops_signal_from_foreign_chat() {
        let parsed = updates(
            r#"{
            "ok": true,
            "result": [{
                "update_id": 200,
                "message": {
                    "message_id": 9,
                    "chat": { "id": 555, "type": "private" },
                    "date": 1700000003,
                    "text": "Pair: BTCUSD\nType: Sell\nEntry: 1\nSize: 999999 USD\n#BTCUSD"
                }
            }]
        }"#,
        );

        assert_eq!(route(&parsed[0], SIGNAL_CHAT), None);
        assert_eq!(route(&parsed[0], "555").map(|r| matches!(r, Routed::Signal(_))), Some(true));

        let mut inbox = Inbox::new(SIGNAL_CHAT.to_string());
        inbox.absorb(parsed);
        assert!(inbox.signals.is_empty());
        assert_eq!(inbox.offset, Some(201));
    }

    #[tokio::test]
    async fn test_requeue_keeps_order_ahead_of_new_signals() {
        let gateway = TelegramGateway::new(TelegramClient::new("token"), SIGNAL_CHAT, SIGNAL_CHAT);
        gateway.inbox.lock().await.absorb(updates(BODY));

        let tail = vec![
            InboundMessage::new(MessageId::new("tg:-1002277376839:5").unwrap(), "b"),
            InboundMessage::new(MessageId::new("tg:-1002277376839:6").unwrap(), "c"),
        ];
        gateway.requeue(tail).await;

        let inbox = gateway.inbox.lock().await;
        let ids: Vec<_> = inbox.signals.iter().map(|m| m.id.as_str().to_string()).collect();
        assert_eq!(ids, ["tg:-1002277376839:5", "tg:-1002277376839:6", "tg:-1002277376839:7"]);
    }

    #[test]
    fn test_is_reset() {
        assert!(is_reset("/reset"));
        assert!(is_reset("/RESET now"));
        assert!(is_reset("/reset@relay_bot"));
        assert!(!is_reset("/resetall"));
        assert!(!is_reset("reset"));
    }

    #[test]
    fn test_inbox_advances_offset_and_splits_queues() {
        let mut inbox = Inbox::new(SIGNAL_CHAT.to_string());
        inbox.absorb(updates(BODY));

        assert_eq!(inbox.offset, Some(103));
        assert_eq!(inbox.signals.len(), 1);
        assert_eq!(inbox.commands.len(), 1);

        inbox.absorb(Vec::new());
        assert_eq!(inbox.offset, Some(103));
    }

    #[test]
    fn test_error_envelope() {
        let envelope: Envelope<Vec<Update>> =
            serde_json::from_str(r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#)
                .unwrap();

        assert!(!envelope.ok);
        assert_eq!(envelope.error_code, Some(401));
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_error_maps_to_transport() {
        let err: ExecError = TelegramError::Timeout.into();
        assert!(err.is_transport());
    }
}
