//! Binance isolated margin connector.
//!
//! The relay only needs three calls from Binance: a market order on the
//! isolated margin account, the last traded price, and a connectivity ping.
//! [`BinanceExecutor`] turns those into the [`OrderExecutor`] port; sizes are
//! base-asset quantities (BTC for BTCUSDT).
//!
//! Signed calls carry the API key in `X-MBX-APIKEY` and append
//! `timestamp` and an HMAC-SHA256 `signature` over the sorted query string.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use relay_domain::{Direction, Position, Price, Quantity, Side};
use relay_exec::{ExecError, OrderExecutor, OrderOutcome, OrderReceipt};

type HmacSha256 = Hmac<Sha256>;

/// Production endpoint
const MAINNET_URL: &str = "https://api.binance.com";

/// Spot testnet endpoint
const TESTNET_URL: &str = "https://testnet.binance.vision";

const MARGIN_ORDER_PATH: &str = "/sapi/v1/margin/order";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
const PING_PATH: &str = "/api/v3/ping";

/// Per-request deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Order status of a completely filled order
const STATUS_FILLED: &str = "FILLED";

// =============================================================================
// Errors
// =============================================================================

/// Failures talking to Binance.
#[derive(Debug, Clone, Error)]
pub enum BinanceRestError {
    /// The secret could not key the HMAC
    #[error("Cannot sign request: {0}")]
    SignatureError(String),

    /// Transport-level failure or unexpected HTTP status
    #[error("Binance request failed: {0}")]
    RequestFailed(String),

    /// Binance answered with an error payload
    #[error("Binance rejected request: {code} - {msg}")]
    ApiError { code: i64, msg: String },

    /// Body did not match the expected shape
    #[error("Unexpected Binance response: {0}")]
    ParseError(String),

    /// No answer within the deadline
    #[error("Binance request timed out")]
    Timeout,
}

impl From<BinanceRestError> for ExecError {
    fn from(e: BinanceRestError) -> Self {
        match e {
            BinanceRestError::SignatureError(msg) => ExecError::Config(msg),
            other => ExecError::Transport(other.to_string()),
        }
    }
}

// =============================================================================
// Request signing
// =============================================================================

/// Hex HMAC-SHA256 of `payload` keyed with `secret`.
fn sign(secret: &str, payload: &str) -> Result<String, BinanceRestError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BinanceRestError::SignatureError(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sorted query with `timestamp` and a trailing `signature`.
fn signed_query(secret: &str, mut params: Vec<(&str, String)>, timestamp_ms: i64) -> Result<String, BinanceRestError> {
    params.push(("timestamp", timestamp_ms.to_string()));
    params.sort_by(|a, b| a.0.cmp(b.0));

    let query = encode_query(&params);
    let signature = sign(secret, &query)?;
    Ok(format!("{}&signature={}", query, signature))
}

// =============================================================================
// Margin orders
// =============================================================================

/// Borrow/repay behaviour attached to a margin order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Borrow what the order needs
    MarginBuy,
    /// Repay borrowed funds with the proceeds
    AutoRepay,
}

impl SideEffect {
    fn as_str(&self) -> &'static str {
        match self {
            SideEffect::MarginBuy => "MARGIN_BUY",
            SideEffect::AutoRepay => "AUTO_REPAY",
        }
    }
}

/// Parameters of an isolated margin market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginOrder<'a> {
    pub symbol: &'a str,
    pub direction: Direction,
    pub quantity: Decimal,
    pub side_effect: SideEffect,
    pub client_order_id: &'a str,
}

impl MarginOrder<'_> {
    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.to_string()),
            ("isIsolated", "TRUE".to_string()),
            ("side", self.direction.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", self.quantity.normalize().to_string()),
            ("sideEffectType", self.side_effect.as_str().to_string()),
            ("newClientOrderId", self.client_order_id.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ]
    }
}

// =============================================================================
// Client
// =============================================================================

/// Thin Binance REST client.
pub struct BinanceRestClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceRestClient {
    /// Client for the production endpoint.
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            http: Client::new(),
            base_url: MAINNET_URL.to_string(),
            api_key,
            api_secret,
        }
    }

    /// Client for the spot testnet.
    pub fn testnet(api_key: String, api_secret: String) -> Self {
        Self::new(api_key, api_secret).with_base_url(TESTNET_URL)
    }

    /// Point the client somewhere else (proxies, mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Endpoint root in use
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run `request` under the deadline and return the body of a 2xx answer.
    async fn execute(&self, request: RequestBuilder) -> Result<String, BinanceRestError> {
        let response = timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| BinanceRestError::Timeout)?
            .map_err(|e| BinanceRestError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BinanceRestError::RequestFailed(e.to_string()))?;

        if status.is_success() {
            return Ok(body);
        }

        match serde_json::from_str::<BinanceErrorResponse>(&body) {
            Ok(payload) => Err(BinanceRestError::ApiError {
                code: payload.code,
                msg: payload.msg,
            }),
            Err(_) => Err(BinanceRestError::RequestFailed(format!("HTTP {}: {}", status, body))),
        }
    }

    async fn public_get(&self, path: &str, params: &[(&str, String)]) -> Result<String, BinanceRestError> {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&encode_query(params));
        }
        self.execute(self.http.get(url)).await
    }

    async fn signed_post(&self, path: &str, params: Vec<(&str, String)>) -> Result<String, BinanceRestError> {
        let query = signed_query(&self.api_secret, params, Utc::now().timestamp_millis())?;
        let url = format!("{}{}?{}", self.base_url, path, query);
        self.execute(self.http.post(url).header("X-MBX-APIKEY", &self.api_key))
            .await
    }

    /// Place an isolated margin market order.
    ///
    /// # Endpoint
    ///
    /// `POST /sapi/v1/margin/order`
    pub async fn place_margin_order(&self, order: &MarginOrder<'_>) -> Result<BinanceOrderResponse, BinanceRestError> {
        let body = self.signed_post(MARGIN_ORDER_PATH, order.params()).await?;
        parse_json(&body)
    }

    /// Last traded price of `symbol`.
    pub async fn get_price(&self, symbol: &str) -> Result<Price, BinanceRestError> {
        let body = self
            .public_get(TICKER_PRICE_PATH, &[("symbol", symbol.to_string())])
            .await?;
        let ticker: PriceResponse = parse_json(&body)?;

        Price::new(ticker.price).map_err(|e| BinanceRestError::ParseError(e.to_string()))
    }

    /// Connectivity check; any 2xx answer counts.
    pub async fn ping(&self) -> Result<(), BinanceRestError> {
        self.public_get(PING_PATH, &[]).await.map(|_| ())
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, BinanceRestError> {
    serde_json::from_str(body).map_err(|e| BinanceRestError::ParseError(e.to_string()))
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Deserialize)]
struct BinanceErrorResponse {
    code: i64,
    msg: String,
}

/// Margin order answer (`newOrderRespType=RESULT`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrderResponse {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub transact_time: i64,
    pub executed_qty: Decimal,
    /// Quote asset spent or received (Binance's spelling)
    pub cummulative_quote_qty: Decimal,
    pub status: String,
}

impl BinanceOrderResponse {
    /// Average fill price, when anything was executed
    pub fn average_price(&self) -> Option<Price> {
        if self.executed_qty <= Decimal::ZERO {
            return None;
        }
        self.cummulative_quote_qty
            .checked_div(self.executed_qty)
            .and_then(|p| Price::new(p).ok())
    }

    fn is_filled(&self) -> bool {
        self.status == STATUS_FILLED
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Decimal,
}

// =============================================================================
// Order Executor adapter
// =============================================================================

/// [`OrderExecutor`] placing isolated margin market orders on one symbol.
///
/// A reachable Binance that refuses or does not fill an order yields
/// `OrderOutcome::Failure`; only transport problems surface as errors.
pub struct BinanceExecutor {
    client: BinanceRestClient,
    symbol: String,
}

impl BinanceExecutor {
    /// Trade `symbol` through `client`
    pub fn new(client: BinanceRestClient, symbol: impl Into<String>) -> Self {
        Self {
            client,
            symbol: symbol.into(),
        }
    }

    /// Underlying REST client
    pub fn client(&self) -> &BinanceRestClient {
        &self.client
    }

    async fn place(
        &self,
        direction: Direction,
        size: Quantity,
        side_effect: SideEffect,
    ) -> Result<OrderOutcome, ExecError> {
        let client_order_id = Uuid::now_v7().simple().to_string();
        let order = MarginOrder {
            symbol: &self.symbol,
            direction,
            quantity: size.as_decimal(),
            side_effect,
            client_order_id: &client_order_id,
        };

        debug!(
            symbol = %self.symbol,
            %direction,
            %size,
            %client_order_id,
            "Placing margin order"
        );

        let response = match self.client.place_margin_order(&order).await {
            Ok(response) => response,
            Err(BinanceRestError::ApiError { code, msg }) => {
                return Ok(OrderOutcome::failure(format!("{} ({})", msg, code)));
            },
            Err(e) => return Err(e.into()),
        };

        if !response.is_filled() {
            return Ok(OrderOutcome::failure(format!(
                "order {} ended {}",
                response.order_id, response.status
            )));
        }

        let fill_price = match response.average_price() {
            Some(price) => price,
            None => {
                warn!(order_id = response.order_id, "Fill price missing, using ticker");
                self.client.get_price(&self.symbol).await?
            },
        };

        Ok(OrderOutcome::Success(OrderReceipt::new(response.order_id.to_string(), fill_price)))
    }
}

#[async_trait]
impl OrderExecutor for BinanceExecutor {
    async fn open(&self, side: Side, size: Quantity) -> Result<OrderOutcome, ExecError> {
        self.place(side.entry_direction(), size, SideEffect::MarginBuy).await
    }

    async fn close(&self, position: &Position) -> Result<OrderOutcome, ExecError> {
        self.place(position.side.exit_direction(), position.size, SideEffect::AutoRepay)
            .await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // Worked example from the Binance API documentation
    const DOC_SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
    const DOC_QUERY: &str =
        "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
    const DOC_SIGNATURE: &str = "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71";

    #[test]
    fn test_sign_matches_documented_vector() {
        assert_eq!(sign(DOC_SECRET, DOC_QUERY).unwrap(), DOC_SIGNATURE);
    }

    #[test]
    fn test_signed_query_is_sorted_and_signed() {
        let query = signed_query(
            "secret",
            vec![("symbol", "BTCUSDT".to_string()), ("isIsolated", "TRUE".to_string())],
            1_700_000_000_000,
        )
        .unwrap();

        let (payload, signature) = query.rsplit_once("&signature=").unwrap();
        assert_eq!(payload, "isIsolated=TRUE&symbol=BTCUSDT&timestamp=1700000000000");
        assert_eq!(signature, sign("secret", payload).unwrap());
    }

    #[test]
    fn test_margin_order_params() {
        let order = MarginOrder {
            symbol: "BTCUSDT",
            direction: Direction::Sell,
            quantity: dec!(0.500),
            side_effect: SideEffect::AutoRepay,
            client_order_id: "abc",
        };

        let params = order.params();
        let get = |key: &str| params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());

        assert_eq!(get("side"), Some("SELL"));
        assert_eq!(get("type"), Some("MARKET"));
        assert_eq!(get("quantity"), Some("0.5"));
        assert_eq!(get("sideEffectType"), Some("AUTO_REPAY"));
        assert_eq!(get("isIsolated"), Some("TRUE"));
        assert_eq!(get("newClientOrderId"), Some("abc"));
    }

    #[test]
    fn test_order_response_parsing() {
        let body = r#"{
            "symbol": "BTCUSDT",
            "orderId": 28,
            "clientOrderId": "0192b1c4e5f67a8b9c0d1e2f3a4b5c6d",
            "transactTime": 1507725176595,
            "price": "0.00000000",
            "origQty": "0.50000000",
            "executedQty": "0.50000000",
            "cummulativeQuoteQty": "50000.00000000",
            "status": "FILLED",
            "timeInForce": "GTC",
            "type": "MARKET",
            "side": "BUY",
            "isIsolated": true
        }"#;

        let response: BinanceOrderResponse = parse_json(body).unwrap();

        assert_eq!(response.order_id, 28);
        assert!(response.is_filled());
        assert_eq!(response.average_price().unwrap().as_decimal(), dec!(100000));
    }

    #[test]
    fn test_unfilled_order_has_no_price() {
        let body = r#"{
            "symbol": "BTCUSDT",
            "orderId": 29,
            "clientOrderId": "x",
            "transactTime": 0,
            "executedQty": "0",
            "cummulativeQuoteQty": "0",
            "status": "EXPIRED"
        }"#;

        let response: BinanceOrderResponse = parse_json(body).unwrap();

        assert!(!response.is_filled());
        assert!(response.average_price().is_none());
    }

    #[test]
    fn test_error_mapping() {
        let transport: ExecError = BinanceRestError::Timeout.into();
        assert!(transport.is_transport());

        let config: ExecError = BinanceRestError::SignatureError("bad key".to_string()).into();
        assert!(matches!(config, ExecError::Config(_)));
    }

    #[test]
    fn test_base_url_override() {
        let client = BinanceRestClient::testnet("k".to_string(), "s".to_string());
        assert_eq!(client.base_url(), TESTNET_URL);

        let client = client.with_base_url("http://127.0.0.1:9000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:9000");
    }
}
