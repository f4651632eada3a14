use crate::auth::sign_request;
use async_trait::async_trait;
use configuration::ExchangeSettings;
use core_types::{OrderRequest, OrderSide, OrderType};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;

mod auth;
pub mod backoff;
pub mod error;
pub mod gateway;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod responses;

// --- Public API ---
pub use error::{ApiError, FailureKind, GatewayError};
pub use gateway::{
    AssetBalance, ExchangeGateway, GatewayConfig, LotSize, RateLimit, SessionSnapshot,
};
pub use responses::{
    AccountResponse, ApiErrorResponse, BalanceResponse, ExchangeInfoResponse, OrderResponse,
    RateLimitResponse, SymbolFilterResponse, SymbolInfoResponse, TickerPriceResponse,
};

/// Binance's "order does not exist" code, returned when querying an unknown
/// client order id.
const UNKNOWN_ORDER: i32 = -2013;

/// The generic, abstract interface for a trading exchange API client.
/// This trait is the contract the gateway is built on, allowing the
/// underlying implementation (live or mock) to be swapped out.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetches exchange metadata, including request rate limits.
    async fn get_exchange_info(&self) -> Result<ExchangeInfoResponse, ApiError>;

    /// Fetches balances and commission rates. (Authenticated)
    async fn get_account(&self) -> Result<AccountResponse, ApiError>;

    /// Fetches the last traded price of a symbol.
    async fn get_price(&self, symbol: &str) -> Result<TickerPriceResponse, ApiError>;

    /// Places a new order on the exchange. (Authenticated)
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError>;

    /// Looks an order up by the client id it was submitted with.
    /// Returns `None` when the exchange has never seen it. (Authenticated)
    async fn query_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderResponse>, ApiError>;
}

/// A concrete implementation of the `ApiClient` for the Binance spot API.
#[derive(Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: Option<String>,
    recv_window_ms: u64,
}

impl BinanceClient {
    pub fn new(settings: &ExchangeSettings) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &settings.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| ApiError::InvalidData(format!("API key is not a valid header: {e}")))?;
            headers.insert("X-MBX-APIKEY", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_secret: settings.api_secret.clone(),
            recv_window_ms: settings.recv_window_ms,
        })
    }

    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(params).send().await?;
        Self::decode(response).await
    }

    async fn send_signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &mut BTreeMap<&str, String>,
    ) -> Result<T, ApiError> {
        let secret = self.api_secret.as_deref().ok_or(ApiError::MissingCredentials)?;
        params.insert("timestamp", chrono::Utc::now().timestamp_millis().to_string());
        params.insert("recvWindow", self.recv_window_ms.to_string());

        let query_string = serde_qs::to_string(params)
            .map_err(|e| ApiError::InvalidData(format!("Failed to encode query: {e}")))?;
        let signature = sign_request(secret, &query_string)?;

        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query_string, signature
        );

        let response = self.client.request(method, &url).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str::<T>(&text)
                .map_err(|e| ApiError::Deserialization(e.to_string()));
        }
        match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(api_error) => Err(ApiError::Exchange {
                status: status.as_u16(),
                code: api_error.code,
                msg: api_error.msg,
            }),
            Err(_) => Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            }),
        }
    }
}

fn side_param(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn type_param(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
    }
}

#[async_trait]
impl ApiClient for BinanceClient {
    async fn get_exchange_info(&self) -> Result<ExchangeInfoResponse, ApiError> {
        self.get_public("/api/v3/exchangeInfo", &[]).await
    }

    async fn get_account(&self) -> Result<AccountResponse, ApiError> {
        let mut params = BTreeMap::new();
        self.send_signed(Method::GET, "/api/v3/account", &mut params).await
    }

    async fn get_price(&self, symbol: &str) -> Result<TickerPriceResponse, ApiError> {
        self.get_public("/api/v3/ticker/price", &[("symbol", symbol)]).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", order.symbol.clone());
        params.insert("side", side_param(order.side).to_string());
        params.insert("type", type_param(order.order_type).to_string());
        params.insert("newClientOrderId", order.client_order_id.to_string());
        params.insert("newOrderRespType", "FULL".to_string());
        match (order.quantity, order.quote_quantity) {
            (Some(quantity), _) => params.insert("quantity", quantity.normalize().to_string()),
            (None, Some(quote)) => params.insert("quoteOrderQty", quote.normalize().to_string()),
            (None, None) => {
                return Err(ApiError::InvalidData(format!(
                    "order {} has neither quantity nor quote quantity",
                    order.client_order_id
                )));
            }
        };

        self.send_signed(Method::POST, "/api/v3/order", &mut params).await
    }

    async fn query_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderResponse>, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("symbol", symbol.to_string());
        params.insert("origClientOrderId", client_order_id.to_string());

        match self
            .send_signed::<OrderResponse>(Method::GET, "/api/v3/order", &mut params)
            .await
        {
            Ok(order) => Ok(Some(order)),
            Err(ApiError::Exchange { code, .. }) if code == UNKNOWN_ORDER => Ok(None),
            Err(ApiError::Exchange { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
