//! An in-memory exchange for tests. Orders execute instantly against a
//! configurable price table and balance sheet, and failures can be queued
//! per operation to exercise the gateway's retry and reconcile paths.

use crate::error::ApiError;
use crate::responses::{
    AccountResponse, BalanceResponse, ExchangeInfoResponse, OrderFillResponse, OrderResponse,
    RateLimitResponse, SymbolFilterResponse, SymbolInfoResponse, TickerPriceResponse,
};
use crate::ApiClient;
use async_trait::async_trait;
use core_types::{OrderRequest, OrderSide};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ExchangeInfo,
    Account,
    Price,
    PlaceOrder,
    QueryOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// HTTP 503.
    Unavailable,
    /// HTTP 429 with code -1003.
    RateLimited,
    /// HTTP 401 with code -2015.
    Unauthorized,
    /// HTTP 400 with code -1013.
    Rejected,
    /// Never answers.
    Hang,
    /// The order executes but the caller sees HTTP 503.
    LostResponse,
}

struct MockState {
    prices: HashMap<String, Decimal>,
    balances: HashMap<String, Decimal>,
    maker_bps: i64,
    taker_bps: i64,
    rate_limits: Vec<RateLimitResponse>,
    /// Step size per symbol; quantities off the step are refused.
    lot_sizes: HashMap<String, Decimal>,
    failures: HashMap<MockOp, VecDeque<MockFailure>>,
    orders: HashMap<String, OrderResponse>,
    next_order_id: i64,
    place_calls: u32,
    slippage: Decimal,
}

pub struct MockExchange {
    fiat: String,
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new(fiat: impl Into<String>) -> Self {
        Self {
            fiat: fiat.into(),
            state: Mutex::new(MockState {
                prices: HashMap::new(),
                balances: HashMap::new(),
                maker_bps: 0,
                taker_bps: 0,
                rate_limits: vec![request_weight(6000)],
                lot_sizes: HashMap::new(),
                failures: HashMap::new(),
                orders: HashMap::new(),
                next_order_id: 1,
                place_calls: 0,
                slippage: Decimal::ZERO,
            }),
        }
    }

    pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.state.lock().balances.insert(asset.to_string(), amount);
        self
    }

    pub fn with_commission_bps(self, maker: i64, taker: i64) -> Self {
        self.set_commission_bps(maker, taker);
        self
    }

    /// Publishes a request-weight limit of `per_minute`.
    pub fn with_rate_limit(self, per_minute: u32) -> Self {
        self.state.lock().rate_limits = vec![request_weight(per_minute)];
        self
    }

    pub fn without_rate_limits(self) -> Self {
        self.state.lock().rate_limits.clear();
        self
    }

    /// Publishes a `LOT_SIZE` filter for `symbol` and enforces it: buys
    /// execute a whole number of steps and sells off the step are refused.
    pub fn with_lot_size(self, symbol: &str, step: Decimal) -> Self {
        self.state.lock().lot_sizes.insert(symbol.to_string(), step);
        self
    }

    /// Moves every execution price against the taker by this fraction.
    pub fn with_slippage(self, fraction: Decimal) -> Self {
        self.state.lock().slippage = fraction;
        self
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().prices.insert(symbol.to_string(), price);
    }

    pub fn set_commission_bps(&self, maker: i64, taker: i64) {
        let mut state = self.state.lock();
        state.maker_bps = maker;
        state.taker_bps = taker;
    }

    /// Queues a failure for the next call of `op`. Queued failures are
    /// consumed in order, one per call.
    pub fn fail_next(&self, op: MockOp, failure: MockFailure) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(failure);
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.state
            .lock()
            .balances
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// How many times `place_order` was called, failed calls included.
    pub fn place_calls(&self) -> u32 {
        self.state.lock().place_calls
    }

    /// Orders that actually executed.
    pub fn executed_orders(&self) -> usize {
        self.state.lock().orders.len()
    }

    fn take_failure(&self, op: MockOp) -> Option<MockFailure> {
        self.state
            .lock()
            .failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
    }

    /// Resolves a queued failure that does not depend on the operation.
    async fn fail(failure: MockFailure) -> ApiError {
        match failure {
            MockFailure::Unavailable | MockFailure::LostResponse => ApiError::Status {
                status: 503,
                body: "Service Unavailable".to_string(),
            },
            MockFailure::RateLimited => exchange_error(429, -1003, "Too many requests"),
            MockFailure::Unauthorized => exchange_error(401, -2015, "Invalid API-key"),
            MockFailure::Rejected => exchange_error(400, -1013, "Filter failure"),
            MockFailure::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3_600)).await;
                ApiError::Status {
                    status: 504,
                    body: "Gateway Timeout".to_string(),
                }
            }
        }
    }

    fn execute(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        let mut state = self.state.lock();
        let base = order
            .symbol
            .strip_suffix(self.fiat.as_str())
            .ok_or_else(|| exchange_error(400, -1121, "Invalid symbol"))?
            .to_string();
        let market = *state
            .prices
            .get(&order.symbol)
            .ok_or_else(|| exchange_error(400, -1121, "Invalid symbol"))?;
        let taker = Decimal::from(state.taker_bps) / Decimal::from(10_000);
        let slip = state.slippage;
        let step = state.lot_sizes.get(&order.symbol).copied();

        let (price, qty, quote, fill_commission, commission_asset) = match order.side {
            OrderSide::Buy => {
                let quote = order
                    .quote_quantity
                    .ok_or_else(|| exchange_error(400, -1102, "quoteOrderQty missing"))?;
                let price = market * (Decimal::ONE + slip);
                let (qty, quote) = match step {
                    Some(step) => {
                        let qty = (quote / price / step).floor() * step;
                        (qty, qty * price)
                    }
                    None => (quote / price, quote),
                };
                let commission = qty * taker;
                if state.balances.get(&self.fiat).copied().unwrap_or_default() < quote {
                    return Err(exchange_error(400, -2010, "Account has insufficient balance"));
                }
                *state.balances.entry(self.fiat.clone()).or_default() -= quote;
                *state.balances.entry(base.clone()).or_default() += qty - commission;
                (price, qty, quote, commission, base)
            }
            OrderSide::Sell => {
                let qty = order
                    .quantity
                    .ok_or_else(|| exchange_error(400, -1102, "quantity missing"))?;
                if step.is_some_and(|step| !(qty % step).is_zero()) {
                    return Err(exchange_error(400, -1013, "Filter failure: LOT_SIZE"));
                }
                let price = market * (Decimal::ONE - slip);
                let quote = qty * price;
                let commission = quote * taker;
                if state.balances.get(&base).copied().unwrap_or_default() < qty {
                    return Err(exchange_error(400, -2010, "Account has insufficient balance"));
                }
                *state.balances.entry(base).or_default() -= qty;
                *state.balances.entry(self.fiat.clone()).or_default() += quote - commission;
                (price, qty, quote, commission, self.fiat.clone())
            }
        };

        let order_id = state.next_order_id;
        state.next_order_id += 1;
        let response = OrderResponse {
            symbol: order.symbol.clone(),
            order_id,
            client_order_id: order.client_order_id.to_string(),
            executed_qty: qty,
            cummulative_quote_qty: quote,
            status: "FILLED".to_string(),
            side: order.side,
            order_type: "MARKET".to_string(),
            fills: vec![OrderFillResponse {
                price,
                qty,
                commission: fill_commission,
                commission_asset,
            }],
        };
        state
            .orders
            .insert(response.client_order_id.clone(), response.clone());
        Ok(response)
    }
}

fn request_weight(limit: u32) -> RateLimitResponse {
    RateLimitResponse {
        rate_limit_type: "REQUEST_WEIGHT".to_string(),
        interval: "MINUTE".to_string(),
        interval_num: 1,
        limit,
    }
}

fn exchange_error(status: u16, code: i32, msg: &str) -> ApiError {
    ApiError::Exchange {
        status,
        code,
        msg: msg.to_string(),
    }
}

#[async_trait]
impl ApiClient for MockExchange {
    async fn get_exchange_info(&self) -> Result<ExchangeInfoResponse, ApiError> {
        if let Some(failure) = self.take_failure(MockOp::ExchangeInfo) {
            return Err(Self::fail(failure).await);
        }
        let state = self.state.lock();
        let symbols = state
            .lot_sizes
            .iter()
            .map(|(symbol, step)| SymbolInfoResponse {
                symbol: symbol.clone(),
                filters: vec![SymbolFilterResponse {
                    filter_type: "LOT_SIZE".to_string(),
                    min_qty: Some(*step),
                    step_size: Some(*step),
                }],
            })
            .collect();
        Ok(ExchangeInfoResponse {
            rate_limits: state.rate_limits.clone(),
            symbols,
        })
    }

    async fn get_account(&self) -> Result<AccountResponse, ApiError> {
        if let Some(failure) = self.take_failure(MockOp::Account) {
            return Err(Self::fail(failure).await);
        }
        let state = self.state.lock();
        let mut balances: Vec<BalanceResponse> = state
            .balances
            .iter()
            .map(|(asset, free)| BalanceResponse {
                asset: asset.clone(),
                free: *free,
                locked: Decimal::ZERO,
            })
            .collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(AccountResponse {
            maker_commission: state.maker_bps,
            taker_commission: state.taker_bps,
            buyer_commission: 0,
            commission_rates: None,
            balances,
        })
    }

    async fn get_price(&self, symbol: &str) -> Result<TickerPriceResponse, ApiError> {
        if let Some(failure) = self.take_failure(MockOp::Price) {
            return Err(Self::fail(failure).await);
        }
        let price = self
            .state
            .lock()
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| exchange_error(400, -1121, "Invalid symbol"))?;
        Ok(TickerPriceResponse {
            symbol: symbol.to_string(),
            price,
        })
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        self.state.lock().place_calls += 1;
        match self.take_failure(MockOp::PlaceOrder) {
            Some(MockFailure::LostResponse) => {
                self.execute(order)?;
                Err(Self::fail(MockFailure::LostResponse).await)
            }
            Some(failure) => Err(Self::fail(failure).await),
            None => self.execute(order),
        }
    }

    async fn query_order(
        &self,
        _symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderResponse>, ApiError> {
        if let Some(failure) = self.take_failure(MockOp::QueryOrder) {
            return Err(Self::fail(failure).await);
        }
        Ok(self.state.lock().orders.get(client_order_id).cloned())
    }
}
