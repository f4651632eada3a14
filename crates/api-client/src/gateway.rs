use crate::backoff::Backoff;
use crate::error::{ApiError, FailureKind, GatewayError};
use crate::responses::{AccountResponse, ExchangeInfoResponse, OrderResponse};
use crate::ApiClient;
use configuration::ExchangeSettings;
use core_types::{Commissions, Fill, OrderRequest, OrderSide};
use governor::{Quota, RateLimiter};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type GatewayRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Fraction of each backoff delay that is randomised.
const BACKOFF_JITTER: f64 = 0.2;

/// Resilience parameters for one gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// The quote asset; commissions charged in it are reported on fills.
    pub fiat: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl GatewayConfig {
    pub fn from_settings(settings: &ExchangeSettings, fiat: impl Into<String>) -> Self {
        Self {
            fiat: fiat.into(),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            max_attempts: settings.max_attempts.max(1),
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }
}

/// The request budget the exchange grants per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimit {
    /// Used when the exchange does not publish a request-weight limit.
    pub const FALLBACK: RateLimit = RateLimit {
        limit: 1200,
        window: Duration::from_secs(60),
    };

    /// Picks the `REQUEST_WEIGHT` entry out of the exchange metadata.
    pub fn from_exchange_info(info: &ExchangeInfoResponse) -> Option<Self> {
        info.rate_limits
            .iter()
            .filter(|r| r.rate_limit_type == "REQUEST_WEIGHT" && r.limit > 0)
            .find_map(|r| {
                let unit = match r.interval.as_str() {
                    "SECOND" => 1,
                    "MINUTE" => 60,
                    "HOUR" => 3_600,
                    "DAY" => 86_400,
                    _ => return None,
                };
                Some(RateLimit {
                    limit: r.limit,
                    window: Duration::from_secs(unit * u64::from(r.interval_num.max(1))),
                })
            })
    }

    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.limit).unwrap_or(NonZeroU32::MIN);
        let period = self.window / burst.get();
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

/// A symbol's `LOT_SIZE` rule: order quantities must be a multiple of
/// `step_size` and at least `min_qty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotSize {
    pub step_size: Decimal,
    pub min_qty: Decimal,
}

impl LotSize {
    /// Reads every symbol's `LOT_SIZE` filter out of the exchange metadata.
    pub fn from_exchange_info(info: &ExchangeInfoResponse) -> HashMap<String, LotSize> {
        info.symbols
            .iter()
            .filter_map(|symbol| {
                let filter = symbol
                    .filters
                    .iter()
                    .find(|f| f.filter_type == "LOT_SIZE")?;
                let lot = LotSize {
                    step_size: filter.step_size.unwrap_or(Decimal::ZERO),
                    min_qty: filter.min_qty.unwrap_or(Decimal::ZERO),
                };
                Some((symbol.symbol.clone(), lot))
            })
            .collect()
    }

    /// The largest valid order quantity not above `quantity`, or zero when
    /// even that would fall below the minimum.
    pub fn round_down(&self, quantity: Decimal) -> Decimal {
        let rounded = if self.step_size > Decimal::ZERO {
            (quantity / self.step_size).floor() * self.step_size
        } else {
            quantity
        };
        if rounded < self.min_qty || rounded <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            rounded.normalize()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Account state read once at the start of a live session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub commissions: Commissions,
    pub balances: Vec<AssetBalance>,
}

impl SessionSnapshot {
    fn from_account(account: AccountResponse) -> Self {
        let bps = Decimal::from(10_000);
        let commissions = match account.commission_rates {
            Some(rates) => Commissions {
                maker: rates.maker,
                taker: rates.taker,
                buyer: rates.buyer,
            },
            None => Commissions {
                maker: Decimal::from(account.maker_commission) / bps,
                taker: Decimal::from(account.taker_commission) / bps,
                buyer: Decimal::from(account.buyer_commission) / bps,
            },
        };
        let balances = account
            .balances
            .into_iter()
            .map(|b| AssetBalance {
                asset: b.asset,
                free: b.free,
                locked: b.locked,
            })
            .collect();
        Self {
            commissions,
            balances,
        }
    }

    /// Free balance of one asset, zero when the account does not hold it.
    pub fn free(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Why the last attempt of a call failed, kept to pick the final error.
enum Attempt {
    Failed(ApiError),
    TimedOut,
}

/// The single path every exchange call takes: rate limited, bounded in time,
/// retried with backoff on transient failures, and classified on the way out.
pub struct ExchangeGateway {
    client: Arc<dyn ApiClient>,
    config: GatewayConfig,
    rate_limit: RateLimit,
    limiter: GatewayRateLimiter,
    lot_sizes: HashMap<String, LotSize>,
    session: OnceCell<SessionSnapshot>,
}

impl ExchangeGateway {
    /// Reads the exchange's published request budget and lot sizes, and
    /// builds the limiter from the budget. Falls back to 1200 requests per
    /// minute if the metadata is missing or cannot be fetched for a
    /// non-fatal reason; quantities are then sent unrounded.
    pub async fn connect(
        client: Arc<dyn ApiClient>,
        config: GatewayConfig,
    ) -> Result<Self, GatewayError> {
        let (published, lot_sizes) =
            match tokio::time::timeout(config.request_timeout, client.get_exchange_info()).await {
                Ok(Ok(info)) => (
                    RateLimit::from_exchange_info(&info),
                    LotSize::from_exchange_info(&info),
                ),
                Ok(Err(e)) if e.kind() == FailureKind::Fatal => {
                    return Err(GatewayError::Fatal(e.to_string()));
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Could not read exchange metadata");
                    (None, HashMap::new())
                }
                Err(_) => {
                    warn!("Timed out reading exchange metadata");
                    (None, HashMap::new())
                }
            };

        let rate_limit = published.unwrap_or_else(|| {
            warn!(
                limit = RateLimit::FALLBACK.limit,
                "No request-weight limit published; using fallback"
            );
            RateLimit::FALLBACK
        });
        info!(
            limit = rate_limit.limit,
            window_secs = rate_limit.window.as_secs(),
            lot_sizes = lot_sizes.len(),
            "Exchange gateway connected"
        );

        Ok(Self {
            client,
            limiter: RateLimiter::direct(rate_limit.quota()),
            config,
            rate_limit,
            lot_sizes,
            session: OnceCell::new(),
        })
    }

    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
    }

    pub fn lot_size(&self, symbol: &str) -> Option<LotSize> {
        self.lot_sizes.get(symbol).copied()
    }

    /// Rounds `quantity` down to what the exchange accepts for `symbol`.
    /// Symbols without a published lot size pass through unchanged.
    pub fn tradable_quantity(&self, symbol: &str, quantity: Decimal) -> Decimal {
        match self.lot_size(symbol) {
            Some(lot) => lot.round_down(quantity),
            None => quantity,
        }
    }

    pub fn fiat(&self) -> &str {
        &self.config.fiat
    }

    /// Commission rates and balances, fetched on first use and cached for
    /// the rest of the session.
    pub async fn session(&self) -> Result<&SessionSnapshot, GatewayError> {
        self.session
            .get_or_try_init(|| async move {
                let account = self
                    .call("account", move || self.client.get_account())
                    .await?;
                let snapshot = SessionSnapshot::from_account(account);
                info!(
                    taker = %snapshot.commissions.taker,
                    maker = %snapshot.commissions.maker,
                    "Session commissions loaded"
                );
                Ok(snapshot)
            })
            .await
    }

    pub async fn price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let ticker = self.call("price", move || self.client.get_price(symbol)).await?;
        Ok(ticker.price)
    }

    /// Looks an order up by its client id, with the usual retry policy.
    pub async fn query_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderResponse>, GatewayError> {
        self.call("query_order", move || {
            self.client.query_order(symbol, client_order_id)
        })
        .await
    }

    /// Places a market order and returns what actually executed.
    ///
    /// When an attempt fails in a way that leaves its outcome unknown, the
    /// order is looked up by client id before anything is resubmitted. If
    /// that lookup itself fails the error is surfaced rather than risking a
    /// duplicate order.
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<Fill, GatewayError> {
        let client_order_id = order.client_order_id.to_string();
        let mut backoff = self.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.limiter.until_ready().await;

            let attempt =
                match tokio::time::timeout(self.config.request_timeout, self.client.place_order(order))
                    .await
                {
                    Ok(Ok(response)) => return self.to_fill(order, response),
                    Ok(Err(e)) => match e.kind() {
                        FailureKind::Rejected => return Err(GatewayError::Rejected(e.to_string())),
                        FailureKind::Fatal => return Err(GatewayError::Fatal(e.to_string())),
                        FailureKind::Transient | FailureKind::RateLimited => Attempt::Failed(e),
                    },
                    Err(_) => Attempt::TimedOut,
                };

            warn!(
                symbol = %order.symbol,
                client_order_id = %client_order_id,
                attempt = attempts,
                "Order outcome unknown; reconciling before retry"
            );
            if let Some(response) = self.query_order(&order.symbol, &client_order_id).await? {
                info!(client_order_id = %client_order_id, "Order found on exchange after failed submit");
                return self.to_fill(order, response);
            }

            if attempts >= self.config.max_attempts {
                return Err(self.exhausted(attempt, attempts));
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            self.config.backoff_base,
            self.config.backoff_max,
            BACKOFF_JITTER,
        )
    }

    async fn call<T, F, Fut>(&self, op: &'static str, mut request: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut backoff = self.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.limiter.until_ready().await;

            let attempt = match tokio::time::timeout(self.config.request_timeout, request()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => match e.kind() {
                    FailureKind::Rejected => return Err(GatewayError::Rejected(e.to_string())),
                    FailureKind::Fatal => return Err(GatewayError::Fatal(e.to_string())),
                    FailureKind::Transient | FailureKind::RateLimited => Attempt::Failed(e),
                },
                Err(_) => Attempt::TimedOut,
            };

            if attempts >= self.config.max_attempts {
                return Err(self.exhausted(attempt, attempts));
            }
            let delay = backoff.next_delay();
            debug!(op, attempt = attempts, delay_ms = delay.as_millis() as u64, "Retrying exchange call");
            tokio::time::sleep(delay).await;
        }
    }

    fn exhausted(&self, last: Attempt, attempts: u32) -> GatewayError {
        match last {
            Attempt::TimedOut => GatewayError::Timeout {
                attempts,
                timeout_ms: self.config.request_timeout.as_millis() as u64,
            },
            Attempt::Failed(e) if e.kind() == FailureKind::RateLimited => {
                GatewayError::RateLimitExceeded { attempts }
            }
            Attempt::Failed(e) => GatewayError::Unavailable {
                attempts,
                message: e.to_string(),
            },
        }
    }

    fn to_fill(&self, order: &OrderRequest, response: OrderResponse) -> Result<Fill, GatewayError> {
        let price = match response.average_price() {
            Some(price) if response.is_filled() => price,
            _ => {
                return Err(GatewayError::Rejected(format!(
                    "order {} for {} was not filled (status {})",
                    response.client_order_id, order.symbol, response.status
                )));
            }
        };

        // Spot charges buys in the base asset and sells in the quote asset.
        let base = order.symbol.strip_suffix(self.config.fiat.as_str());
        let mut base_commission = Decimal::ZERO;
        let mut quote_commission = Decimal::ZERO;
        for fill in &response.fills {
            if fill.commission_asset == self.config.fiat {
                quote_commission += fill.commission;
            } else if Some(fill.commission_asset.as_str()) == base {
                base_commission += fill.commission;
            }
        }

        Ok(Fill {
            symbol: response.symbol,
            side: response.side,
            price,
            quantity: match response.side {
                OrderSide::Buy => response.executed_qty - base_commission,
                OrderSide::Sell => response.executed_qty,
            },
            quote_quantity: response.cummulative_quote_qty,
            commission: quote_commission,
            timestamp: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockExchange, MockFailure, MockOp};
    use crate::responses::RateLimitResponse;
    use rust_decimal_macros::dec;

    fn config() -> GatewayConfig {
        GatewayConfig {
            fiat: "USDT".to_string(),
            request_timeout: Duration::from_millis(200),
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(40),
        }
    }

    fn exchange() -> Arc<MockExchange> {
        Arc::new(
            MockExchange::new("USDT")
                .with_price("BTCUSDT", dec!(20000))
                .with_balance("USDT", dec!(1000))
                .with_commission_bps(10, 10),
        )
    }

    async fn gateway(mock: &Arc<MockExchange>) -> ExchangeGateway {
        ExchangeGateway::connect(mock.clone(), config()).await.unwrap()
    }

    #[test]
    fn picks_request_weight_limit() {
        let info = ExchangeInfoResponse {
            symbols: Vec::new(),
            rate_limits: vec![
                RateLimitResponse {
                    rate_limit_type: "ORDERS".into(),
                    interval: "SECOND".into(),
                    interval_num: 10,
                    limit: 50,
                },
                RateLimitResponse {
                    rate_limit_type: "REQUEST_WEIGHT".into(),
                    interval: "MINUTE".into(),
                    interval_num: 1,
                    limit: 6000,
                },
            ],
        };
        assert_eq!(
            RateLimit::from_exchange_info(&info),
            Some(RateLimit {
                limit: 6000,
                window: Duration::from_secs(60)
            })
        );
        assert_eq!(RateLimit::from_exchange_info(&ExchangeInfoResponse::default()), None);
    }

    #[test]
    fn lot_size_rounds_down_to_step() {
        let lot = LotSize {
            step_size: dec!(0.001),
            min_qty: dec!(0.002),
        };
        assert_eq!(lot.round_down(dec!(0.004995)), dec!(0.004));
        assert_eq!(lot.round_down(dec!(0.005)), dec!(0.005));
        assert_eq!(lot.round_down(dec!(0.0019)), Decimal::ZERO);
        assert_eq!(lot.round_down(dec!(-1)), Decimal::ZERO);
    }

    #[tokio::test]
    async fn reads_lot_sizes_on_connect() {
        let mock = Arc::new(
            MockExchange::new("USDT")
                .with_price("BTCUSDT", dec!(20000))
                .with_lot_size("BTCUSDT", dec!(0.0001)),
        );
        let connected = gateway(&mock).await;

        assert_eq!(
            connected.lot_size("BTCUSDT"),
            Some(LotSize {
                step_size: dec!(0.0001),
                min_qty: dec!(0.0001)
            })
        );
        assert_eq!(connected.tradable_quantity("BTCUSDT", dec!(0.004995)), dec!(0.0049));
        // Unknown symbols are left alone.
        assert_eq!(connected.tradable_quantity("ETHUSDT", dec!(0.004995)), dec!(0.004995));
    }

    #[tokio::test]
    async fn falls_back_when_limits_are_missing() {
        let mock = Arc::new(MockExchange::new("USDT").without_rate_limits());
        let connected = gateway(&mock).await;
        assert_eq!(connected.rate_limit(), RateLimit::FALLBACK);

        let mock = Arc::new(MockExchange::new("USDT"));
        mock.fail_next(MockOp::ExchangeInfo, MockFailure::Unavailable);
        assert_eq!(gateway(&mock).await.rate_limit(), RateLimit::FALLBACK);

        let mock = Arc::new(MockExchange::new("USDT").with_rate_limit(600));
        assert_eq!(gateway(&mock).await.rate_limit().limit, 600);
    }

    #[tokio::test]
    async fn fatal_metadata_error_fails_connect() {
        let mock = exchange();
        mock.fail_next(MockOp::ExchangeInfo, MockFailure::Unauthorized);
        let result = ExchangeGateway::connect(mock.clone(), config()).await;
        assert!(matches!(result, Err(GatewayError::Fatal(_))));
    }

    #[tokio::test]
    async fn session_is_fetched_once() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        let first = gateway.session().await.unwrap().clone();
        mock.set_commission_bps(50, 50);
        let second = gateway.session().await.unwrap();
        assert_eq!(&first, second);
        assert_eq!(second.commissions.taker, dec!(0.001));
        assert_eq!(second.free("USDT"), dec!(1000));
        assert_eq!(second.free("ETH"), Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        mock.fail_next(MockOp::Price, MockFailure::Unavailable);
        mock.fail_next(MockOp::Price, MockFailure::RateLimited);
        assert_eq!(gateway.price("BTCUSDT").await.unwrap(), dec!(20000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_report_last_failure() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        for _ in 0..3 {
            mock.fail_next(MockOp::Price, MockFailure::RateLimited);
        }
        assert_eq!(
            gateway.price("BTCUSDT").await,
            Err(GatewayError::RateLimitExceeded { attempts: 3 })
        );

        for _ in 0..3 {
            mock.fail_next(MockOp::Price, MockFailure::Hang);
        }
        assert_eq!(
            gateway.price("BTCUSDT").await,
            Err(GatewayError::Timeout {
                attempts: 3,
                timeout_ms: 200
            })
        );
    }

    #[tokio::test]
    async fn rejections_are_not_retried() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        let order = OrderRequest::market_buy("BTCUSDT", dec!(5000));
        let result = gateway.submit_order(&order).await;
        assert!(matches!(result, Err(GatewayError::Rejected(_))));
        assert_eq!(mock.place_calls(), 1);
    }

    #[tokio::test]
    async fn buy_fill_is_net_of_base_commission() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        let fill = gateway
            .submit_order(&OrderRequest::market_buy("BTCUSDT", dec!(100)))
            .await
            .unwrap();
        assert_eq!(fill.price, dec!(20000));
        assert_eq!(fill.quote_quantity, dec!(100));
        assert_eq!(fill.quantity, dec!(0.004995));
        assert_eq!(fill.commission, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_response_is_reconciled_without_resubmitting() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        mock.fail_next(MockOp::PlaceOrder, MockFailure::LostResponse);

        let fill = gateway
            .submit_order(&OrderRequest::market_buy("BTCUSDT", dec!(100)))
            .await
            .unwrap();
        assert_eq!(fill.quote_quantity, dec!(100));
        assert_eq!(mock.place_calls(), 1);
        assert_eq!(mock.balance("USDT"), dec!(900));
    }

    #[tokio::test(start_paused = true)]
    async fn unplaced_order_is_retried_after_lookup() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        mock.fail_next(MockOp::PlaceOrder, MockFailure::Hang);

        gateway
            .submit_order(&OrderRequest::market_buy("BTCUSDT", dec!(100)))
            .await
            .unwrap();
        assert_eq!(mock.place_calls(), 2);
        assert_eq!(mock.balance("USDT"), dec!(900));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_stops_resubmission() {
        let mock = exchange();
        let gateway = gateway(&mock).await;
        mock.fail_next(MockOp::PlaceOrder, MockFailure::Unavailable);
        for _ in 0..3 {
            mock.fail_next(MockOp::QueryOrder, MockFailure::Unavailable);
        }

        let result = gateway
            .submit_order(&OrderRequest::market_buy("BTCUSDT", dec!(100)))
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable { attempts: 3, .. })));
        assert_eq!(mock.place_calls(), 1);
    }
}
