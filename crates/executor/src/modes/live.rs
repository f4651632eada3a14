use crate::account::Account;
use crate::desk::{FillVenue, TradeDesk, TradeEvent};
use crate::error::ExecutorError;
use crate::market::MarketBoard;
use crate::modes::ExecutionMode;
use crate::trade::Trade;
use api_client::{ExchangeGateway, GatewayError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::TradingConfig;
use core_types::{CloseReason, Fill, ModeKind, OrderRequest, SignalReading};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How long a currency stays closed to new entries after exhausted retries.
pub const DEFAULT_PAUSE_COOLDOWN: Duration = Duration::from_secs(300);

/// Fills orders on the exchange through the gateway.
pub struct GatewayVenue {
    gateway: Arc<ExchangeGateway>,
}

impl GatewayVenue {
    pub fn new(gateway: Arc<ExchangeGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl FillVenue for GatewayVenue {
    async fn buy(
        &self,
        symbol: &str,
        quote: Decimal,
        _price: Decimal,
        _at: DateTime<Utc>,
    ) -> Result<Fill, ExecutorError> {
        let order = OrderRequest::market_buy(symbol, quote);
        info!(%symbol, %quote, client_order_id = %order.client_order_id, "Submitting buy");
        Ok(self.gateway.submit_order(&order).await?)
    }

    /// Sells the largest lot-size multiple not above `quantity`. The dust
    /// left over stays in the wallet.
    async fn sell(
        &self,
        symbol: &str,
        quantity: Decimal,
        _price: Decimal,
        _at: DateTime<Utc>,
    ) -> Result<Fill, ExecutorError> {
        let tradable = self.gateway.tradable_quantity(symbol, quantity);
        if tradable.is_zero() {
            return Err(GatewayError::Rejected(format!(
                "{quantity} {symbol} is below the exchange's minimum lot"
            ))
            .into());
        }
        let order = OrderRequest::market_sell(symbol, tradable);
        info!(%symbol, quantity = %tradable, held = %quantity, client_order_id = %order.client_order_id, "Submitting sell");
        let mut fill = self.gateway.submit_order(&order).await?;
        // Fees paid in another asset are not visible on the fill; charge the
        // session taker rate in fiat instead.
        if fill.commission.is_zero() {
            let taker = self.gateway.session().await?.commissions.taker;
            fill.commission = fill.quote_quantity * taker;
        }
        Ok(fill)
    }
}

struct Pause {
    reason: String,
    since: Instant,
}

/// Real trading. Orders go to the exchange, fills come back at whatever
/// price the market gave, and taker commission is paid on exits.
///
/// Exhausted retries pause new entries on the affected currency. Open trades
/// there keep their stops and exits, and the pause lifts after a cooldown,
/// after a successful exit, or on `resume`. A fatal gateway error halts the
/// whole mode.
pub struct LiveMode {
    desk: TradeDesk<GatewayVenue>,
    gateway: Arc<ExchangeGateway>,
    paused: DashMap<String, Pause>,
    pause_cooldown: Duration,
    halted: OnceLock<String>,
}

impl LiveMode {
    pub fn new(
        config: Arc<TradingConfig>,
        username: impl Into<String>,
        gateway: Arc<ExchangeGateway>,
    ) -> Self {
        let market = Arc::new(MarketBoard::new(config.currencies.iter().cloned()));
        let account = Arc::new(Account::new(username, market));
        Self {
            desk: TradeDesk::new(config, account, GatewayVenue::new(gateway.clone())),
            gateway,
            paused: DashMap::new(),
            pause_cooldown: DEFAULT_PAUSE_COOLDOWN,
            halted: OnceLock::new(),
        }
    }

    pub fn with_pause_cooldown(mut self, cooldown: Duration) -> Self {
        self.pause_cooldown = cooldown;
        self
    }

    /// Lifts the pause on one currency. Returns whether it was paused.
    pub fn resume(&self, symbol: &str) -> bool {
        let resumed = self.paused.remove(symbol).is_some();
        if resumed {
            info!(%symbol, "Trading resumed");
        }
        resumed
    }

    pub fn paused(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.paused.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.get().map(String::as_str)
    }

    fn halted_error(&self) -> Option<ExecutorError> {
        self.halted
            .get()
            .map(|reason| ExecutorError::LiveHalted(reason.clone()))
    }

    /// Whether new entries on `symbol` are blocked. An expired pause is
    /// lifted here.
    fn is_paused(&self, symbol: &str) -> bool {
        let expired = self
            .paused
            .remove_if(symbol, |_, pause| pause.since.elapsed() >= self.pause_cooldown);
        if let Some((_, pause)) = expired {
            info!(%symbol, cause = %pause.reason, "Pause expired; trading resumed");
            return false;
        }
        self.paused.contains_key(symbol)
    }

    fn halt(&self, cause: &GatewayError) -> ExecutorError {
        let reason = cause.to_string();
        if self.halted.set(reason.clone()).is_ok() {
            error!(%reason, "Live trading halted");
        }
        ExecutorError::LiveHalted(reason)
    }

    /// Turns gateway failures on one currency into pause, halt or rejection.
    fn escalate(&self, symbol: &str, err: ExecutorError) -> ExecutorError {
        match err {
            ExecutorError::Gateway(e) if e.is_fatal() => self.halt(&e),
            ExecutorError::Gateway(e) if e.is_transient() => {
                warn!(%symbol, error = %e, "Pausing currency after exhausted retries");
                self.paused.insert(
                    symbol.to_string(),
                    Pause {
                        reason: e.to_string(),
                        since: Instant::now(),
                    },
                );
                ExecutorError::TradingPaused(symbol.to_string())
            }
            ExecutorError::Gateway(GatewayError::Rejected(reason)) => {
                warn!(%symbol, %reason, "Order rejected");
                ExecutorError::OrderRejected {
                    symbol: symbol.to_string(),
                    reason,
                }
            }
            other => other,
        }
    }

    fn session_error(&self, err: GatewayError) -> ExecutorError {
        if err.is_fatal() {
            self.halt(&err)
        } else {
            ExecutorError::Gateway(err)
        }
    }
}

#[async_trait]
impl ExecutionMode for LiveMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Live
    }

    fn account(&self) -> &Arc<Account> {
        self.desk.account()
    }

    fn config(&self) -> &TradingConfig {
        self.desk.config()
    }

    /// Loads tracked balances from the exchange, prices them, and takes the
    /// resulting total as the starting value.
    ///
    /// Everything is fetched before the account is touched, so a failed
    /// attempt leaves it empty and can simply be retried.
    async fn initialize(&self) -> Result<(), ExecutorError> {
        let account = self.account();
        if account.is_started() {
            return Err(ExecutorError::AlreadyInitialized);
        }
        let session = self
            .gateway
            .session()
            .await
            .map_err(|e| self.session_error(e))?;
        let fiat = self.gateway.fiat();

        let mut positions = Vec::with_capacity(self.config().currencies.len());
        for symbol in &self.config().currencies {
            let Some(asset) = symbol.strip_suffix(fiat) else {
                warn!(%symbol, %fiat, "Tracked symbol is not quoted in fiat; its balance is ignored");
                continue;
            };
            let price = self
                .gateway
                .price(symbol)
                .await
                .map_err(|e| self.session_error(e))?;
            positions.push((symbol, session.free(asset), price));
        }
        let cash = session.free(fiat);
        let starting_value = cash
            + positions
                .iter()
                .map(|(_, held, price)| held * price)
                .sum::<Decimal>();

        // Claims the session first: a concurrent or repeated call fails here
        // before anything is credited.
        account.begin_session(starting_value, session.commissions)?;
        let now = Utc::now();
        for (symbol, held, price) in positions {
            account.market().set_price(symbol, price, now);
            if held > Decimal::ZERO {
                account.wallet().credit(symbol, held)?;
            }
        }
        if cash > Decimal::ZERO {
            account.wallet().credit_fiat(cash)?;
        }
        info!(%starting_value, %fiat, "Live account loaded");
        Ok(())
    }

    async fn on_signal(
        &self,
        symbol: &str,
        reading: SignalReading,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutorError> {
        if let Some(halted) = self.halted_error() {
            // Keep valuation current even while nothing can trade.
            self.account()
                .market()
                .update(symbol, price, reading.confluence, at);
            return Err(halted);
        }
        if !self.is_paused(symbol) {
            return self
                .desk
                .on_signal(symbol, reading, price, at)
                .await
                .map_err(|e| self.escalate(symbol, e));
        }

        // Paused: no entries, but an open trade still gets its exits.
        match self
            .desk
            .manage_open(symbol, reading, price, at)
            .await
            .map_err(|e| self.escalate(symbol, e))?
        {
            Some(TradeEvent::Closed(trade)) => {
                self.resume(symbol);
                Ok(Some(TradeEvent::Closed(trade)))
            }
            _ => Err(ExecutorError::TradingPaused(symbol.to_string())),
        }
    }

    async fn settle(
        &self,
        trade: &Trade,
        reason: CloseReason,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Trade, ExecutorError> {
        if let Some(halted) = self.halted_error() {
            return Err(halted);
        }
        self.desk
            .settle(trade, reason, price, at)
            .await
            .map_err(|e| self.escalate(&trade.symbol, e))
    }

    async fn close_manually(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Trade>, ExecutorError> {
        if let Some(halted) = self.halted_error() {
            return Err(halted);
        }
        self.desk
            .close_manually(symbol, at)
            .await
            .map_err(|e| self.escalate(symbol, e))
    }
}
