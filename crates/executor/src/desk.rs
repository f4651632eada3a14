use crate::account::Account;
use crate::error::ExecutorError;
use crate::trade::Trade;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::TradingConfig;
use core_types::{CloseReason, Fill, OrderSide, SignalReading};
use dashmap::DashSet;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a signal did to the account.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Opened(Trade),
    Closed(Trade),
}

/// Where fills come from. The desk reserves funds before calling a venue
/// and settles them after, so a venue only has to report what executed.
#[async_trait]
pub trait FillVenue: Send + Sync {
    /// Spends up to `quote` fiat on `symbol`. `price` is the signal-time price.
    async fn buy(
        &self,
        symbol: &str,
        quote: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Fill, ExecutorError>;

    /// Sells up to `quantity` of `symbol`; `Fill::quantity` is what actually
    /// sold. `Fill::commission` is charged in fiat.
    async fn sell(
        &self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Fill, ExecutorError>;
}

/// Fills everything instantly at the signal price with no commission.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticVenue;

#[async_trait]
impl FillVenue for SyntheticVenue {
    async fn buy(
        &self,
        symbol: &str,
        quote: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Fill, ExecutorError> {
        if price <= Decimal::ZERO {
            return Err(ExecutorError::InvalidAmount(price));
        }
        Ok(Fill {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            price,
            quantity: quote / price,
            quote_quantity: quote,
            commission: Decimal::ZERO,
            timestamp: at,
        })
    }

    async fn sell(
        &self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Fill, ExecutorError> {
        Ok(Fill {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            price,
            quantity,
            quote_quantity: quantity * price,
            commission: Decimal::ZERO,
            timestamp: at,
        })
    }
}

/// Marks a symbol as having an order in flight until dropped.
struct InFlight<'a> {
    symbols: &'a DashSet<String>,
    symbol: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.symbols.remove(&self.symbol);
    }
}

/// The dispatch rules shared by every execution mode: when to enter, how
/// an open trade advances, when it exits, and how fills move money.
pub struct TradeDesk<V> {
    config: Arc<TradingConfig>,
    account: Arc<Account>,
    venue: V,
    in_flight: DashSet<String>,
}

impl<V: FillVenue> TradeDesk<V> {
    pub fn new(config: Arc<TradingConfig>, account: Arc<Account>, venue: V) -> Self {
        Self {
            config,
            account,
            venue,
            in_flight: DashSet::new(),
        }
    }

    pub fn config(&self) -> &TradingConfig {
        &self.config
    }

    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    fn claim(&self, symbol: &str) -> Option<InFlight<'_>> {
        self.in_flight.insert(symbol.to_string()).then(|| InFlight {
            symbols: &self.in_flight,
            symbol: symbol.to_string(),
        })
    }

    fn close_threshold(&self) -> Option<i32> {
        self.config
            .close_using_confluence
            .then_some(self.config.close_confluence)
    }

    /// Evaluates one reading for one currency.
    pub async fn on_signal(
        &self,
        symbol: &str,
        reading: SignalReading,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutorError> {
        self.evaluate(symbol, reading, price, at, true).await
    }

    /// Like `on_signal`, but never opens a trade. An open trade still has
    /// its stop advanced and its exits checked.
    pub async fn manage_open(
        &self,
        symbol: &str,
        reading: SignalReading,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutorError> {
        self.evaluate(symbol, reading, price, at, false).await
    }

    async fn evaluate(
        &self,
        symbol: &str,
        reading: SignalReading,
        price: Decimal,
        at: DateTime<Utc>,
        allow_entry: bool,
    ) -> Result<Option<TradeEvent>, ExecutorError> {
        self.account
            .market()
            .update(symbol, price, reading.confluence, at);

        match self.account.active_trade_for(symbol) {
            Some(mut trade) => {
                let previous_stop = trade.trailing_stop;
                let previous_confluence = trade.confluence;
                if trade.observe(price, reading.confluence) {
                    debug!(trade = %trade.id, %symbol, from = %previous_stop, to = %trade.trailing_stop, "Trailing stop raised");
                }
                if trade.trailing_stop != previous_stop || trade.confluence != previous_confluence {
                    self.account.replace_active(trade.clone())?;
                }

                match trade.exit_reason(price, reading.confluence, self.close_threshold()) {
                    Some(reason) => self
                        .settle(&trade, reason, price, at)
                        .await
                        .map(|closed| Some(TradeEvent::Closed(closed))),
                    None => Ok(None),
                }
            }
            None if allow_entry && reading.confluence >= self.config.confluence => {
                self.enter(symbol, reading, price, at).await
            }
            None => Ok(None),
        }
    }

    async fn enter(
        &self,
        symbol: &str,
        reading: SignalReading,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutorError> {
        let Some(_claim) = self.claim(symbol) else {
            debug!(%symbol, "Entry skipped, order already in flight");
            return Ok(None);
        };

        let wallet = self.account.wallet();
        let quote = wallet.fiat() * self.config.money_per_trade;
        if quote <= Decimal::ZERO {
            return Err(ExecutorError::InsufficientBalance {
                currency: "fiat".to_string(),
                requested: quote,
                available: wallet.fiat(),
            });
        }

        // Reserve before the order leaves so concurrent entries cannot
        // spend the same fiat.
        wallet.debit_fiat(quote)?;
        let fill = match self.venue.buy(symbol, quote, price, at).await {
            Ok(fill) => fill,
            Err(e) => {
                wallet.credit_fiat(quote)?;
                return Err(e);
            }
        };

        let unspent = quote - fill.quote_quantity;
        if unspent > Decimal::ZERO {
            wallet.credit_fiat(unspent)?;
        } else if unspent < Decimal::ZERO {
            warn!(%symbol, overspent = %(-unspent), "Fill cost more than reserved");
            wallet.debit_fiat(-unspent)?;
        }
        if fill.quantity > Decimal::ZERO {
            wallet.credit(symbol, fill.quantity)?;
        }

        let trade = Trade::open(
            self.account.next_trade_id(),
            symbol,
            fill.price,
            fill.quantity,
            fill.quote_quantity,
            self.config.trailing_sl,
            self.config.take_profit,
            reading.confluence,
            at,
        );
        self.account.open_trade(trade.clone())?;
        info!(
            trade = %trade.id,
            %symbol,
            price = %trade.entry_price,
            quantity = %trade.quantity,
            confluence = reading.confluence,
            "Trade opened"
        );
        Ok(Some(TradeEvent::Opened(trade)))
    }

    /// Closes `trade` at `price` for `reason`. Fails with `NotActive` if the
    /// trade has already left the active set.
    pub async fn settle(
        &self,
        trade: &Trade,
        reason: CloseReason,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Trade, ExecutorError> {
        let Some(_claim) = self.claim(&trade.symbol) else {
            return Err(ExecutorError::OrderInFlight(trade.symbol.clone()));
        };
        let current = self
            .account
            .active_trade_for(&trade.symbol)
            .filter(|t| t.id == trade.id)
            .ok_or(ExecutorError::NotActive(trade.id))?;

        let wallet = self.account.wallet();
        wallet.debit(&current.symbol, current.quantity)?;
        let fill = match self.venue.sell(&current.symbol, current.quantity, price, at).await {
            Ok(fill) => fill,
            Err(e) => {
                wallet.credit(&current.symbol, current.quantity)?;
                return Err(e);
            }
        };

        // A venue may sell less than asked; the rest stays held.
        let unsold = current.quantity - fill.quantity;
        if unsold > Decimal::ZERO {
            wallet.credit(&current.symbol, unsold)?;
        }
        let proceeds = fill.quote_quantity - fill.commission;
        if proceeds > Decimal::ZERO {
            wallet.credit_fiat(proceeds)?;
        }

        let mut closed = current;
        closed.close(reason, fill.price, proceeds, fill.commission, at)?;
        self.account.close_trade(closed.clone())?;
        info!(
            trade = %closed.id,
            symbol = %closed.symbol,
            %reason,
            price = %fill.price,
            profit = %closed.profit().unwrap_or_default(),
            "Trade closed"
        );
        Ok(closed)
    }

    /// Closes the active trade on `symbol` at the last known price.
    pub async fn close_manually(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Trade>, ExecutorError> {
        let Some(trade) = self.account.active_trade_for(symbol) else {
            return Ok(None);
        };
        let price = self
            .account
            .market()
            .price(symbol)
            .ok_or_else(|| ExecutorError::MissingPrice(symbol.to_string()))?;
        self.settle(&trade, CloseReason::Manual, price, at)
            .await
            .map(Some)
    }
}
