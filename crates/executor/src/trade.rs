use crate::error::ExecutorError;
use chrono::{DateTime, Utc};
use core_types::CloseReason;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential per-account trade number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    Open,
    Closed { reason: CloseReason },
}

/// One long position in one currency, from entry to exit.
///
/// Exit distances are fixed in absolute price terms when the trade opens, so
/// the stop and target never drift with later config or price changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: String,
    pub entry_price: Decimal,
    /// Base quantity held by this trade.
    pub quantity: Decimal,
    /// Fiat that left the wallet to open the trade.
    pub quote_spent: Decimal,
    pub trailing_distance: Decimal,
    pub take_profit_distance: Decimal,
    pub trailing_stop: Decimal,
    /// Confluence score at the last evaluated tick.
    pub confluence: i32,
    pub state: TradeState,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    /// Fiat received on close, after commission.
    pub proceeds: Option<Decimal>,
    pub commission: Decimal,
}

impl Trade {
    /// Opens a trade at `entry_price`. `trailing_sl` and `take_profit` are
    /// fractions of the entry price.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: TradeId,
        symbol: impl Into<String>,
        entry_price: Decimal,
        quantity: Decimal,
        quote_spent: Decimal,
        trailing_sl: Decimal,
        take_profit: Decimal,
        confluence: i32,
        at: DateTime<Utc>,
    ) -> Self {
        let trailing_distance = entry_price * trailing_sl;
        Self {
            id,
            symbol: symbol.into(),
            entry_price,
            quantity,
            quote_spent,
            trailing_distance,
            take_profit_distance: entry_price * take_profit,
            trailing_stop: entry_price - trailing_distance,
            confluence,
            state: TradeState::Open,
            opened_at: at,
            closed_at: None,
            exit_price: None,
            proceeds: None,
            commission: Decimal::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == TradeState::Open
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            TradeState::Open => None,
            TradeState::Closed { reason } => Some(reason),
        }
    }

    pub fn take_profit_level(&self) -> Decimal {
        self.entry_price + self.take_profit_distance
    }

    /// Records the latest tick. Returns whether the stop moved.
    ///
    /// The stop only ever ratchets upwards.
    pub fn observe(&mut self, price: Decimal, confluence: i32) -> bool {
        if !self.is_open() {
            return false;
        }
        self.confluence = confluence;
        let candidate = price - self.trailing_distance;
        if candidate > self.trailing_stop {
            self.trailing_stop = candidate;
            true
        } else {
            false
        }
    }

    /// Which exit, if any, `price` triggers. Take-profit is checked first so
    /// it wins when both levels are crossed on the same tick.
    ///
    /// `close_confluence` is `None` when confluence-based closing is disabled.
    pub fn exit_reason(
        &self,
        price: Decimal,
        confluence: i32,
        close_confluence: Option<i32>,
    ) -> Option<CloseReason> {
        if !self.is_open() {
            return None;
        }
        if price >= self.take_profit_level() {
            Some(CloseReason::TakeProfit)
        } else if price <= self.trailing_stop {
            Some(CloseReason::TrailingStop)
        } else if close_confluence.is_some_and(|threshold| confluence <= -threshold) {
            Some(CloseReason::ConfluenceClose)
        } else {
            None
        }
    }

    pub fn close(
        &mut self,
        reason: CloseReason,
        exit_price: Decimal,
        proceeds: Decimal,
        commission: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), ExecutorError> {
        if !self.is_open() {
            return Err(ExecutorError::TradeClosed(self.id));
        }
        self.state = TradeState::Closed { reason };
        self.exit_price = Some(exit_price);
        self.proceeds = Some(proceeds);
        self.commission = commission;
        self.closed_at = Some(at);
        Ok(())
    }

    /// Realised profit in fiat, once closed.
    pub fn profit(&self) -> Option<Decimal> {
        self.proceeds.map(|p| p - self.quote_spent)
    }

    /// Mark-to-market value of the position at `price`.
    pub fn unrealized(&self, price: Decimal) -> Decimal {
        self.quantity * price - self.quote_spent
    }
}
