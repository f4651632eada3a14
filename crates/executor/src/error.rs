use crate::trade::TradeId;
use api_client::GatewayError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Insufficient {currency} balance. Requested: {requested}, Available: {available}")]
    InsufficientBalance {
        currency: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Trade {0} is not active")]
    NotActive(TradeId),

    #[error("A trade for {0} is already active")]
    AlreadyActive(String),

    #[error("Trade {0} is already closed")]
    TradeClosed(TradeId),

    #[error("Trade {0} is still open")]
    StillOpen(TradeId),

    #[error("An order for {0} is already in flight")]
    OrderInFlight(String),

    #[error("Profit is undefined for a zero starting value")]
    UndefinedProfit,

    #[error("No price known for {0}")]
    MissingPrice(String),

    #[error("The trading session has already been initialized")]
    AlreadyInitialized,

    #[error("Trading on {0} is paused after repeated exchange failures")]
    TradingPaused(String),

    #[error("Live trading halted: {0}")]
    LiveHalted(String),

    #[error("Order for {symbol} rejected: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}
