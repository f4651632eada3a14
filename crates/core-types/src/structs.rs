use crate::enums::{OrderSide, OrderType, Signal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observed price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// What a signal provider produced for a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalReading {
    pub signal: Signal,
    /// Sum of the indicator votes; positive values agree on an upward move.
    pub confluence: i32,
}

impl SignalReading {
    pub fn new(confluence: i32) -> Self {
        Self {
            signal: Signal::from_confluence(confluence),
            confluence,
        }
    }

    pub fn neutral() -> Self {
        Self::new(0)
    }
}

/// The last known state of a tracked currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub symbol: String,
    pub price: Option<Decimal>,
    pub confluence: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Currency {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: None,
            confluence: 0,
            updated_at: None,
        }
    }
}

/// Exchange fee rates, expressed as fractions (0.001 = 0.1%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Commissions {
    /// Paid when an order adds liquidity to the book.
    pub maker: Decimal,
    /// Paid when an order removes liquidity from the book.
    pub taker: Decimal,
    pub buyer: Decimal,
}

/// An order as the core wants it placed. Buys are sized in quote currency,
/// sells in base quantity, which is how market orders are expressed on spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Option<Decimal>,
    pub quote_quantity: Option<Decimal>,
}

impl OrderRequest {
    pub fn market_buy(symbol: impl Into<String>, quote_quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            quantity: None,
            quote_quantity: Some(quote_quantity),
        }
    }

    pub fn market_sell(symbol: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.into(),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            quantity: Some(quantity),
            quote_quantity: None,
        }
    }
}

/// A realised execution: what was actually bought or sold and at what price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: OrderSide,
    /// Average execution price.
    pub price: Decimal,
    /// Base quantity executed.
    pub quantity: Decimal,
    /// Quote amount exchanged, before commission.
    pub quote_quantity: Decimal,
    /// Commission charged in quote currency.
    pub commission: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reading_derives_signal_from_confluence() {
        let reading = SignalReading::new(3);
        assert_eq!(reading.signal, Signal::StrongBuy);
        assert_eq!(SignalReading::neutral().signal, Signal::Neutral);
    }

    #[test]
    fn market_orders_are_sized_on_the_right_leg() {
        let buy = OrderRequest::market_buy("BTCUSDT", dec!(100));
        assert_eq!(buy.quote_quantity, Some(dec!(100)));
        assert!(buy.quantity.is_none());

        let sell = OrderRequest::market_sell("BTCUSDT", dec!(0.5));
        assert_eq!(sell.quantity, Some(dec!(0.5)));
        assert_ne!(buy.client_order_id, sell.client_order_id);
    }

    #[test]
    fn tick_deserializes_from_json() {
        let tick: Tick = serde_json::from_str(
            r#"{"symbol":"ETHUSDT","price":"1850.25","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(tick.price, dec!(1850.25));
    }
}
