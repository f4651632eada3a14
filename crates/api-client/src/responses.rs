use core_types::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// Using `#[serde(rename_all = "camelCase")]` to automatically map from JSON camelCase to Rust snake_case.

/// The subset of `GET /api/v3/exchangeInfo` the gateway needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeInfoResponse {
    #[serde(default)]
    pub rate_limits: Vec<RateLimitResponse>,
    #[serde(default)]
    pub symbols: Vec<SymbolInfoResponse>,
}

/// One entry of the exchange's `symbols` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfoResponse {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilterResponse>,
}

/// A trading rule attached to a symbol. Only `LOT_SIZE` is read; the other
/// filter types deserialize with their fields left empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolFilterResponse {
    pub filter_type: String,
    #[serde(default)]
    pub min_qty: Option<Decimal>,
    #[serde(default)]
    pub step_size: Option<Decimal>,
}

/// One entry of the exchange's `rateLimits` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResponse {
    /// `REQUEST_WEIGHT`, `ORDERS` or `RAW_REQUESTS`.
    pub rate_limit_type: String,
    /// `SECOND`, `MINUTE` or `DAY`.
    pub interval: String,
    pub interval_num: u32,
    pub limit: u32,
}

/// The response from `GET /api/v3/account`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    /// Commission rates in basis points (10 = 0.1%).
    pub maker_commission: i64,
    pub taker_commission: i64,
    pub buyer_commission: i64,
    /// Exact commission rates, returned by newer API versions.
    #[serde(default)]
    pub commission_rates: Option<CommissionRatesResponse>,
    pub balances: Vec<BalanceResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionRatesResponse {
    pub maker: Decimal,
    pub taker: Decimal,
    pub buyer: Decimal,
}

/// A single asset's balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// `GET /api/v3/ticker/price`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPriceResponse {
    pub symbol: String,
    pub price: Decimal,
}

/// One partial execution inside an order response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFillResponse {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
}

/// The response from `POST /api/v3/order` (FULL) and `GET /api/v3/order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub status: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub fills: Vec<OrderFillResponse>,
}

impl OrderResponse {
    /// Whether anything was executed. `FILLED` and `PARTIALLY_FILLED` both count.
    pub fn is_filled(&self) -> bool {
        self.executed_qty > Decimal::ZERO
            && matches!(self.status.as_str(), "FILLED" | "PARTIALLY_FILLED")
    }

    /// The volume-weighted execution price, if anything executed.
    pub fn average_price(&self) -> Option<Decimal> {
        if self.executed_qty.is_zero() {
            None
        } else {
            Some(self.cummulative_quote_qty / self.executed_qty)
        }
    }
}

/// Represents an error response from the Binance API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_response_averages_fills() {
        let order: OrderResponse = serde_json::from_str(
            r#"{
                "symbol": "BTCUSDT",
                "orderId": 28,
                "clientOrderId": "6gCrw2kRUAF9CvJDGP16IP",
                "transactTime": 1507725176595,
                "price": "0.00000000",
                "origQty": "0.5",
                "executedQty": "0.5",
                "cummulativeQuoteQty": "10050.0",
                "status": "FILLED",
                "type": "MARKET",
                "side": "SELL",
                "fills": [
                    {"price": "20000", "qty": "0.25", "commission": "5", "commissionAsset": "USDT"},
                    {"price": "20200", "qty": "0.25", "commission": "5.05", "commissionAsset": "USDT"}
                ]
            }"#,
        )
        .unwrap();
        assert!(order.is_filled());
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.average_price(), Some(dec!(20100)));
        assert_eq!(order.fills.len(), 2);
    }

    #[test]
    fn exchange_info_reads_lot_size_filter() {
        let info: ExchangeInfoResponse = serde_json::from_str(
            r#"{
                "timezone": "UTC",
                "rateLimits": [],
                "symbols": [{
                    "symbol": "BTCUSDT",
                    "status": "TRADING",
                    "filters": [
                        {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "1000000", "tickSize": "0.01"},
                        {"filterType": "LOT_SIZE", "minQty": "0.00001000", "maxQty": "9000", "stepSize": "0.00001000"}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let filters = &info.symbols[0].filters;
        assert_eq!(filters[0].step_size, None);
        assert_eq!(filters[1].filter_type, "LOT_SIZE");
        assert_eq!(filters[1].step_size, Some(dec!(0.00001)));
        assert_eq!(filters[1].min_qty, Some(dec!(0.00001)));
    }

    #[test]
    fn account_response_reads_bps_commissions() {
        let account: AccountResponse = serde_json::from_str(
            r#"{
                "makerCommission": 15,
                "takerCommission": 15,
                "buyerCommission": 0,
                "sellerCommission": 0,
                "balances": [{"asset": "USDT", "free": "1000.5", "locked": "0"}]
            }"#,
        )
        .unwrap();
        assert_eq!(account.taker_commission, 15);
        assert!(account.commission_rates.is_none());
        assert_eq!(account.balances[0].free, dec!(1000.5));
    }
}
