#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use configuration::TradingConfig;
use std::sync::Arc;

pub const CONFIG: &str = "\
MACD change indicator:0.1
RSI positive side minimum:15
RSI positive side maximum:30
RSI negative side minimum:70
RSI negative side maximum:80
Simulation mode starting value:1000
Currencies to track:BTCUSDT, ETHUSDT
Percentage of money per trade:0.1
Trailing SL:0.05
Take profit:0.1
Confluence:3
Close confluence:2
";

pub fn config() -> Arc<TradingConfig> {
    Arc::new(CONFIG.parse().expect("test config parses"))
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}
