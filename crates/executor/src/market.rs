use chrono::{DateTime, Utc};
use core_types::Currency;
use dashmap::DashMap;
use rust_decimal::Decimal;

/// Last known price and confluence for every tracked currency.
///
/// Each entry is written by its own currency's evaluation unit; valuation
/// code reads across all of them.
#[derive(Debug, Default)]
pub struct MarketBoard {
    currencies: DashMap<String, Currency>,
}

impl MarketBoard {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let currencies = DashMap::new();
        for symbol in symbols {
            let symbol = symbol.into();
            currencies.insert(symbol.clone(), Currency::new(symbol));
        }
        Self { currencies }
    }

    pub fn update(&self, symbol: &str, price: Decimal, confluence: i32, at: DateTime<Utc>) {
        let mut entry = self
            .currencies
            .entry(symbol.to_string())
            .or_insert_with(|| Currency::new(symbol));
        entry.price = Some(price);
        entry.confluence = confluence;
        entry.updated_at = Some(at);
    }

    /// Records a price without touching the confluence score.
    pub fn set_price(&self, symbol: &str, price: Decimal, at: DateTime<Utc>) {
        let mut entry = self
            .currencies
            .entry(symbol.to_string())
            .or_insert_with(|| Currency::new(symbol));
        entry.price = Some(price);
        entry.updated_at = Some(at);
    }

    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.currencies.get(symbol).and_then(|c| c.price)
    }

    pub fn get(&self, symbol: &str) -> Option<Currency> {
        self.currencies.get(symbol).map(|c| c.value().clone())
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.currencies.iter().map(|c| c.key().clone()).collect();
        symbols.sort();
        symbols
    }
}
