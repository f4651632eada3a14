use crate::SignalProvider;
use crate::error::SignalError;
use configuration::TradingConfig;
use core_types::{SignalReading, Tick};
use rust_decimal::prelude::*;
use ta::Next;
use ta::indicators::{MovingAverageConvergenceDivergence as Macd, RelativeStrengthIndex as Rsi};

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const RSI_PERIOD: usize = 14;

/// Thresholds copied out of the trading config at construction.
#[derive(Debug, Clone)]
struct Thresholds {
    macd_change: f64,
    rsi_positive_min: f64,
    rsi_positive_max: f64,
    rsi_negative_min: f64,
    rsi_negative_max: f64,
}

/// MACD and RSI votes summed into a confluence score.
///
/// The MACD vote looks at how far the histogram moved since the previous tick;
/// the RSI vote looks at which threshold band the RSI sits in. No vote is cast
/// until the indicator has seen enough prices to be meaningful.
pub struct IndicatorSignals {
    symbol: String,
    thresholds: Thresholds,
    macd: Macd,
    rsi: Rsi,
    prev_histogram: Option<f64>,
    seen: usize,
}

impl IndicatorSignals {
    pub fn new(symbol: impl Into<String>, config: &TradingConfig) -> Result<Self, SignalError> {
        let thresholds = Thresholds {
            macd_change: config.macd_change.to_f64().ok_or_else(|| {
                SignalError::InvalidParameters(format!("MACD change {} is not representable", config.macd_change))
            })?,
            rsi_positive_min: f64::from(config.rsi_positive_min),
            rsi_positive_max: f64::from(config.rsi_positive_max),
            rsi_negative_min: f64::from(config.rsi_negative_min),
            rsi_negative_max: f64::from(config.rsi_negative_max),
        };

        Ok(Self {
            symbol: symbol.into(),
            thresholds,
            macd: Macd::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
                .map_err(|e| SignalError::InvalidParameters(format!("Failed to initialize MACD: {e:?}")))?,
            rsi: Rsi::new(RSI_PERIOD)
                .map_err(|e| SignalError::InvalidParameters(format!("Failed to initialize RSI: {e:?}")))?,
            prev_histogram: None,
            seen: 0,
        })
    }

    fn macd_vote(&self, histogram: f64) -> i32 {
        let Some(prev) = self.prev_histogram else {
            return 0;
        };
        if self.seen < MACD_SLOW + MACD_SIGNAL {
            return 0;
        }
        let change = histogram - prev;
        if change > self.thresholds.macd_change {
            1
        } else if change < -self.thresholds.macd_change {
            -1
        } else {
            0
        }
    }

    fn rsi_vote(&self, rsi: f64) -> i32 {
        if self.seen <= RSI_PERIOD {
            return 0;
        }
        let t = &self.thresholds;
        if rsi <= t.rsi_positive_min {
            2
        } else if rsi <= t.rsi_positive_max {
            1
        } else if rsi >= t.rsi_negative_max {
            -2
        } else if rsi >= t.rsi_negative_min {
            -1
        } else {
            0
        }
    }
}

impl SignalProvider for IndicatorSignals {
    fn next_reading(&mut self, tick: &Tick) -> Result<SignalReading, SignalError> {
        // The `ta` crate works in f64; the precision loss is confined to the votes.
        let price = tick.price.to_f64().ok_or_else(|| {
            SignalError::IndicatorError(format!("price {} for {} is not representable", tick.price, self.symbol))
        })?;

        self.seen += 1;
        let histogram = self.macd.next(price).histogram;
        let rsi = self.rsi.next(price);

        let macd_vote = self.macd_vote(histogram);
        let rsi_vote = self.rsi_vote(rsi);
        self.prev_histogram = Some(histogram);

        let reading = SignalReading::new(macd_vote + rsi_vote);
        tracing::trace!(
            symbol = %self.symbol,
            histogram,
            rsi,
            macd_vote,
            rsi_vote,
            confluence = reading.confluence,
            "Indicator reading"
        );
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn config() -> TradingConfig {
        TradingConfig {
            macd_change: dec!(0),
            rsi_positive_min: 15,
            rsi_positive_max: 30,
            rsi_negative_min: 70,
            rsi_negative_max: 80,
            starting_value: dec!(1000),
            currencies: vec!["BTCUSDT".to_string()],
            money_per_trade: dec!(0.1),
            trailing_sl: dec!(0.05),
            take_profit: dec!(0.1),
            confluence: 2,
            close_confluence: 2,
            close_using_confluence: false,
        }
    }

    fn tick(i: i64, price: Decimal) -> Tick {
        Tick {
            symbol: "BTCUSDT".to_string(),
            price,
            timestamp: Utc.timestamp_opt(1_700_000_000 + i * 60, 0).unwrap(),
        }
    }

    #[test]
    fn warm_up_is_neutral() {
        let mut provider = IndicatorSignals::new("BTCUSDT", &config()).unwrap();
        for i in 0..RSI_PERIOD as i64 {
            let reading = provider.next_reading(&tick(i, dec!(100) - Decimal::from(i))).unwrap();
            assert_eq!(reading.confluence, 0);
        }
    }

    #[test]
    fn steady_decline_is_oversold() {
        let mut provider = IndicatorSignals::new("BTCUSDT", &config()).unwrap();
        let mut last = SignalReading::neutral();
        for i in 0..60 {
            last = provider.next_reading(&tick(i, dec!(1000) - Decimal::from(i * 5))).unwrap();
        }
        // A monotone decline drives RSI to the bottom band.
        assert!(last.confluence >= 1, "confluence was {}", last.confluence);
    }

    #[test]
    fn steady_rally_is_overbought() {
        let mut provider = IndicatorSignals::new("BTCUSDT", &config()).unwrap();
        let mut last = SignalReading::neutral();
        for i in 0..60 {
            last = provider.next_reading(&tick(i, dec!(100) + Decimal::from(i * 5))).unwrap();
        }
        assert!(last.confluence <= -1, "confluence was {}", last.confluence);
    }
}
