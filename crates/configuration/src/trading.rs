use crate::error::ConfigError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const MACD_CHANGE: &str = "MACD change indicator";
pub const RSI_POSITIVE_MIN: &str = "RSI positive side minimum";
pub const RSI_POSITIVE_MAX: &str = "RSI positive side maximum";
pub const RSI_NEGATIVE_MIN: &str = "RSI negative side minimum";
pub const RSI_NEGATIVE_MAX: &str = "RSI negative side maximum";
pub const STARTING_VALUE: &str = "Simulation mode starting value";
pub const CURRENCIES: &str = "Currencies to track";
pub const MONEY_PER_TRADE: &str = "Percentage of money per trade";
pub const TRAILING_SL: &str = "Trailing SL";
pub const TAKE_PROFIT: &str = "Take profit";
pub const CONFLUENCE: &str = "Confluence";
pub const CLOSE_CONFLUENCE: &str = "Close confluence";
pub const USE_CONFLUENCE_TO_CLOSE: &str = "Use confluence to close";

/// Keys that must all be present for a configuration to be accepted.
pub const REQUIRED_KEYS: [&str; 12] = [
    MACD_CHANGE,
    RSI_POSITIVE_MIN,
    RSI_POSITIVE_MAX,
    RSI_NEGATIVE_MIN,
    RSI_NEGATIVE_MAX,
    STARTING_VALUE,
    CURRENCIES,
    MONEY_PER_TRADE,
    TRAILING_SL,
    TAKE_PROFIT,
    CONFLUENCE,
    CLOSE_CONFLUENCE,
];

const OPTIONAL_KEYS: [&str; 1] = [USE_CONFLUENCE_TO_CLOSE];

/// The validated, immutable trading parameters of one bot session.
///
/// Built once at startup and shared by `Arc` into every component that needs
/// it. There is no global copy of any of these values.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingConfig {
    /// Minimum MACD histogram change for the MACD vote to fire.
    pub macd_change: Decimal,
    /// RSI at or below this votes +2.
    pub rsi_positive_min: u32,
    /// RSI at or below this votes +1.
    pub rsi_positive_max: u32,
    /// RSI at or above this votes -1.
    pub rsi_negative_min: u32,
    /// RSI at or above this votes -2.
    pub rsi_negative_max: u32,
    /// Fiat the simulation and backtest accounts start with.
    pub starting_value: Decimal,
    pub currencies: Vec<String>,
    /// Fraction of the current fiat balance put into one trade.
    pub money_per_trade: Decimal,
    /// Trailing stop distance as a fraction of the entry price.
    pub trailing_sl: Decimal,
    /// Take-profit distance as a fraction of the entry price.
    pub take_profit: Decimal,
    /// Confluence score needed to open a trade.
    pub confluence: i32,
    /// Adverse confluence score that closes a trade when enabled.
    pub close_confluence: i32,
    pub close_using_confluence: bool,
}

impl TradingConfig {
    /// Reads and validates a trading config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: TradingConfig = contents.parse()?;
        tracing::info!(
            path = %path.display(),
            currencies = config.currencies.len(),
            "Loaded trading configuration"
        );
        Ok(config)
    }

    pub fn tracks(&self, symbol: &str) -> bool {
        self.currencies.iter().any(|c| c == symbol)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.currencies.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one currency must be tracked".to_string(),
            ));
        }
        for (i, symbol) in self.currencies.iter().enumerate() {
            if self.currencies[..i].contains(symbol) {
                return Err(ConfigError::ValidationError(format!(
                    "currency {symbol} is listed twice"
                )));
            }
        }
        if self.rsi_negative_max > 100 {
            return Err(ConfigError::ValidationError(
                "RSI thresholds must lie within 0..=100".to_string(),
            ));
        }
        if !(self.rsi_positive_min <= self.rsi_positive_max
            && self.rsi_positive_max < self.rsi_negative_min
            && self.rsi_negative_min <= self.rsi_negative_max)
        {
            return Err(ConfigError::ValidationError(
                "RSI thresholds must satisfy positive min <= positive max < negative min <= negative max"
                    .to_string(),
            ));
        }
        if self.macd_change.is_sign_negative() {
            return Err(ConfigError::ValidationError(
                "MACD change indicator cannot be negative".to_string(),
            ));
        }
        if self.starting_value.is_sign_negative() {
            return Err(ConfigError::ValidationError(
                "starting value cannot be negative".to_string(),
            ));
        }
        if self.money_per_trade <= Decimal::ZERO || self.money_per_trade > Decimal::ONE {
            return Err(ConfigError::ValidationError(
                "percentage of money per trade must be in (0, 1]".to_string(),
            ));
        }
        if self.trailing_sl <= Decimal::ZERO || self.trailing_sl >= Decimal::ONE {
            return Err(ConfigError::ValidationError(
                "trailing SL must be in (0, 1)".to_string(),
            ));
        }
        if self.take_profit <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "take profit must be greater than 0".to_string(),
            ));
        }
        if self.confluence <= 0 || self.close_confluence <= 0 {
            return Err(ConfigError::ValidationError(
                "confluence thresholds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn canonical_key(key: &str) -> Option<&'static str> {
    REQUIRED_KEYS
        .iter()
        .chain(OPTIONAL_KEYS.iter())
        .find(|k| **k == key)
        .copied()
}

fn parse_value<T: FromStr>(entries: &BTreeMap<&'static str, String>, key: &'static str) -> Result<T, ConfigError> {
    // Presence was checked before any value is parsed.
    let raw = entries.get(key).map(String::as_str).unwrap_or_default();
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

impl FromStr for TradingConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries: BTreeMap<&'static str, String> = BTreeMap::new();

        for (index, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| ConfigError::Malformed {
                line: index + 1,
                content: line.to_string(),
            })?;

            let Some(key) = canonical_key(key.trim()) else {
                tracing::warn!(line = index + 1, key = key.trim(), "Ignoring unrecognised config key");
                continue;
            };
            if entries.insert(key, value.trim().to_string()).is_some() {
                return Err(ConfigError::Duplicate(key));
            }
        }

        let missing: Vec<&'static str> = REQUIRED_KEYS
            .iter()
            .filter(|key| !entries.contains_key(*key))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Incomplete { missing });
        }

        let currencies = entries
            .get(CURRENCIES)
            .map(String::as_str)
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        let close_using_confluence = match entries.get(USE_CONFLUENCE_TO_CLOSE) {
            Some(raw) => parse_bool(USE_CONFLUENCE_TO_CLOSE, raw)?,
            None => false,
        };

        let config = TradingConfig {
            macd_change: parse_value(&entries, MACD_CHANGE)?,
            rsi_positive_min: parse_value(&entries, RSI_POSITIVE_MIN)?,
            rsi_positive_max: parse_value(&entries, RSI_POSITIVE_MAX)?,
            rsi_negative_min: parse_value(&entries, RSI_NEGATIVE_MIN)?,
            rsi_negative_max: parse_value(&entries, RSI_NEGATIVE_MAX)?,
            starting_value: parse_value(&entries, STARTING_VALUE)?,
            currencies,
            money_per_trade: parse_value(&entries, MONEY_PER_TRADE)?,
            trailing_sl: parse_value(&entries, TRAILING_SL)?,
            take_profit: parse_value(&entries, TAKE_PROFIT)?,
            confluence: parse_value(&entries, CONFLUENCE)?,
            close_confluence: parse_value(&entries, CLOSE_CONFLUENCE)?,
            close_using_confluence,
        };
        config.validate()?;
        Ok(config)
    }
}

impl fmt::Display for TradingConfig {
    /// Writes the config in the same `key:value` form it is read from.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{MACD_CHANGE}:{}", self.macd_change)?;
        writeln!(f, "{RSI_POSITIVE_MIN}:{}", self.rsi_positive_min)?;
        writeln!(f, "{RSI_POSITIVE_MAX}:{}", self.rsi_positive_max)?;
        writeln!(f, "{RSI_NEGATIVE_MIN}:{}", self.rsi_negative_min)?;
        writeln!(f, "{RSI_NEGATIVE_MAX}:{}", self.rsi_negative_max)?;
        writeln!(f, "{STARTING_VALUE}:{}", self.starting_value)?;
        writeln!(f, "{CURRENCIES}:{}", self.currencies.join(", "))?;
        writeln!(f, "{MONEY_PER_TRADE}:{}", self.money_per_trade)?;
        writeln!(f, "{TRAILING_SL}:{}", self.trailing_sl)?;
        writeln!(f, "{TAKE_PROFIT}:{}", self.take_profit)?;
        writeln!(f, "{CONFLUENCE}:{}", self.confluence)?;
        writeln!(f, "{CLOSE_CONFLUENCE}:{}", self.close_confluence)?;
        writeln!(f, "{USE_CONFLUENCE_TO_CLOSE}:{}", self.close_using_confluence)
    }
}
