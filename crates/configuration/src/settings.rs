use serde::Deserialize;

/// Runtime settings that are not trading parameters: where to find the
/// trading config, how to reach the exchange, and how the engine paces itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path of the `key:value` trading config file.
    pub trading_config_path: String,
    /// The quote asset all trading is denominated in.
    pub fiat: String,
    pub username: String,
    pub exchange: ExchangeSettings,
    pub engine: EngineSettings,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trading_config_path: "config.txt".to_string(),
            fiat: "USDT".to_string(),
            username: "meridian".to_string(),
            exchange: ExchangeSettings::default(),
            engine: EngineSettings::default(),
            log: LogSettings::default(),
        }
    }
}

/// Connection and resilience parameters for the exchange gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Upper bound on a single request before it is treated as failed.
    pub request_timeout_ms: u64,
    /// Attempts per call, including the first, for transient failures.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub recv_window_ms: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            api_key: None,
            api_secret: None,
            request_timeout_ms: 10_000,
            max_attempts: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            recv_window_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// How often the price feed polls every tracked currency.
    pub poll_interval_secs: u64,
    /// How often the monitor logs account valuation.
    pub monitor_interval_secs: u64,
    /// Buffered ticks per currency; further ticks for a lagging currency are dropped.
    pub channel_capacity: usize,
    /// Close every active trade manually when the engine shuts down.
    pub close_on_shutdown: bool,
    /// How long live trading keeps a currency closed to new entries after
    /// its retries run out.
    pub pause_cooldown_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            monitor_interval_secs: 30,
            channel_capacity: 256,
            close_on_shutdown: false,
            pause_cooldown_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "meridian=info,engine=info,executor=info,api_client=info,backtester=info".to_string(),
            directory: None,
        }
    }
}
