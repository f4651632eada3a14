use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Could not read tick data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tick data is not a valid JSON tick array: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Two ticks for {symbol} share the timestamp {timestamp}")]
    DataOrder {
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    #[error("Signal provider error: {0}")]
    Signal(#[from] signals::SignalError),

    #[error("Execution simulation error: {0}")]
    Executor(#[from] executor::ExecutorError),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),

    #[error("The tick data holds no ticks for any tracked currency.")]
    DataUnavailable,
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}
