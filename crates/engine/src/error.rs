use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Signal provider error: {0}")]
    Signal(#[from] signals::SignalError),

    #[error("Execution error: {0}")]
    Executor(#[from] executor::ExecutorError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] api_client::GatewayError),

    #[error("Live trading halted: {0}")]
    Halted(String),
}
