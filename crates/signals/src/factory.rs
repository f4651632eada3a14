use crate::error::SignalError;
use crate::{IndicatorSignals, ScriptedSignals, SignalProvider};
use configuration::TradingConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the provider for one currency. The engine calls it once per
/// tracked symbol when it spawns that symbol's evaluation task.
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> Result<Box<dyn SignalProvider>, SignalError> + Send + Sync>;

/// A factory producing `IndicatorSignals` configured from `config`.
pub fn indicator_factory(config: Arc<TradingConfig>) -> ProviderFactory {
    Arc::new(move |symbol: &str| {
        let provider = IndicatorSignals::new(symbol, &config)?;
        Ok(Box::new(provider) as Box<dyn SignalProvider>)
    })
}

/// A factory handing each symbol its own scripted sequence.
///
/// Symbols without a script get an empty one and stay neutral.
pub fn scripted_factory(scripts: HashMap<String, Vec<i32>>) -> ProviderFactory {
    let scripts = Arc::new(scripts);
    Arc::new(move |symbol: &str| {
        let script = scripts.get(symbol).cloned().unwrap_or_default();
        Ok(Box::new(ScriptedSignals::new(script)) as Box<dyn SignalProvider>)
    })
}
