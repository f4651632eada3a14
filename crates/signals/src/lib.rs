//! # Meridian Signal Library
//!
//! Turns a stream of prices for one currency into discrete signal readings
//! and a confluence score. The execution core only ever sees the
//! `SignalProvider` trait; indicator arithmetic stays behind it.
//!
//! ## Public API
//!
//! - `SignalProvider`: the trait every provider implements.
//! - `IndicatorSignals`: MACD + RSI votes classified with the trading config.
//! - `ScriptedSignals`: replays a fixed sequence of confluence scores.
//! - `indicator_factory`: builds one `IndicatorSignals` per currency.

pub mod error;
pub mod factory;
pub mod indicator;
pub mod scripted;

pub use error::SignalError;
pub use factory::{ProviderFactory, indicator_factory, scripted_factory};
pub use indicator::IndicatorSignals;
pub use scripted::ScriptedSignals;

use core_types::{SignalReading, Tick};

/// The boundary between market data and the execution core.
///
/// Providers are stateful (indicators remember previous values), so
/// `next_reading` takes `&mut self`. Each tracked currency gets its own
/// provider, owned by that currency's evaluation task.
pub trait SignalProvider: Send {
    /// Consumes one tick and returns the reading for it.
    fn next_reading(&mut self, tick: &Tick) -> Result<SignalReading, SignalError>;
}
