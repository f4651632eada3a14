use crate::SignalProvider;
use crate::error::SignalError;
use core_types::{SignalReading, Tick};
use std::collections::VecDeque;

/// Replays a fixed sequence of confluence scores, one per tick.
///
/// Once the script runs out every further reading is neutral. Useful for
/// backtests over precomputed signals and for driving the engine in tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSignals {
    script: VecDeque<i32>,
}

impl ScriptedSignals {
    pub fn new(confluences: impl IntoIterator<Item = i32>) -> Self {
        Self {
            script: confluences.into_iter().collect(),
        }
    }
}

impl SignalProvider for ScriptedSignals {
    fn next_reading(&mut self, _tick: &Tick) -> Result<SignalReading, SignalError> {
        Ok(self
            .script
            .pop_front()
            .map(SignalReading::new)
            .unwrap_or_else(SignalReading::neutral))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::Signal;
    use rust_decimal_macros::dec;

    #[test]
    fn replays_then_goes_neutral() {
        let tick = Tick {
            symbol: "ETHUSDT".to_string(),
            price: dec!(10),
            timestamp: Utc::now(),
        };
        let mut provider = ScriptedSignals::new([3, -2]);
        assert_eq!(provider.next_reading(&tick).unwrap().signal, Signal::StrongBuy);
        assert_eq!(provider.next_reading(&tick).unwrap().confluence, -2);
        assert_eq!(provider.next_reading(&tick).unwrap(), SignalReading::neutral());
    }
}
