use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    // Exchanges spell sides in upper case.
    #[serde(alias = "BUY")]
    Buy,
    #[serde(alias = "SELL")]
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// A coarse label for a confluence score, kept alongside the score in each
/// reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl Signal {
    /// Classifies an aggregated confluence score.
    pub fn from_confluence(confluence: i32) -> Self {
        match confluence {
            c if c >= 2 => Signal::StrongBuy,
            1 => Signal::Buy,
            0 => Signal::Neutral,
            -1 => Signal::Sell,
            _ => Signal::StrongSell,
        }
    }
}

/// Why a trade left the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    TrailingStop,
    ConfluenceClose,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::TakeProfit => "take-profit",
            CloseReason::TrailingStop => "trailing-stop",
            CloseReason::ConfluenceClose => "confluence-close",
            CloseReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// The three interchangeable ways the bot can realise fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeKind {
    Live,
    Simulation,
    Backtesting,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModeKind::Live => "live",
            ModeKind::Simulation => "simulation",
            ModeKind::Backtesting => "backtesting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confluence_classification_saturates() {
        assert_eq!(Signal::from_confluence(5), Signal::StrongBuy);
        assert_eq!(Signal::from_confluence(1), Signal::Buy);
        assert_eq!(Signal::from_confluence(0), Signal::Neutral);
        assert_eq!(Signal::from_confluence(-1), Signal::Sell);
        assert_eq!(Signal::from_confluence(-4), Signal::StrongSell);
    }
}
