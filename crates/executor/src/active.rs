use crate::error::ExecutorError;
use crate::trade::Trade;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Open trades as a copy-on-write list, plus the append-only history.
///
/// Readers clone the `Arc` and iterate without holding any lock. Writers
/// build a new list under the write lock and swap it in. A trade leaves the
/// active list and enters history inside one write critical section, so no
/// reader ever sees it in both or in neither.
#[derive(Debug, Default)]
pub struct ActiveTrades {
    active: RwLock<Arc<Vec<Trade>>>,
    history: Mutex<Vec<Trade>>,
}

impl ActiveTrades {
    pub fn snapshot(&self) -> Arc<Vec<Trade>> {
        self.active.read().clone()
    }

    pub fn find(&self, symbol: &str) -> Option<Trade> {
        self.active
            .read()
            .iter()
            .find(|t| t.symbol == symbol)
            .cloned()
    }

    /// Adds an open trade. One trade per currency.
    pub fn insert(&self, trade: Trade) -> Result<(), ExecutorError> {
        let mut active = self.active.write();
        if active.iter().any(|t| t.symbol == trade.symbol) {
            return Err(ExecutorError::AlreadyActive(trade.symbol));
        }
        let mut next = Vec::with_capacity(active.len() + 1);
        next.extend(active.iter().cloned());
        next.push(trade);
        *active = Arc::new(next);
        Ok(())
    }

    /// Swaps in a newer version of an active trade.
    pub fn replace(&self, trade: Trade) -> Result<(), ExecutorError> {
        let mut active = self.active.write();
        let index = active
            .iter()
            .position(|t| t.id == trade.id)
            .ok_or(ExecutorError::NotActive(trade.id))?;
        let mut next = active.as_ref().clone();
        next[index] = trade;
        *active = Arc::new(next);
        Ok(())
    }

    /// Moves a closed trade from the active list into history.
    pub fn retire(&self, trade: Trade) -> Result<(), ExecutorError> {
        if trade.is_open() {
            return Err(ExecutorError::StillOpen(trade.id));
        }
        let mut active = self.active.write();
        let index = active
            .iter()
            .position(|t| t.id == trade.id)
            .ok_or(ExecutorError::NotActive(trade.id))?;
        let mut next = active.as_ref().clone();
        next.remove(index);
        self.history.lock().push(trade);
        *active = Arc::new(next);
        Ok(())
    }

    pub fn history(&self) -> Vec<Trade> {
        self.history.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::TradeId;
    use chrono::Utc;
    use core_types::CloseReason;
    use rust_decimal_macros::dec;

    fn trade(id: u64, symbol: &str) -> Trade {
        Trade::open(
            TradeId(id),
            symbol,
            dec!(100),
            dec!(1),
            dec!(100),
            dec!(0.05),
            dec!(0.1),
            3,
            Utc::now(),
        )
    }

    #[test]
    fn one_trade_per_currency() {
        let trades = ActiveTrades::default();
        trades.insert(trade(1, "BTCUSDT")).unwrap();
        trades.insert(trade(2, "ETHUSDT")).unwrap();
        assert_eq!(
            trades.insert(trade(3, "BTCUSDT")),
            Err(ExecutorError::AlreadyActive("BTCUSDT".into()))
        );
        assert_eq!(trades.snapshot().len(), 2);
    }

    #[test]
    fn snapshots_are_unaffected_by_later_writes() {
        let trades = ActiveTrades::default();
        trades.insert(trade(1, "BTCUSDT")).unwrap();
        let before = trades.snapshot();

        let mut moved = trade(1, "BTCUSDT");
        moved.observe(dec!(150), 1);
        trades.replace(moved).unwrap();

        assert_eq!(before[0].trailing_stop, dec!(95));
        assert_eq!(trades.find("BTCUSDT").unwrap().trailing_stop, dec!(145));
    }

    #[test]
    fn retiring_twice_fails_and_history_holds_it_once() {
        let trades = ActiveTrades::default();
        let mut t = trade(1, "BTCUSDT");
        trades.insert(t.clone()).unwrap();
        t.close(CloseReason::Manual, dec!(100), dec!(100), dec!(0), Utc::now())
            .unwrap();

        trades.retire(t.clone()).unwrap();
        assert_eq!(trades.retire(t), Err(ExecutorError::NotActive(TradeId(1))));
        assert!(trades.snapshot().is_empty());
        assert_eq!(trades.history().len(), 1);
    }

    #[test]
    fn open_trade_cannot_be_retired() {
        let trades = ActiveTrades::default();
        let t = trade(1, "BTCUSDT");
        trades.insert(t.clone()).unwrap();

        assert_eq!(trades.retire(t), Err(ExecutorError::StillOpen(TradeId(1))));
        assert_eq!(trades.snapshot().len(), 1);
        assert!(trades.history().is_empty());
    }
}
