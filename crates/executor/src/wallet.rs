use crate::error::ExecutorError;
use crate::market::MarketBoard;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Fiat and per-currency holdings at one instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WalletSnapshot {
    pub fiat: Decimal,
    pub holdings: BTreeMap<String, Decimal>,
}

impl WalletSnapshot {
    /// `fiat + Σ held × price`. Fails if a held currency has no price yet.
    pub fn value(&self, market: &MarketBoard) -> Result<Decimal, ExecutorError> {
        self.holdings
            .iter()
            .try_fold(self.fiat, |total, (currency, amount)| {
                let price = market
                    .price(currency)
                    .ok_or_else(|| ExecutorError::MissingPrice(currency.clone()))?;
                Ok(total + amount * price)
            })
    }
}

/// Currency holdings plus a fiat balance.
///
/// Operations on one key are linearizable through the map's shard lock, and
/// operations on different keys run in parallel. Every mutation also holds
/// the gate shared, so `snapshot` can take it exclusively and observe a
/// state no mutation is halfway through.
#[derive(Debug, Default)]
pub struct Wallet {
    holdings: DashMap<String, Decimal>,
    fiat: Mutex<Decimal>,
    gate: RwLock<()>,
}

fn positive(amount: Decimal) -> Result<Decimal, ExecutorError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(ExecutorError::InvalidAmount(amount))
    }
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to a currency's holding and returns the new amount.
    pub fn credit(&self, currency: &str, amount: Decimal) -> Result<Decimal, ExecutorError> {
        let amount = positive(amount)?;
        let _gate = self.gate.read();
        let mut held = self
            .holdings
            .entry(currency.to_string())
            .or_insert(Decimal::ZERO);
        *held += amount;
        Ok(*held)
    }

    /// Removes from a currency's holding and returns what is left. Entries
    /// that reach zero are dropped.
    pub fn debit(&self, currency: &str, amount: Decimal) -> Result<Decimal, ExecutorError> {
        let amount = positive(amount)?;
        let _gate = self.gate.read();
        let remaining = {
            let Some(mut held) = self.holdings.get_mut(currency) else {
                return Err(ExecutorError::InsufficientBalance {
                    currency: currency.to_string(),
                    requested: amount,
                    available: Decimal::ZERO,
                });
            };
            if *held < amount {
                return Err(ExecutorError::InsufficientBalance {
                    currency: currency.to_string(),
                    requested: amount,
                    available: *held,
                });
            }
            *held -= amount;
            *held
        };
        if remaining.is_zero() {
            self.holdings.remove_if(currency, |_, held| held.is_zero());
        }
        Ok(remaining)
    }

    pub fn credit_fiat(&self, amount: Decimal) -> Result<Decimal, ExecutorError> {
        let amount = positive(amount)?;
        let _gate = self.gate.read();
        let mut fiat = self.fiat.lock();
        *fiat += amount;
        Ok(*fiat)
    }

    pub fn debit_fiat(&self, amount: Decimal) -> Result<Decimal, ExecutorError> {
        let amount = positive(amount)?;
        let _gate = self.gate.read();
        let mut fiat = self.fiat.lock();
        if *fiat < amount {
            return Err(ExecutorError::InsufficientBalance {
                currency: "fiat".to_string(),
                requested: amount,
                available: *fiat,
            });
        }
        *fiat -= amount;
        Ok(*fiat)
    }

    pub fn held(&self, currency: &str) -> Decimal {
        self.holdings
            .get(currency)
            .map(|held| *held)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn fiat(&self) -> Decimal {
        *self.fiat.lock()
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        let _gate = self.gate.write();
        WalletSnapshot {
            fiat: *self.fiat.lock(),
            holdings: self
                .holdings
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }

    pub fn value_of(&self, currency: &str, market: &MarketBoard) -> Result<Decimal, ExecutorError> {
        let held = self.held(currency);
        if held.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let price = market
            .price(currency)
            .ok_or_else(|| ExecutorError::MissingPrice(currency.to_string()))?;
        Ok(held * price)
    }

    pub fn total_value(&self, market: &MarketBoard) -> Result<Decimal, ExecutorError> {
        self.snapshot().value(market)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn debit_never_goes_negative() {
        let wallet = Wallet::new();
        wallet.credit("BTCUSDT", dec!(1.5)).unwrap();
        let err = wallet.debit("BTCUSDT", dec!(2)).unwrap_err();
        assert_eq!(
            err,
            ExecutorError::InsufficientBalance {
                currency: "BTCUSDT".into(),
                requested: dec!(2),
                available: dec!(1.5),
            }
        );
        assert_eq!(wallet.held("BTCUSDT"), dec!(1.5));
        assert!(wallet.debit("ETHUSDT", dec!(1)).is_err());
    }

    #[test]
    fn empty_holdings_are_removed() {
        let wallet = Wallet::new();
        wallet.credit("BTCUSDT", dec!(1)).unwrap();
        assert_eq!(wallet.debit("BTCUSDT", dec!(1)).unwrap(), Decimal::ZERO);
        assert!(wallet.snapshot().holdings.is_empty());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let wallet = Wallet::new();
        assert_eq!(
            wallet.credit("BTCUSDT", Decimal::ZERO),
            Err(ExecutorError::InvalidAmount(Decimal::ZERO))
        );
        assert!(wallet.credit_fiat(dec!(-1)).is_err());
        assert!(wallet.debit_fiat(dec!(1)).is_err());
    }

    #[test]
    fn concurrent_operations_do_not_lose_updates() {
        let wallet = Arc::new(Wallet::new());
        wallet.credit("BTCUSDT", dec!(10)).unwrap();
        wallet.credit_fiat(dec!(1000)).unwrap();

        thread::scope(|s| {
            for _ in 0..8 {
                let wallet = wallet.clone();
                s.spawn(move || {
                    for _ in 0..250 {
                        wallet.credit("BTCUSDT", dec!(0.01)).unwrap();
                        wallet.credit("ETHUSDT", dec!(1)).unwrap();
                        wallet.debit("BTCUSDT", dec!(0.01)).unwrap();
                        wallet.credit_fiat(dec!(1)).unwrap();
                    }
                });
            }
        });

        assert_eq!(wallet.held("BTCUSDT"), dec!(10));
        assert_eq!(wallet.held("ETHUSDT"), dec!(2000));
        assert_eq!(wallet.fiat(), dec!(3000));
    }

    #[test]
    fn competing_debits_never_overdraw() {
        let wallet = Arc::new(Wallet::new());
        wallet.credit("BTCUSDT", dec!(100)).unwrap();

        let succeeded: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let wallet = wallet.clone();
                    s.spawn(move || {
                        (0..50)
                            .filter(|_| wallet.debit("BTCUSDT", dec!(1)).is_ok())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(succeeded, 100);
        assert_eq!(wallet.held("BTCUSDT"), Decimal::ZERO);
    }

    #[test]
    fn snapshots_never_see_a_transfer_twice() {
        const KEYS: [&str; 3] = ["BTCUSDT", "ETHUSDT", "SOLUSDT"];
        const WORKERS: usize = 4;
        let wallet = Arc::new(Wallet::new());
        for key in KEYS {
            wallet.credit(key, dec!(1000)).unwrap();
        }
        wallet.credit_fiat(dec!(1000)).unwrap();

        // Index 3 stands for fiat.
        let debit = |wallet: &Wallet, slot: usize| match slot {
            3 => wallet.debit_fiat(Decimal::ONE),
            n => wallet.debit(KEYS[n], Decimal::ONE),
        };
        let credit = |wallet: &Wallet, slot: usize| match slot {
            3 => wallet.credit_fiat(Decimal::ONE),
            n => wallet.credit(KEYS[n], Decimal::ONE),
        };

        thread::scope(|s| {
            for worker in 0..WORKERS {
                let wallet = wallet.clone();
                s.spawn(move || {
                    for step in 0..500 {
                        let from = (worker + step) % 4;
                        debit(&wallet, from).unwrap();
                        credit(&wallet, (from + 1) % 4).unwrap();
                    }
                });
            }
            for _ in 0..2 {
                let wallet = wallet.clone();
                s.spawn(move || {
                    for _ in 0..200 {
                        let snapshot = wallet.snapshot();
                        let total = snapshot.fiat + snapshot.holdings.values().sum::<Decimal>();
                        // Each worker has at most one unit in flight.
                        assert!(total <= dec!(4000), "snapshot counted {total}");
                        assert!(total >= dec!(3996), "snapshot counted {total}");
                    }
                });
            }
        });

        let settled = wallet.snapshot();
        assert_eq!(
            settled.fiat + settled.holdings.values().sum::<Decimal>(),
            dec!(4000)
        );
    }

    #[test]
    fn total_value_uses_market_prices() {
        let market = MarketBoard::new(["BTCUSDT", "ETHUSDT"]);
        let wallet = Wallet::new();
        wallet.credit_fiat(dec!(500)).unwrap();
        wallet.credit("BTCUSDT", dec!(0.5)).unwrap();
        wallet.credit("ETHUSDT", dec!(2)).unwrap();

        assert_eq!(
            wallet.total_value(&market),
            Err(ExecutorError::MissingPrice("BTCUSDT".into()))
        );

        market.set_price("BTCUSDT", dec!(20000), Utc::now());
        market.set_price("ETHUSDT", dec!(1500), Utc::now());
        assert_eq!(wallet.total_value(&market).unwrap(), dec!(13500));
        assert_eq!(wallet.value_of("ETHUSDT", &market).unwrap(), dec!(3000));
    }
}
