//! # Meridian Executor Crate
//!
//! Account state and trade execution. This crate owns the wallet, the
//! lifecycle of every trade, and the dispatch rules that turn a signal
//! reading into an opened or closed position.
//!
//! ## Architectural Principles
//!
//! - **Shared rules, pluggable fills:** `TradeDesk` holds the entry, exit and
//!   money-movement rules once. A `FillVenue` decides where fills come from,
//!   so Live, Simulation and Backtesting differ only in their venue.
//! - **No locks across awaits:** wallet and trade-set locks are synchronous
//!   and short. Funds are reserved before an order leaves and settled after
//!   it returns, so exchange latency on one currency never blocks another.
//!
//! ## Public API
//!
//! - `ExecutionMode`: the trait the engine and backtester drive.
//! - `LiveMode`, `SimulationMode`, `BacktestMode`: its implementations.
//! - `Account`, `Wallet`, `MarketBoard`, `Trade`: the state they operate on.
//! - `ExecutorError`: the error type returned by this crate.

pub mod account;
pub mod active;
pub mod desk;
pub mod error;
pub mod market;
pub mod modes;
pub mod trade;
pub mod wallet;

pub use account::Account;
pub use desk::{FillVenue, SyntheticVenue, TradeDesk, TradeEvent};
pub use error::ExecutorError;
pub use market::MarketBoard;
pub use modes::{BacktestMode, ExecutionMode, GatewayVenue, LiveMode, SimulationMode};
pub use trade::{Trade, TradeId, TradeState};
pub use wallet::{Wallet, WalletSnapshot};
