//! # Meridian Core Types
//!
//! Plain data shared by every other crate: market ticks, signal readings,
//! order requests and fills. Nothing in here performs I/O or holds locks.

pub mod enums;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{CloseReason, ModeKind, OrderSide, OrderType, Signal};
pub use structs::{Commissions, Currency, Fill, OrderRequest, SignalReading, Tick};
