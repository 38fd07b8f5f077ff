//! Live synchronization: seed state from a historical fetch, then keep it
//! current from a market watcher subscription.
//!
//! Every live entity is a [`LiveHandle`]. A [`LiveSession`] owns the
//! [`LiveRegistry`] that guarantees at most one subscription per handle.

pub mod handle;
mod listener;
pub mod registry;
pub mod session;

#[cfg(test)]
mod mock;

pub use handle::{
    HandleId, IndicatorInput, IndicatorState, LiveHandle, LiveIndicator, LivePeriods, LivePrices,
    LiveStatus, LiveSymbol, PricePair, PeriodSeries, SymbolQuote,
};
pub use registry::{ActiveSubscription, LiveRegistry};
pub use session::{LiveSession, UpdateCallback};
