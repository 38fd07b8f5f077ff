use crate::events::*;
use crate::models::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Feed Errors
// ---------------------------------------------------------------------------

/// Errors raised by the trading account or market watcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedError {
    #[error("Historical fetch failed: {0}")]
    Fetch(String),
    #[error("Subscription failed: {0}")]
    Subscribe(String),
    #[error("Unwatch failed: {0}")]
    Unwatch(String),
    #[error("Feed disconnected")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// Trading Account
// ---------------------------------------------------------------------------

/// Point-in-time quotes and historical periods for symbols.
#[async_trait]
pub trait TradingAccount: Send + Sync {
    /// Current bid price of a symbol.
    async fn symbol_bid(&self, symbol: &str) -> Result<Decimal, FeedError>;

    /// Current ask price of a symbol.
    async fn symbol_ask(&self, symbol: &str) -> Result<Decimal, FeedError>;

    /// Closed periods of a symbol, ordered oldest to newest.
    async fn symbol_periods(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Period>, FeedError>;

    /// Create a new, unwatched market watcher bound to this account.
    fn market_watcher(&self) -> Box<dyn MarketWatcher>;
}

// ---------------------------------------------------------------------------
// Market Watcher
// ---------------------------------------------------------------------------

/// What a watch call subscribes to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub watch_ticks: bool,
    pub watch_periods: bool,
    #[serde(default)]
    pub timeframes: Vec<Timeframe>,
}

impl WatchOptions {
    pub fn ticks() -> Self {
        Self {
            watch_ticks: true,
            watch_periods: false,
            timeframes: Vec::new(),
        }
    }

    pub fn periods(timeframe: Timeframe) -> Self {
        Self {
            watch_ticks: false,
            watch_periods: true,
            timeframes: vec![timeframe],
        }
    }
}

/// A live subscription to tick and period-close notifications.
///
/// Events for a symbol are only delivered after `watch` resolves, in arrival order.
#[async_trait]
pub trait MarketWatcher: Send + Sync {
    /// Start watching a symbol. Returns the receiving end of the event stream.
    async fn watch(
        &mut self,
        symbol: &str,
        options: WatchOptions,
    ) -> Result<mpsc::Receiver<MarketEvent>, FeedError>;

    /// Stop watching a symbol.
    async fn unwatch(&mut self, symbol: &str) -> Result<(), FeedError>;

    /// Symbols currently watched.
    fn watched_symbols(&self) -> Vec<String>;
}
