//! In-memory account and watcher for tests.

use crate::session::UpdateCallback;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tickwise_core::{
    FeedError, MarketEvent, MarketWatcher, Period, Tick, Timeframe, TradingAccount, WatchOptions,
};
use tokio::sync::mpsc;

fn minute(index: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap() + Duration::minutes(index)
}

/// An M1 period starting `index` minutes after the fixture origin.
pub(crate) fn period(symbol: &str, index: i64, close: Decimal) -> Period {
    Period {
        symbol: symbol.to_string(),
        timeframe: Timeframe::Minute(1),
        start: minute(index),
        end: minute(index + 1),
        open: close,
        high: close + Decimal::ONE,
        low: close - Decimal::ONE,
        close,
        volume: dec!(100),
    }
}

pub(crate) fn tick(symbol: &str, index: i64, bid: Decimal, ask: Decimal) -> Tick {
    Tick {
        symbol: symbol.to_string(),
        timestamp: minute(index),
        bid,
        ask,
    }
}

#[derive(Default)]
struct FeedState {
    periods: Vec<Period>,
    bid: Decimal,
    ask: Decimal,
    /// 1-based fetch call that fails.
    fail_fetch_on_call: Option<usize>,
    fail_watch: bool,
    /// Appended to the history when a watch succeeds, simulating a close in the gap.
    append_on_watch: Option<Period>,
    fetch_calls: usize,
    watch_calls: usize,
    unwatch_calls: usize,
    senders: Vec<mpsc::Sender<MarketEvent>>,
}

#[derive(Clone)]
pub(crate) struct MockAccount {
    symbol: String,
    state: Arc<Mutex<FeedState>>,
}

impl MockAccount {
    /// Account holding `bars` M1 periods with closes `1..=bars`.
    pub(crate) fn new(symbol: &str, bars: i64) -> Self {
        let periods = (0..bars)
            .map(|i| period(symbol, i, Decimal::from(i + 1)))
            .collect();
        Self {
            symbol: symbol.to_string(),
            state: Arc::new(Mutex::new(FeedState {
                periods,
                bid: dec!(1.1000),
                ask: dec!(1.1002),
                ..Default::default()
            })),
        }
    }

    pub(crate) fn fail_fetch_on_call(&self, call: usize) {
        self.state.lock().fail_fetch_on_call = Some(call);
    }

    pub(crate) fn fail_watch(&self) {
        self.state.lock().fail_watch = true;
    }

    pub(crate) fn append_on_watch(&self, period: Period) {
        self.state.lock().append_on_watch = Some(period);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }

    pub(crate) fn watch_calls(&self) -> usize {
        self.state.lock().watch_calls
    }

    pub(crate) fn unwatch_calls(&self) -> usize {
        self.state.lock().unwatch_calls
    }

    /// Push an event to every subscription; returns how many receivers took it.
    pub(crate) async fn emit(&self, event: MarketEvent) -> usize {
        let senders = self.state.lock().senders.clone();
        let mut delivered = 0;
        for sender in senders {
            if sender.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl TradingAccount for MockAccount {
    async fn symbol_bid(&self, _symbol: &str) -> Result<Decimal, FeedError> {
        Ok(self.state.lock().bid)
    }

    async fn symbol_ask(&self, _symbol: &str) -> Result<Decimal, FeedError> {
        Ok(self.state.lock().ask)
    }

    async fn symbol_periods(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Period>, FeedError> {
        let mut state = self.state.lock();
        state.fetch_calls += 1;
        if state.fail_fetch_on_call == Some(state.fetch_calls) {
            return Err(FeedError::Fetch(format!("{symbol} {timeframe} unavailable")));
        }
        Ok(state
            .periods
            .iter()
            .filter(|p| p.symbol == symbol && p.timeframe == timeframe)
            .cloned()
            .collect())
    }

    fn market_watcher(&self) -> Box<dyn MarketWatcher> {
        Box::new(MockWatcher {
            state: Arc::clone(&self.state),
            watched: Vec::new(),
        })
    }
}

struct MockWatcher {
    state: Arc<Mutex<FeedState>>,
    watched: Vec<String>,
}

#[async_trait]
impl MarketWatcher for MockWatcher {
    async fn watch(
        &mut self,
        symbol: &str,
        _options: WatchOptions,
    ) -> Result<mpsc::Receiver<MarketEvent>, FeedError> {
        let mut state = self.state.lock();
        state.watch_calls += 1;
        if state.fail_watch {
            return Err(FeedError::Subscribe(format!("{symbol} rejected")));
        }
        if let Some(period) = state.append_on_watch.take() {
            state.periods.push(period);
        }
        let (tx, rx) = mpsc::channel(64);
        state.senders.push(tx);
        self.watched.push(symbol.to_string());
        Ok(rx)
    }

    async fn unwatch(&mut self, symbol: &str) -> Result<(), FeedError> {
        self.state.lock().unwatch_calls += 1;
        self.watched.retain(|s| s != symbol);
        Ok(())
    }

    fn watched_symbols(&self) -> Vec<String> {
        self.watched.clone()
    }
}

impl std::fmt::Debug for MockAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAccount").field("symbol", &self.symbol).finish()
    }
}

/// Callback that forwards every update to a channel.
pub(crate) fn notifier() -> (UpdateCallback, mpsc::UnboundedReceiver<MarketEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: UpdateCallback = Arc::new(move |event: &MarketEvent| {
        let _ = tx.send(event.clone());
    });
    (callback, rx)
}

pub(crate) async fn next_update(rx: &mut mpsc::UnboundedReceiver<MarketEvent>) -> MarketEvent {
    tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("update within timeout")
        .expect("callback channel open")
}
