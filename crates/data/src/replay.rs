use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickwise_core::{
    FeedError, MarketEvent, MarketWatcher, Period, Tick, Timeframe, TradingAccount, WatchOptions,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How a loaded series is split into history and live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Periods visible to historical fetches before any are replayed.
    pub history: usize,
    /// Delay before each replayed event, in milliseconds.
    pub interval_ms: u64,
    /// Capacity of each watcher's event channel.
    pub channel_capacity: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            history: 100,
            interval_ms: 0,
            channel_capacity: 256,
        }
    }
}

struct Series {
    symbol: String,
    timeframe: Timeframe,
    periods: Vec<Period>,
    ticks: Vec<Tick>,
    config: ReplayConfig,
    /// Number of periods published so far, history included.
    period_cursor: AtomicUsize,
    /// Number of ticks published so far.
    tick_cursor: AtomicUsize,
}

impl Series {
    fn published_periods(&self) -> &[Period] {
        let n = self.period_cursor.load(Ordering::Acquire).min(self.periods.len());
        &self.periods[..n]
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), FeedError> {
        if symbol == self.symbol {
            Ok(())
        } else {
            Err(FeedError::Fetch(format!("Unknown symbol {symbol}")))
        }
    }

    /// Latest published tick, or the last published close when there are no ticks.
    fn quote(&self) -> Option<(Decimal, Decimal)> {
        let n = self.tick_cursor.load(Ordering::Acquire);
        if let Some(tick) = self.ticks.get(n.saturating_sub(1)) {
            return Some((tick.bid, tick.ask));
        }
        self.published_periods().last().map(|p| (p.close, p.close))
    }
}

/// A trading account that serves a loaded series as history, then replays the
/// rest of it through its market watchers.
///
/// Historical fetches return every period published so far, so a fetch made
/// after a watcher has started replaying already includes the replayed periods.
#[derive(Clone)]
pub struct ReplayAccount {
    series: Arc<Series>,
}

impl ReplayAccount {
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        periods: Vec<Period>,
        ticks: Vec<Tick>,
        config: ReplayConfig,
    ) -> Self {
        let history = config.history.min(periods.len());
        let tick_cutoff = periods.get(history.saturating_sub(1)).map(|p| p.end);
        let published_ticks = match (history, tick_cutoff) {
            (0, _) | (_, None) => 0,
            (_, Some(cutoff)) => ticks.iter().take_while(|t| t.timestamp < cutoff).count(),
        };
        info!(
            symbol,
            %timeframe,
            history,
            replay = periods.len() - history,
            ticks = ticks.len(),
            "Replay account ready"
        );
        Self {
            series: Arc::new(Series {
                symbol: symbol.to_string(),
                timeframe,
                periods,
                ticks,
                config,
                period_cursor: AtomicUsize::new(history),
                tick_cursor: AtomicUsize::new(published_ticks),
            }),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.series.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.series.timeframe
    }

    /// Periods not yet published.
    pub fn remaining(&self) -> usize {
        self.series.periods.len() - self.series.published_periods().len()
    }
}

impl std::fmt::Debug for ReplayAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayAccount")
            .field("symbol", &self.series.symbol)
            .field("timeframe", &self.series.timeframe)
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[async_trait]
impl TradingAccount for ReplayAccount {
    async fn symbol_bid(&self, symbol: &str) -> Result<Decimal, FeedError> {
        self.series.check_symbol(symbol)?;
        self.series
            .quote()
            .map(|(bid, _)| bid)
            .ok_or_else(|| FeedError::Fetch(format!("No quote for {symbol}")))
    }

    async fn symbol_ask(&self, symbol: &str) -> Result<Decimal, FeedError> {
        self.series.check_symbol(symbol)?;
        self.series
            .quote()
            .map(|(_, ask)| ask)
            .ok_or_else(|| FeedError::Fetch(format!("No quote for {symbol}")))
    }

    async fn symbol_periods(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Period>, FeedError> {
        self.series.check_symbol(symbol)?;
        if timeframe != self.series.timeframe {
            return Err(FeedError::Fetch(format!(
                "{symbol} is only available at {}",
                self.series.timeframe
            )));
        }
        Ok(self.series.published_periods().to_vec())
    }

    fn market_watcher(&self) -> Box<dyn MarketWatcher> {
        Box::new(ReplayWatcher {
            series: Arc::clone(&self.series),
            tasks: HashMap::new(),
        })
    }
}

/// Replays unpublished events of its account's series, one task per watched symbol.
pub struct ReplayWatcher {
    series: Arc<Series>,
    tasks: HashMap<String, JoinHandle<()>>,
}

enum Pending {
    Period(usize),
    Tick(usize),
}

impl Pending {
    fn at(&self, series: &Series) -> DateTime<Utc> {
        match self {
            Pending::Period(i) => series.periods[*i].end,
            Pending::Tick(i) => series.ticks[*i].timestamp,
        }
    }
}

async fn replay(series: Arc<Series>, options: WatchOptions, tx: mpsc::Sender<MarketEvent>) {
    let wants_periods = options.watch_periods
        && (options.timeframes.is_empty() || options.timeframes.contains(&series.timeframe));

    let mut pending = Vec::new();
    if wants_periods {
        let from = series.period_cursor.load(Ordering::Acquire);
        pending.extend((from..series.periods.len()).map(Pending::Period));
    }
    if options.watch_ticks {
        let from = series.tick_cursor.load(Ordering::Acquire);
        pending.extend((from..series.ticks.len()).map(Pending::Tick));
    }
    // A period closes at its end; ticks at the same instant come first.
    pending.sort_by_key(|p| (p.at(&series), matches!(p, Pending::Period(_))));

    let interval = Duration::from_millis(series.config.interval_ms);
    let mut sent = 0usize;
    for item in pending {
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        let event = match item {
            Pending::Period(i) => {
                series.period_cursor.fetch_max(i + 1, Ordering::AcqRel);
                MarketEvent::PeriodClose(series.periods[i].clone())
            }
            Pending::Tick(i) => {
                series.tick_cursor.fetch_max(i + 1, Ordering::AcqRel);
                MarketEvent::Tick(series.ticks[i].clone())
            }
        };
        if tx.send(event).await.is_err() {
            debug!(symbol = %series.symbol, sent, "Replay receiver dropped");
            return;
        }
        sent += 1;
    }
    info!(symbol = %series.symbol, sent, "Replay finished");
}

#[async_trait]
impl MarketWatcher for ReplayWatcher {
    async fn watch(
        &mut self,
        symbol: &str,
        options: WatchOptions,
    ) -> Result<mpsc::Receiver<MarketEvent>, FeedError> {
        if symbol != self.series.symbol {
            return Err(FeedError::Subscribe(format!("Unknown symbol {symbol}")));
        }
        if self.tasks.contains_key(symbol) {
            return Err(FeedError::Subscribe(format!("{symbol} is already watched")));
        }
        let (tx, rx) = mpsc::channel(self.series.config.channel_capacity.max(1));
        let task = tokio::spawn(replay(Arc::clone(&self.series), options, tx));
        self.tasks.insert(symbol.to_string(), task);
        debug!(symbol, "Replay watch started");
        Ok(rx)
    }

    async fn unwatch(&mut self, symbol: &str) -> Result<(), FeedError> {
        match self.tasks.remove(symbol) {
            Some(task) => {
                task.abort();
                debug!(symbol, "Replay watch stopped");
                Ok(())
            }
            None => Err(FeedError::Unwatch(format!("{symbol} is not watched"))),
        }
    }

    fn watched_symbols(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }
}

impl Drop for ReplayWatcher {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn minute(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap() + chrono::Duration::minutes(i)
    }

    fn series(n: i64) -> Vec<Period> {
        (0..n)
            .map(|i| {
                let close = Decimal::from(i + 1);
                Period {
                    symbol: "EURUSD".into(),
                    timeframe: Timeframe::Minute(1),
                    start: minute(i),
                    end: minute(i + 1),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: Decimal::ZERO,
                }
            })
            .collect()
    }

    fn ticks() -> Vec<Tick> {
        [(0, dec!(1.0)), (2, dec!(3.0)), (4, dec!(5.0))]
            .into_iter()
            .map(|(m, bid)| Tick {
                symbol: "EURUSD".into(),
                timestamp: minute(m) + chrono::Duration::seconds(30),
                bid,
                ask: bid + dec!(0.1),
            })
            .collect()
    }

    fn account(history: usize) -> ReplayAccount {
        let config = ReplayConfig {
            history,
            ..Default::default()
        };
        ReplayAccount::new("EURUSD", Timeframe::Minute(1), series(5), ticks(), config)
    }

    #[tokio::test]
    async fn test_history_is_the_configured_prefix() {
        let account = account(3);
        let history = account
            .symbol_periods("EURUSD", Timeframe::Minute(1))
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(account.remaining(), 2);
        // ticks before the end of the last history period are published
        assert_eq!(account.symbol_bid("EURUSD").await.unwrap(), dec!(3.0));
        assert_eq!(account.symbol_ask("EURUSD").await.unwrap(), dec!(3.1));
    }

    #[tokio::test]
    async fn test_unknown_symbol_or_timeframe() {
        let account = account(3);
        assert!(account.symbol_bid("GBPUSD").await.is_err());
        assert!(account
            .symbol_periods("EURUSD", Timeframe::Hour(1))
            .await
            .is_err());
        let mut watcher = account.market_watcher();
        assert!(matches!(
            watcher.watch("GBPUSD", WatchOptions::ticks()).await,
            Err(FeedError::Subscribe(_))
        ));
        assert!(matches!(
            watcher.unwatch("EURUSD").await,
            Err(FeedError::Unwatch(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_replays_remaining_periods_in_order() {
        let account = account(3);
        let mut watcher = account.market_watcher();
        let mut events = watcher
            .watch("EURUSD", WatchOptions::periods(Timeframe::Minute(1)))
            .await
            .unwrap();
        assert_eq!(watcher.watched_symbols(), vec!["EURUSD".to_string()]);

        let mut closes = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                MarketEvent::PeriodClose(p) => closes.push(p.close),
                MarketEvent::Tick(_) => panic!("ticks were not requested"),
            }
        }
        assert_eq!(closes, vec![dec!(4), dec!(5)]);
        assert_eq!(account.remaining(), 0);
        let all = account
            .symbol_periods("EURUSD", Timeframe::Minute(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_ticks_and_periods_interleave_by_time() {
        let account = account(2);
        let mut watcher = account.market_watcher();
        let options = WatchOptions {
            watch_ticks: true,
            watch_periods: true,
            timeframes: vec![Timeframe::Minute(1)],
        };
        let mut events = watcher.watch("EURUSD", options).await.unwrap();

        let mut names = Vec::new();
        while let Some(event) = events.recv().await {
            names.push(event.name());
        }
        // history covers minutes 0-1 and the tick at 0:30
        assert_eq!(
            names,
            vec!["tick", "period-close", "period-close", "tick", "period-close"]
        );
    }

    #[tokio::test]
    async fn test_unwatch_stops_the_replay() {
        let config = ReplayConfig {
            history: 1,
            interval_ms: 10_000,
            ..Default::default()
        };
        let account = ReplayAccount::new("EURUSD", Timeframe::Minute(1), series(5), vec![], config);
        let mut watcher = account.market_watcher();
        let mut events = watcher
            .watch("EURUSD", WatchOptions::periods(Timeframe::Minute(1)))
            .await
            .unwrap();
        watcher.unwatch("EURUSD").await.unwrap();

        assert!(events.recv().await.is_none());
        assert_eq!(account.remaining(), 4);
        assert!(watcher.watched_symbols().is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let config: ReplayConfig = toml::from_str("history = 20\ninterval_ms = 250").unwrap();
        assert_eq!(config.history, 20);
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.channel_capacity, 256);
    }
}
