use crate::handle::{
    IndicatorInput, LiveHandle, LiveIndicator, LivePeriods, LivePrices, LiveStatus, LiveSymbol,
    PeriodSeries, PricePair, SymbolQuote,
};
use crate::listener::spawn_listener;
use crate::registry::{ActiveSubscription, LiveRegistry};
use std::sync::Arc;
use tickwise_core::{
    FeedError, MarketEvent, MarketWatcher, Period, Timeframe, TradingAccount, WatchOptions,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Invoked with the unmodified feed event after it has been applied to a handle.
pub type UpdateCallback = Arc<dyn Fn(&MarketEvent) + Send + Sync>;

/// Owns the registry of live subscriptions.
///
/// Every start follows the same sequence: reserve the handle's slot, seed its
/// state from the account, open a watcher, fetch again to close the gap
/// between seed and subscription, then commit. A failure at any step unwinds
/// what came before it.
#[derive(Debug, Default)]
pub struct LiveSession {
    registry: LiveRegistry,
}

impl LiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &LiveRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Live symbol
    // -----------------------------------------------------------------------

    /// Read the current quote and keep it current from tick events.
    pub async fn start_live_symbol(
        &self,
        symbol: &str,
        account: &dyn TradingAccount,
        on_update: Option<UpdateCallback>,
    ) -> Result<LiveSymbol, FeedError> {
        let bid = account.symbol_bid(symbol).await?;
        let ask = account.symbol_ask(symbol).await?;
        let live = LiveHandle::from_state(SymbolQuote {
            symbol: symbol.to_string(),
            bid,
            ask,
            updated_at: None,
        });

        self.start_ticks(&live, symbol, account, on_update, |quote: &mut SymbolQuote, tick| {
            quote.bid = tick.bid;
            quote.ask = tick.ask;
            quote.updated_at = Some(tick.timestamp);
        })
        .await?;
        info!(symbol, %bid, %ask, "Live symbol started");
        Ok(live)
    }

    pub async fn end_live_symbol(&self, live: &LiveSymbol) {
        self.end(live).await;
    }

    // -----------------------------------------------------------------------
    // Live prices
    // -----------------------------------------------------------------------

    /// A `[bid, ask]` pair kept current from tick events.
    pub async fn start_live_prices(
        &self,
        symbol: &str,
        account: &dyn TradingAccount,
        on_update: Option<UpdateCallback>,
    ) -> Result<LivePrices, FeedError> {
        let bid = account.symbol_bid(symbol).await?;
        let ask = account.symbol_ask(symbol).await?;
        let live = LiveHandle::from_state(PricePair {
            symbol: symbol.to_string(),
            prices: [bid, ask],
        });

        self.start_ticks(&live, symbol, account, on_update, |pair: &mut PricePair, tick| {
            pair.prices = [tick.bid, tick.ask];
        })
        .await?;
        info!(symbol, %bid, %ask, "Live prices started");
        Ok(live)
    }

    pub async fn end_live_prices(&self, live: &LivePrices) {
        self.end(live).await;
    }

    // -----------------------------------------------------------------------
    // Live periods
    // -----------------------------------------------------------------------

    /// Fetch the period history and append each new close as it arrives.
    pub async fn start_live_periods(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        account: &dyn TradingAccount,
        on_update: Option<UpdateCallback>,
    ) -> Result<LivePeriods, FeedError> {
        let history = account.symbol_periods(symbol, timeframe).await?;
        let mut series = PeriodSeries::new(symbol, timeframe);
        series.extend(&history);
        let live = LiveHandle::from_state(series);

        // The handle was minted above, so its slot is free.
        let id = live.id();
        self.registry.reserve(id);

        let (mut watcher, events) =
            match open_watch(account, symbol, WatchOptions::periods(timeframe)).await {
                Ok(opened) => opened,
                Err(e) => {
                    self.registry.cancel(id);
                    return Err(e);
                }
            };
        let latest = match catch_up(account, watcher.as_mut(), symbol, timeframe).await {
            Ok(latest) => latest,
            Err(e) => {
                self.registry.cancel(id);
                return Err(e);
            }
        };
        let caught_up = live.update(|series| series.extend(&latest));

        self.activate(&live, symbol, watcher, events, on_update, |series, event| {
            match event {
                MarketEvent::PeriodClose(period) => series.push(period),
                MarketEvent::Tick(_) => false,
            }
        });
        info!(symbol, %timeframe, periods = live.len(), caught_up, "Live periods started");
        Ok(live)
    }

    pub async fn end_live_periods(&self, live: &LivePeriods) {
        self.end(live).await;
    }

    // -----------------------------------------------------------------------
    // Live indicator
    // -----------------------------------------------------------------------

    /// Seed `indicator` from the full history of `input` and keep it current
    /// from period-close events.
    ///
    /// Starting a handle that is already active, or whose start is still in
    /// flight, returns it unchanged without opening a second subscription.
    /// On failure the handle is reset and left `Unbound`.
    pub async fn start_live_indicator(
        &self,
        indicator: &LiveIndicator,
        account: &dyn TradingAccount,
        input: IndicatorInput,
        on_update: Option<UpdateCallback>,
    ) -> Result<LiveIndicator, FeedError> {
        let id = indicator.id();
        if !self.registry.reserve(id) {
            debug!(%id, symbol = %input.symbol, "Live indicator already started");
            return Ok(indicator.clone());
        }

        let symbol = input.symbol.as_str();
        let timeframe = input.timeframe;
        indicator.update(|state| state.rebind(&input));

        let history = match account.symbol_periods(symbol, timeframe).await {
            Ok(history) => history,
            Err(e) => {
                self.rollback(indicator);
                return Err(e);
            }
        };
        let seeded = indicator.update(|state| state.fold_all(&history));

        let (mut watcher, events) =
            match open_watch(account, symbol, WatchOptions::periods(timeframe)).await {
                Ok(opened) => opened,
                Err(e) => {
                    self.rollback(indicator);
                    return Err(e);
                }
            };
        let latest = match catch_up(account, watcher.as_mut(), symbol, timeframe).await {
            Ok(latest) => latest,
            Err(e) => {
                self.rollback(indicator);
                return Err(e);
            }
        };
        let caught_up = indicator.update(|state| state.fold_all(&latest));

        self.activate(indicator, symbol, watcher, events, on_update, |state, event| {
            match event {
                MarketEvent::PeriodClose(period) => state.fold(period),
                MarketEvent::Tick(_) => false,
            }
        });
        info!(
            %id,
            symbol,
            %timeframe,
            seeded,
            caught_up,
            value = ?indicator.value(),
            "Live indicator started"
        );
        Ok(indicator.clone())
    }

    /// Release the indicator's subscription. No-op unless it is active.
    pub async fn end_live_indicator(&self, indicator: &LiveIndicator) -> LiveIndicator {
        self.end(indicator).await;
        indicator.clone()
    }

    // -----------------------------------------------------------------------
    // Reclamation
    // -----------------------------------------------------------------------

    /// Release subscriptions whose handles have been dropped by every owner.
    pub async fn prune(&self) -> usize {
        let orphaned = self.registry.take_orphaned();
        let count = orphaned.len();
        for subscription in orphaned {
            release(subscription).await;
        }
        if count > 0 {
            info!(count, "Pruned orphaned live subscriptions");
        }
        count
    }

    /// Release every subscription of this session.
    pub async fn shutdown(&self) {
        let active = self.registry.take_all();
        let count = active.len();
        for subscription in active {
            release(subscription).await;
        }
        info!(count, "Live session shut down");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn start_ticks<S, F>(
        &self,
        live: &LiveHandle<S>,
        symbol: &str,
        account: &dyn TradingAccount,
        on_update: Option<UpdateCallback>,
        mut apply: F,
    ) -> Result<(), FeedError>
    where
        S: Send + 'static,
        F: FnMut(&mut S, &tickwise_core::Tick) + Send + 'static,
    {
        // Callers mint `live` right before starting it, so its slot is free.
        let id = live.id();
        self.registry.reserve(id);
        let (watcher, events) = match open_watch(account, symbol, WatchOptions::ticks()).await {
            Ok(opened) => opened,
            Err(e) => {
                self.registry.cancel(id);
                return Err(e);
            }
        };

        let owned = symbol.to_string();
        self.activate(live, symbol, watcher, events, on_update, move |state, event| {
            match event {
                MarketEvent::Tick(tick) if tick.symbol == owned => {
                    apply(state, tick);
                    true
                }
                _ => false,
            }
        });
        Ok(())
    }

    /// Mark the handle active, spawn its listener and commit the reservation.
    fn activate<S, F>(
        &self,
        live: &LiveHandle<S>,
        symbol: &str,
        watcher: Box<dyn MarketWatcher>,
        events: mpsc::Receiver<MarketEvent>,
        on_update: Option<UpdateCallback>,
        apply: F,
    ) where
        S: Send + 'static,
        F: FnMut(&mut S, &MarketEvent) -> bool + Send + 'static,
    {
        live.set_status(LiveStatus::Active);
        let cancel = CancellationToken::new();
        let listener = spawn_listener(live, events, cancel.clone(), on_update, apply);
        let subscription =
            ActiveSubscription::new(symbol, watcher, cancel, listener, live.status_ref());
        self.registry.commit(live.id(), subscription);
    }

    fn rollback(&self, indicator: &LiveIndicator) {
        indicator.update(|state| state.clear());
        indicator.set_status(LiveStatus::Unbound);
        self.registry.cancel(indicator.id());
        warn!(id = %indicator.id(), "Live indicator start rolled back");
    }

    async fn end<S: Send + 'static>(&self, live: &LiveHandle<S>) {
        let id = live.id();
        match self.registry.take(id) {
            Some(subscription) => {
                info!(%id, symbol = subscription.symbol(), "Ending live subscription");
                release(subscription).await;
            }
            None => debug!(%id, status = ?live.status(), "No active subscription to end"),
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        let active = self.registry.take_all();
        if !active.is_empty() {
            warn!(count = active.len(), "Live session dropped with active subscriptions");
        }
        for subscription in active {
            subscription.cancel_listener();
        }
    }
}

async fn open_watch(
    account: &dyn TradingAccount,
    symbol: &str,
    options: WatchOptions,
) -> Result<(Box<dyn MarketWatcher>, mpsc::Receiver<MarketEvent>), FeedError> {
    let mut watcher = account.market_watcher();
    let events = watcher.watch(symbol, options).await?;
    Ok((watcher, events))
}

/// Fetch the history again once the watcher is open. Unwatches on failure.
async fn catch_up(
    account: &dyn TradingAccount,
    watcher: &mut dyn MarketWatcher,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Vec<Period>, FeedError> {
    match account.symbol_periods(symbol, timeframe).await {
        Ok(periods) => Ok(periods),
        Err(e) => {
            if let Err(unwatch_err) = watcher.unwatch(symbol).await {
                warn!(symbol, error = %unwatch_err, "Unwatch after failed catch-up failed");
            }
            Err(e)
        }
    }
}

async fn release(subscription: ActiveSubscription) {
    let symbol = subscription.symbol().to_string();
    if let Err(e) = subscription.release().await {
        warn!(symbol = %symbol, error = %e, "Unwatch failed");
    }
}
