use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};
use tickwise_core::{Period, PriceField, Timeframe};
use tickwise_indicators::Indicator;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity & Status
// ---------------------------------------------------------------------------

/// Identity of a live handle. Minted once per constructed handle and shared by its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a live handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    /// Not seeded, no subscription.
    Unbound,
    /// Seeded and receiving feed updates.
    Active,
    /// Subscription released.
    Ended,
}

pub(crate) type StatusCell = Mutex<LiveStatus>;

// ---------------------------------------------------------------------------
// Generic handle
// ---------------------------------------------------------------------------

struct Shared<S> {
    id: HandleId,
    status: Arc<StatusCell>,
    state: Mutex<S>,
}

/// A caller-owned live entity. Cloning shares the same identity and state.
pub struct LiveHandle<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for LiveHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> fmt::Debug for LiveHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveHandle")
            .field("id", &self.shared.id)
            .field("status", &*self.shared.status.lock())
            .finish()
    }
}

impl<S: Send + 'static> LiveHandle<S> {
    pub(crate) fn from_state(state: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: HandleId::new(),
                status: Arc::new(Mutex::new(LiveStatus::Unbound)),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn id(&self) -> HandleId {
        self.shared.id
    }

    pub fn status(&self) -> LiveStatus {
        *self.shared.status.lock()
    }

    /// Read the current state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.shared.state.lock())
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.shared.state.lock())
    }

    pub(crate) fn set_status(&self, status: LiveStatus) {
        *self.shared.status.lock() = status;
    }

    /// Non-owning reference to the status cell; dead once every clone of the handle is dropped.
    pub(crate) fn status_ref(&self) -> Weak<StatusCell> {
        Arc::downgrade(&self.shared.status)
    }

    pub(crate) fn downgrade(&self) -> WeakHandle<S> {
        WeakHandle(Arc::downgrade(&self.shared))
    }
}

pub(crate) struct WeakHandle<S>(Weak<Shared<S>>);

impl<S> WeakHandle<S> {
    pub(crate) fn upgrade(&self) -> Option<LiveHandle<S>> {
        self.0.upgrade().map(|shared| LiveHandle { shared })
    }
}

// ---------------------------------------------------------------------------
// Live symbol / prices
// ---------------------------------------------------------------------------

/// Latest quote of a symbol, overwritten on each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolQuote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    /// Timestamp of the last applied tick; `None` until the first tick.
    pub updated_at: Option<DateTime<Utc>>,
}

pub type LiveSymbol = LiveHandle<SymbolQuote>;

impl LiveHandle<SymbolQuote> {
    pub fn symbol(&self) -> String {
        self.read(|q| q.symbol.clone())
    }

    pub fn bid(&self) -> Decimal {
        self.read(|q| q.bid)
    }

    pub fn ask(&self) -> Decimal {
        self.read(|q| q.ask)
    }

    pub fn quote(&self) -> SymbolQuote {
        self.read(Clone::clone)
    }
}

/// A `[bid, ask]` pair, overwritten on each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePair {
    pub symbol: String,
    pub prices: [Decimal; 2],
}

pub type LivePrices = LiveHandle<PricePair>;

impl LiveHandle<PricePair> {
    pub fn prices(&self) -> [Decimal; 2] {
        self.read(|p| p.prices)
    }
}

// ---------------------------------------------------------------------------
// Live periods
// ---------------------------------------------------------------------------

/// A growing period series of one symbol and timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub periods: Vec<Period>,
}

impl PeriodSeries {
    pub(crate) fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            periods: Vec::new(),
        }
    }

    /// Append a period if it starts after the newest one held.
    pub(crate) fn push(&mut self, period: &Period) -> bool {
        if period.symbol != self.symbol || period.timeframe != self.timeframe {
            return false;
        }
        if let Some(last) = self.periods.last() {
            if period.start <= last.start {
                return false;
            }
        }
        self.periods.push(period.clone());
        true
    }

    pub(crate) fn extend(&mut self, periods: &[Period]) -> usize {
        periods.iter().filter(|p| self.push(p)).count()
    }
}

pub type LivePeriods = LiveHandle<PeriodSeries>;

impl LiveHandle<PeriodSeries> {
    pub fn periods(&self) -> Vec<Period> {
        self.read(|s| s.periods.clone())
    }

    pub fn len(&self) -> usize {
        self.read(|s| s.periods.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Live indicator
// ---------------------------------------------------------------------------

/// Which series feeds a live indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorInput {
    pub symbol: String,
    pub timeframe: Timeframe,
    #[serde(default)]
    pub price: PriceField,
}

impl IndicatorInput {
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            price: PriceField::default(),
        }
    }

    pub fn with_price(mut self, price: PriceField) -> Self {
        self.price = price;
        self
    }
}

/// Streaming indicator plus the bookkeeping needed to fold periods exactly once.
pub struct IndicatorState {
    indicator: Box<dyn Indicator>,
    input: Option<IndicatorInput>,
    value: Option<Decimal>,
    folded: usize,
    watermark: Option<DateTime<Utc>>,
}

impl IndicatorState {
    /// Drop all accumulated state and bind to a new input.
    pub(crate) fn rebind(&mut self, input: &IndicatorInput) {
        self.clear();
        self.input = Some(input.clone());
    }

    pub(crate) fn clear(&mut self) {
        self.indicator.reset();
        self.input = None;
        self.value = None;
        self.folded = 0;
        self.watermark = None;
    }

    /// Fold one period. Periods of another series, or at or before the
    /// watermark, are ignored.
    pub(crate) fn fold(&mut self, period: &Period) -> bool {
        let Some(input) = &self.input else {
            return false;
        };
        if period.symbol != input.symbol || period.timeframe != input.timeframe {
            return false;
        }
        if self.watermark.is_some_and(|mark| period.start <= mark) {
            return false;
        }
        self.value = self.indicator.next(period.price(input.price));
        self.folded += 1;
        self.watermark = Some(period.start);
        true
    }

    pub(crate) fn fold_all(&mut self, periods: &[Period]) -> usize {
        periods.iter().filter(|p| self.fold(p)).count()
    }
}

impl fmt::Debug for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicatorState")
            .field("input", &self.input)
            .field("value", &self.value)
            .field("folded", &self.folded)
            .field("watermark", &self.watermark)
            .finish()
    }
}

pub type LiveIndicator = LiveHandle<IndicatorState>;

impl LiveHandle<IndicatorState> {
    /// Wrap a streaming indicator in an unbound live handle.
    pub fn new(indicator: impl Indicator + 'static) -> Self {
        Self::from_state(IndicatorState {
            indicator: Box::new(indicator),
            input: None,
            value: None,
            folded: 0,
            watermark: None,
        })
    }

    /// Output of the most recent fold.
    pub fn value(&self) -> Option<Decimal> {
        self.read(|s| s.value)
    }

    /// Number of periods folded since the last reset.
    pub fn folded(&self) -> usize {
        self.read(|s| s.folded)
    }

    /// Start time of the newest folded period.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.watermark)
    }

    pub fn is_ready(&self) -> bool {
        self.read(|s| s.indicator.is_ready())
    }

    pub fn input(&self) -> Option<IndicatorInput> {
        self.read(|s| s.input.clone())
    }
}
