use crate::handle::{HandleId, LiveStatus, StatusCell};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Weak;
use tickwise_core::{FeedError, MarketWatcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A committed feed subscription owned by the registry.
pub struct ActiveSubscription {
    symbol: String,
    watcher: Box<dyn MarketWatcher>,
    cancel: CancellationToken,
    listener: JoinHandle<()>,
    status: Weak<StatusCell>,
}

impl ActiveSubscription {
    pub(crate) fn new(
        symbol: &str,
        watcher: Box<dyn MarketWatcher>,
        cancel: CancellationToken,
        listener: JoinHandle<()>,
        status: Weak<StatusCell>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            watcher,
            cancel,
            listener,
            status,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Whether every clone of the owning handle has been dropped.
    pub fn is_orphaned(&self) -> bool {
        self.status.strong_count() == 0
    }

    /// Stop the listener without waiting for it or unwatching.
    pub(crate) fn cancel_listener(&self) {
        self.cancel.cancel();
    }

    /// Stop the listener, wait for an in-flight update to finish, then unwatch.
    /// The owning handle, if still alive, is marked `Ended`.
    pub async fn release(mut self) -> Result<(), FeedError> {
        self.cancel.cancel();
        if let Err(e) = self.listener.await {
            warn!(symbol = %self.symbol, error = %e, "Live listener did not finish cleanly");
        }
        if let Some(status) = self.status.upgrade() {
            *status.lock() = LiveStatus::Ended;
        }
        self.watcher.unwatch(&self.symbol).await
    }
}

impl fmt::Debug for ActiveSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSubscription")
            .field("symbol", &self.symbol)
            .field("orphaned", &self.is_orphaned())
            .finish()
    }
}

enum Entry {
    /// A start operation holds the slot but has not committed yet.
    Pending,
    Active(ActiveSubscription),
}

/// Identity-keyed map from live handles to their single subscription.
///
/// Keys are [`HandleId`]s, so value-equal handles never alias. The registry
/// keeps only a weak reference to each handle.
#[derive(Default)]
pub struct LiveRegistry {
    entries: Mutex<HashMap<HandleId, Entry>>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `id`. Returns `false` if it is pending or active.
    pub(crate) fn reserve(&self, id: HandleId) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, Entry::Pending);
        true
    }

    pub(crate) fn commit(&self, id: HandleId, subscription: ActiveSubscription) {
        if let Some(Entry::Active(previous)) =
            self.entries.lock().insert(id, Entry::Active(subscription))
        {
            // Unreachable through the session: commits always follow a reservation.
            warn!(%id, symbol = %previous.symbol, "Replaced an active subscription");
            previous.cancel_listener();
        }
    }

    /// Drop a reservation that did not commit.
    pub(crate) fn cancel(&self, id: HandleId) {
        let mut entries = self.entries.lock();
        if matches!(entries.get(&id), Some(Entry::Pending)) {
            entries.remove(&id);
        }
    }

    /// Remove and return the active subscription of `id`.
    pub(crate) fn take(&self, id: HandleId) -> Option<ActiveSubscription> {
        let mut entries = self.entries.lock();
        if !matches!(entries.get(&id), Some(Entry::Active(_))) {
            return None;
        }
        match entries.remove(&id) {
            Some(Entry::Active(subscription)) => Some(subscription),
            _ => None,
        }
    }

    /// Remove every active subscription whose handle is gone.
    pub(crate) fn take_orphaned(&self) -> Vec<ActiveSubscription> {
        let mut entries = self.entries.lock();
        let orphaned: Vec<HandleId> = entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                Entry::Active(sub) if sub.is_orphaned() => Some(*id),
                _ => None,
            })
            .collect();
        orphaned
            .into_iter()
            .filter_map(|id| match entries.remove(&id) {
                Some(Entry::Active(sub)) => Some(sub),
                _ => None,
            })
            .collect()
    }

    /// Remove every active subscription. Pending reservations stay.
    pub(crate) fn take_all(&self) -> Vec<ActiveSubscription> {
        let mut entries = self.entries.lock();
        let active: Vec<HandleId> = entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Active(_)))
            .map(|(id, _)| *id)
            .collect();
        debug!(count = active.len(), "Draining live registry");
        active
            .into_iter()
            .filter_map(|id| match entries.remove(&id) {
                Some(Entry::Active(sub)) => Some(sub),
                _ => None,
            })
            .collect()
    }

    /// Whether `id` holds a slot, pending or active.
    pub fn contains(&self, id: HandleId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn is_active(&self, id: HandleId) -> bool {
        matches!(self.entries.lock().get(&id), Some(Entry::Active(_)))
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| matches!(entry, Entry::Active(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of held slots, pending reservations included.
    pub fn slots(&self) -> usize {
        self.entries.lock().len()
    }
}

impl fmt::Debug for LiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("LiveRegistry")
            .field("entries", &entries.len())
            .finish()
    }
}
