use crate::handle::LiveHandle;
use crate::session::UpdateCallback;
use tickwise_core::MarketEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Spawn the task that applies feed events to one handle, in arrival order.
///
/// `apply` returns whether the event changed the state; the callback only
/// sees applied events. The task exits on cancellation, when the feed closes,
/// or once every clone of the handle has been dropped.
pub(crate) fn spawn_listener<S, F>(
    handle: &LiveHandle<S>,
    mut events: mpsc::Receiver<MarketEvent>,
    cancel: CancellationToken,
    on_update: Option<UpdateCallback>,
    mut apply: F,
) -> JoinHandle<()>
where
    S: Send + 'static,
    F: FnMut(&mut S, &MarketEvent) -> bool + Send + 'static,
{
    let weak = handle.downgrade();
    let id = handle.id();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(%id, "Live listener cancelled");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!(%id, "Feed closed");
                        break;
                    }
                },
            };

            let Some(handle) = weak.upgrade() else {
                debug!(%id, "Live handle dropped, stopping listener");
                break;
            };
            let applied = handle.update(|state| apply(state, &event));
            drop(handle);

            if !applied {
                trace!(%id, event = event.name(), symbol = event.symbol(), "Event ignored");
                continue;
            }
            if let Some(callback) = &on_update {
                callback(&event);
            }
        }
    })
}
