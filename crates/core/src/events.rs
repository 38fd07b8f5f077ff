use crate::models::*;
use serde::{Deserialize, Serialize};

/// Events emitted by a market watcher once a symbol is watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    Tick(Tick),
    PeriodClose(Period),
}

impl MarketEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::Tick(_) => "tick",
            MarketEvent::PeriodClose(_) => "period-close",
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Tick(tick) => &tick.symbol,
            MarketEvent::PeriodClose(period) => &period.symbol,
        }
    }
}
