use crate::config::AnalysisConfig;
use crate::congestion::detect_congestion_area;
use crate::rejection::horizontal_rejections;
use crate::swing::detect_swing_points;
use crate::trend::{detect_tick_trend, detect_trend};
use serde::{Deserialize, Serialize};
use tickwise_core::{
    CongestionArea, Period, RejectionZone, SwingPoint, SwingPointKind, Tick, TrendType,
};

/// Every structural signal for one period window (and optional tick window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub low_swings: Vec<SwingPoint>,
    pub high_swings: Vec<SwingPoint>,
    pub trend: TrendType,
    pub tick_trend: TrendType,
    pub congestion: Option<CongestionArea>,
    /// Bands formed by low swings. Empty unless clustering is enabled.
    pub support_rejections: Vec<RejectionZone>,
    /// Bands formed by high swings. Empty unless clustering is enabled.
    pub resistance_rejections: Vec<RejectionZone>,
}

/// Run every detector over the given windows.
pub fn analyze(periods: &[Period], ticks: &[Tick], config: &AnalysisConfig) -> StructureReport {
    let low_swings =
        detect_swing_points(periods, SwingPointKind::Low, config.swing_min_run_length);
    let high_swings =
        detect_swing_points(periods, SwingPointKind::High, config.swing_min_run_length);

    let congestion_periods = match config.congestion_window {
        Some(n) => &periods[periods.len().saturating_sub(n)..],
        None => periods,
    };

    let (support_rejections, resistance_rejections) = if config.cluster_rejections {
        (
            horizontal_rejections(&low_swings, config.rejection_distance),
            horizontal_rejections(&high_swings, config.rejection_distance),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    StructureReport {
        trend: detect_trend(periods),
        tick_trend: detect_tick_trend(ticks),
        congestion: detect_congestion_area(congestion_periods, config.congestion_distance),
        low_swings,
        high_swings,
        support_rejections,
        resistance_rejections,
    }
}
