use crate::congestion::DEFAULT_CONGESTION_DISTANCE;
use crate::rejection::DEFAULT_REJECTION_DISTANCE;
use crate::swing::DEFAULT_MIN_RUN_LENGTH;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tuning for a structure analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum number of moving periods in a swing run.
    pub swing_min_run_length: usize,
    /// Allowed deviation of the mean-to-midpoint ratio from 1.
    pub congestion_distance: Decimal,
    /// Only the newest `n` periods are tested for congestion. `None` uses the whole series.
    pub congestion_window: Option<usize>,
    /// Horizontal rejection clustering is off unless enabled here.
    pub cluster_rejections: bool,
    /// Half-width of a rejection band as a fraction of its anchor price.
    pub rejection_distance: Decimal,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            swing_min_run_length: DEFAULT_MIN_RUN_LENGTH,
            congestion_distance: DEFAULT_CONGESTION_DISTANCE,
            congestion_window: None,
            cluster_rejections: false,
            rejection_distance: DEFAULT_REJECTION_DISTANCE,
        }
    }
}
