//! Market structure detection over ordered period and tick sequences.
//!
//! All inputs are ordered oldest to newest. Every detector is a pure function;
//! "nothing found" is an empty or absent result, never an error.

pub mod config;
pub mod congestion;
pub mod rejection;
pub mod report;
pub mod swing;
pub mod trend;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::AnalysisConfig;
pub use congestion::detect_congestion_area;
pub use rejection::horizontal_rejections;
pub use report::{analyze, StructureReport};
pub use swing::detect_swing_points;
pub use trend::{detect_tick_trend, detect_trend};
