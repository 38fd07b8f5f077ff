pub mod batch;
pub mod bollinger;
pub mod ema;
pub mod rsi;
pub mod sma;
pub mod stochastic;

pub use batch::*;

use rust_decimal::Decimal;

/// Trait for streaming (incremental) indicators.
/// Feed one value at a time; the indicator maintains internal state.
pub trait Indicator: Send + Sync {
    /// Process the next value and return the indicator output (if ready).
    fn next(&mut self, value: Decimal) -> Option<Decimal>;

    /// Reset the indicator to its initial state.
    fn reset(&mut self);

    /// The minimum number of data points needed before the indicator produces output.
    fn period(&self) -> usize;

    /// Whether the indicator has enough data to produce output.
    fn is_ready(&self) -> bool;
}

/// Errors from invalid indicator parameters or a failed computation worker.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputationError {
    #[error("Invalid length {length} for a series of {available} values")]
    InvalidLength { length: usize, available: usize },
    #[error("Invalid band multiplier: {0}")]
    InvalidMultiplier(Decimal),
    #[error("Input series differ in length (highs: {highs}, lows: {lows}, closes: {closes})")]
    MismatchedInputs {
        highs: usize,
        lows: usize,
        closes: usize,
    },
    #[error("Invalid {name} window {length}, must be at least 1")]
    InvalidWindow { name: &'static str, length: usize },
    #[error("Computation worker failed: {0}")]
    Backend(String),
}

pub(crate) fn check_window(name: &'static str, length: usize) -> Result<(), ComputationError> {
    if length == 0 {
        return Err(ComputationError::InvalidWindow { name, length });
    }
    Ok(())
}
