//! Whole-series indicator functions.
//!
//! Every function takes prices ordered oldest to newest and returns aligned
//! outputs in the same order. Work runs on tokio's blocking pool, so calls are
//! independent of each other and never stall the caller's runtime thread.

use crate::bollinger::BollingerBands;
use crate::ema::Ema;
use crate::rsi::Rsi;
use crate::sma::Sma;
use crate::stochastic::Stochastic;
use crate::{ComputationError, Indicator};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lower, middle and upper Bollinger series, aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BollingerSeries {
    pub lower: Vec<Decimal>,
    pub middle: Vec<Decimal>,
    pub upper: Vec<Decimal>,
}

/// %K and %D series, aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StochasticSeries {
    pub k: Vec<Decimal>,
    pub d: Vec<Decimal>,
}

/// Simple moving average. Output has `prices.len() - length + 1` values.
pub async fn moving_average(
    prices: &[Decimal],
    length: usize,
) -> Result<Vec<Decimal>, ComputationError> {
    check_length(length, prices.len())?;
    run_streaming(prices.to_vec(), Sma::new(length)).await
}

/// Exponential moving average seeded with the SMA of the first window.
/// Output has `prices.len() - length + 1` values.
pub async fn exponential_moving_average(
    prices: &[Decimal],
    length: usize,
) -> Result<Vec<Decimal>, ComputationError> {
    check_length(length, prices.len())?;
    run_streaming(prices.to_vec(), Ema::new(length)).await
}

/// Relative strength index. Needs `length + 1` prices and yields
/// `prices.len() - length` values. Values are passed through unclamped.
pub async fn relative_strength_index(
    prices: &[Decimal],
    length: usize,
) -> Result<Vec<Decimal>, ComputationError> {
    if length == 0 || length >= prices.len() {
        return Err(ComputationError::InvalidLength {
            length,
            available: prices.len(),
        });
    }
    run_streaming(prices.to_vec(), Rsi::new(length)).await
}

/// Bollinger Bands with a `multiplier` x standard deviation envelope.
pub async fn bollinger_bands(
    prices: &[Decimal],
    length: usize,
    multiplier: Decimal,
) -> Result<BollingerSeries, ComputationError> {
    check_length(length, prices.len())?;
    if multiplier.is_sign_negative() {
        return Err(ComputationError::InvalidMultiplier(multiplier));
    }

    let prices = prices.to_vec();
    spawn_computation(move || {
        let mut bands = BollingerBands::new(length, multiplier);
        let mut series = BollingerSeries::default();
        for sample in prices.into_iter().filter_map(|p| bands.next_bands(p)) {
            series.lower.push(sample.lower);
            series.middle.push(sample.middle);
            series.upper.push(sample.upper);
        }
        series
    })
    .await
}

/// Slow stochastic oscillator over high/low/close series of equal length.
pub async fn stochastic_oscillator(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    length: usize,
    k_smoothing: usize,
    d_smoothing: usize,
) -> Result<StochasticSeries, ComputationError> {
    if highs.len() != lows.len() || lows.len() != closes.len() {
        return Err(ComputationError::MismatchedInputs {
            highs: highs.len(),
            lows: lows.len(),
            closes: closes.len(),
        });
    }
    for window in [length, k_smoothing, d_smoothing] {
        if window == 0 {
            return Err(ComputationError::InvalidLength {
                length: window,
                available: closes.len(),
            });
        }
    }
    let warmup = length + k_smoothing + d_smoothing - 2;
    check_length(warmup, closes.len())?;

    let rows: Vec<(Decimal, Decimal, Decimal)> = highs
        .iter()
        .zip(lows)
        .zip(closes)
        .map(|((h, l), c)| (*h, *l, *c))
        .collect();
    spawn_computation(move || {
        let mut stoch = Stochastic::new(length, k_smoothing, d_smoothing);
        let mut series = StochasticSeries::default();
        for sample in rows
            .into_iter()
            .filter_map(|(h, l, c)| stoch.next_hlc(h, l, c))
        {
            series.k.push(sample.k);
            series.d.push(sample.d);
        }
        series
    })
    .await
}

fn check_length(length: usize, available: usize) -> Result<(), ComputationError> {
    if length == 0 || length > available {
        return Err(ComputationError::InvalidLength { length, available });
    }
    Ok(())
}

async fn run_streaming<I>(
    prices: Vec<Decimal>,
    mut indicator: I,
) -> Result<Vec<Decimal>, ComputationError>
where
    I: Indicator + 'static,
{
    spawn_computation(move || {
        prices
            .into_iter()
            .filter_map(|p| indicator.next(p))
            .collect()
    })
    .await
}

async fn spawn_computation<T, F>(work: F) -> Result<T, ComputationError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ComputationError::Backend(e.to_string()))
}
