use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tickwise_core::{CongestionArea, Period};

/// Default tolerance of the mean-to-midpoint ratio around 1.
pub const DEFAULT_CONGESTION_DISTANCE: Decimal = dec!(0.05);

/// Detect whether a window of periods forms a congestion area.
///
/// The mean close is compared with the midpoint of the lowest and highest
/// close. The window qualifies when `mean / midpoint` lies within
/// `[1 - max_distance_fraction, 1 + max_distance_fraction]`. Support and
/// resistance are the lowest low and highest high of the window.
pub fn detect_congestion_area(
    periods: &[Period],
    max_distance_fraction: Decimal,
) -> Option<CongestionArea> {
    let ratio = mean_to_midpoint_ratio(periods)?;
    if ratio < Decimal::ONE - max_distance_fraction || ratio > Decimal::ONE + max_distance_fraction
    {
        return None;
    }

    let average_price = mean_close(periods)?;
    let support_price = periods.iter().map(|p| p.low).min()?;
    let resistance_price = periods.iter().map(|p| p.high).max()?;

    Some(CongestionArea {
        periods: periods.to_vec(),
        average_price,
        support_price,
        resistance_price,
    })
}

/// `mean(close) / ((min(close) + max(close)) / 2)`, or `None` for an empty
/// window or a zero midpoint.
pub fn mean_to_midpoint_ratio(periods: &[Period]) -> Option<Decimal> {
    let mean = mean_close(periods)?;
    let lowest = periods.iter().map(|p| p.close).min()?;
    let highest = periods.iter().map(|p| p.close).max()?;
    let midpoint = (lowest + highest) / Decimal::TWO;
    if midpoint.is_zero() {
        return None;
    }
    Some(mean / midpoint)
}

fn mean_close(periods: &[Period]) -> Option<Decimal> {
    if periods.is_empty() {
        return None;
    }
    let total: Decimal = periods.iter().map(|p| p.close).sum();
    Some(total / Decimal::from(periods.len()))
}
