use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tickwise_core::{Period, Tick, Timeframe};

/// Minute periods whose open/high/low straddle the given closes.
pub fn periods(closes: &[Decimal]) -> Vec<Period> {
    let origin = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let timeframe = Timeframe::Minute(1);
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let start = origin + timeframe.duration() * i as i32;
            Period {
                symbol: "EURUSD".to_string(),
                timeframe,
                start,
                end: start + timeframe.duration(),
                open: *close,
                high: *close + Decimal::ONE,
                low: *close - Decimal::ONE,
                close: *close,
                volume: Decimal::ONE_HUNDRED,
            }
        })
        .collect()
}

pub fn ticks(quotes: &[(Decimal, Decimal)]) -> Vec<Tick> {
    let origin = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    quotes
        .iter()
        .enumerate()
        .map(|(i, (bid, ask))| Tick {
            symbol: "EURUSD".to_string(),
            timestamp: origin + chrono::Duration::milliseconds(i as i64 * 250),
            bid: *bid,
            ask: *ask,
        })
        .collect()
}

pub fn closes(values: &[i64]) -> Vec<Decimal> {
    values.iter().map(|v| Decimal::from(*v)).collect()
}
