use crate::swing::{detect_swing_points, DEFAULT_MIN_RUN_LENGTH};
use tickwise_core::{Period, SwingPoint, SwingPointKind, Tick, TrendType};

/// Classify the trend of a period series by counting broken swing structure.
///
/// A later low swing closing below an earlier one is bearish evidence; a later
/// high swing closing above an earlier one is bullish evidence. Each earlier
/// swing point counts at most once. This is a coarse structure-break count,
/// not a slope fit.
pub fn detect_trend(periods: &[Period]) -> TrendType {
    let lows = detect_swing_points(periods, SwingPointKind::Low, DEFAULT_MIN_RUN_LENGTH);
    let highs = detect_swing_points(periods, SwingPointKind::High, DEFAULT_MIN_RUN_LENGTH);

    let bearish = count_violations(&lows, |later, earlier| later < earlier);
    let bullish = count_violations(&highs, |later, earlier| later > earlier);

    TrendType::from_evidence(bullish, bearish)
}

/// Classify the trend of a tick series from consecutive bid/ask moves.
///
/// A pair counts only when bid and ask move strictly in the same direction.
pub fn detect_tick_trend(ticks: &[Tick]) -> TrendType {
    let mut bullish = 0;
    let mut bearish = 0;

    for pair in ticks.windows(2) {
        let (tick, next) = (&pair[0], &pair[1]);
        if next.bid < tick.bid && next.ask < tick.ask {
            bearish += 1;
        } else if next.bid > tick.bid && next.ask > tick.ask {
            bullish += 1;
        }
    }

    TrendType::from_evidence(bullish, bearish)
}

/// Points without a closing period carry no evidence either way.
fn count_violations<F>(swing_points: &[SwingPoint], violates: F) -> usize
where
    F: Fn(rust_decimal::Decimal, rust_decimal::Decimal) -> bool,
{
    swing_points
        .iter()
        .enumerate()
        .filter(|(i, earlier)| {
            let Some(earlier) = earlier.close() else {
                return false;
            };
            swing_points[i + 1..]
                .iter()
                .filter_map(SwingPoint::close)
                .any(|later| violates(later, earlier))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{closes, periods, ticks};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn mirrored(values: &[i64]) -> Vec<i64> {
        values.iter().map(|v| 100 - v).collect()
    }

    #[test]
    fn test_empty_swing_points_are_skipped() {
        let series = periods(&closes(&[10, 9, 8, 11, 7, 5]));
        let mut lows = detect_swing_points(&series, SwingPointKind::Low, 2);
        assert_eq!(lows.len(), 2);
        let empty = SwingPoint {
            kind: SwingPointKind::Low,
            start: 0,
            periods: Vec::new(),
        };
        lows.insert(1, empty.clone());
        lows.push(empty);
        assert_eq!(count_violations(&lows, |later, earlier| later < earlier), 1);
    }

    #[test]
    fn test_lower_lows_are_bearish() {
        // low swings close at 8, then 5, then 2
        let series = periods(&closes(&[10, 9, 8, 11, 7, 5, 9, 4, 2]));
        assert_eq!(detect_trend(&series), TrendType::Bearish);
    }

    #[test]
    fn test_higher_highs_are_bullish() {
        let series = periods(&closes(&[1, 2, 3, 1, 4, 6, 2, 7, 9]));
        assert_eq!(detect_trend(&series), TrendType::Bullish);
    }

    #[test]
    fn test_no_structure_is_neutral() {
        assert_eq!(detect_trend(&[]), TrendType::Neutral);
        assert_eq!(detect_trend(&periods(&closes(&[5, 5, 5, 5]))), TrendType::Neutral);
    }

    #[test]
    fn test_price_mirror_swaps_period_trend() {
        let samples: [&[i64]; 3] = [
            &[10, 9, 8, 11, 7, 5, 9, 4, 2],
            &[1, 2, 3, 1, 4, 6, 2, 7, 9, 3, 2, 1],
            &[50, 52, 54, 51, 49, 47, 53, 56, 58, 55, 50, 45],
        ];
        for sample in samples {
            let original = detect_trend(&periods(&closes(sample)));
            let mirror = detect_trend(&periods(&closes(&mirrored(sample))));
            assert_eq!(mirror, original.opposite());
        }
    }

    #[test]
    fn test_tick_trend_majority() {
        let series = ticks(&[
            (dec!(1.10), dec!(1.11)),
            (dec!(1.11), dec!(1.12)),
            (dec!(1.12), dec!(1.13)),
            (dec!(1.11), dec!(1.14)),
            (dec!(1.10), dec!(1.13)),
        ]);
        // two bullish pairs, one mixed, one bearish
        assert_eq!(detect_tick_trend(&series), TrendType::Bullish);
    }

    #[test]
    fn test_tick_trend_symmetries() {
        let quotes = [
            (dec!(1.20), dec!(1.21)),
            (dec!(1.19), dec!(1.20)),
            (dec!(1.18), dec!(1.19)),
            (dec!(1.185), dec!(1.195)),
            (dec!(1.17), dec!(1.18)),
        ];
        let series = ticks(&quotes);
        assert_eq!(detect_tick_trend(&series), TrendType::Bearish);

        let reversed: Vec<_> = quotes.iter().rev().copied().collect();
        assert_eq!(detect_tick_trend(&ticks(&reversed)), TrendType::Bullish);

        let mirror: Vec<_> = quotes
            .iter()
            .map(|(bid, ask)| (Decimal::TWO - *ask, Decimal::TWO - *bid))
            .collect();
        assert_eq!(detect_tick_trend(&ticks(&mirror)), TrendType::Bullish);
    }

    #[test]
    fn test_tick_trend_short_inputs() {
        assert_eq!(detect_tick_trend(&[]), TrendType::Neutral);
        let one = ticks(&[(dec!(1), dec!(2))]);
        assert_eq!(detect_tick_trend(&one), TrendType::Neutral);
    }
}
