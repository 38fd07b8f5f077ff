use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tickwise_core::{RejectionZone, SwingPoint};

/// Default half-width of a rejection band, as a fraction of its anchor price.
pub const DEFAULT_REJECTION_DISTANCE: Decimal = dec!(0.08);

/// Group swing points into horizontal price bands.
///
/// Each band is anchored at the closing price of the earliest swing point not
/// yet assigned and spans `anchor * (1 ± max_distance_fraction)`. Bands touched
/// by fewer than two swing points are dropped, as are points with no periods.
pub fn horizontal_rejections(
    swing_points: &[SwingPoint],
    max_distance_fraction: Decimal,
) -> Vec<RejectionZone> {
    if swing_points.len() < 2 {
        return Vec::new();
    }

    let mut assigned = vec![false; swing_points.len()];
    let mut zones = Vec::new();

    for (anchor_idx, anchor) in swing_points.iter().enumerate() {
        if assigned[anchor_idx] {
            continue;
        }
        let Some(price) = anchor.close() else {
            continue;
        };
        let a = price * (Decimal::ONE - max_distance_fraction);
        let b = price * (Decimal::ONE + max_distance_fraction);
        let (lower, upper) = (a.min(b), a.max(b));

        let members: Vec<usize> = (anchor_idx..swing_points.len())
            .filter(|&i| !assigned[i])
            .filter(|&i| {
                swing_points[i]
                    .close()
                    .is_some_and(|close| close >= lower && close <= upper)
            })
            .collect();

        if members.len() < 2 {
            continue;
        }
        for &i in &members {
            assigned[i] = true;
        }
        zones.push(RejectionZone {
            lower,
            upper,
            swing_points: members.iter().map(|&i| swing_points[i].clone()).collect(),
        });
    }

    zones
}
