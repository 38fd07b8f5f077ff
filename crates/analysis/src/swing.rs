use tickwise_core::{Period, SwingPoint, SwingPointKind};

/// Default minimum number of moving periods in a swing run.
pub const DEFAULT_MIN_RUN_LENGTH: usize = 2;

/// Detect swing points of one kind in a single left-to-right scan.
///
/// From each start index the run is extended while the next close is strictly
/// lower (`Low`) or strictly higher (`High`) than the current one. The start
/// period anchors the run and is not part of it. Runs shorter than
/// `min_run_length` (at least 1) are discarded, and the scan resumes after the
/// consumed run, so runs never overlap.
pub fn detect_swing_points(
    periods: &[Period],
    kind: SwingPointKind,
    min_run_length: usize,
) -> Vec<SwingPoint> {
    let min_run_length = min_run_length.max(1);
    let mut swing_points = Vec::new();
    let mut i = 0;

    while i + 1 < periods.len() {
        let run_start = i + 1;
        while i + 1 < periods.len() && moves(kind, &periods[i], &periods[i + 1]) {
            i += 1;
        }

        let run_len = i + 1 - run_start;
        if run_len >= min_run_length {
            swing_points.push(SwingPoint::new(
                kind,
                run_start,
                periods[run_start..=i].to_vec(),
            ));
        }

        i += 1;
    }

    swing_points
}

fn moves(kind: SwingPointKind, current: &Period, next: &Period) -> bool {
    match kind {
        SwingPointKind::Low => next.close < current.close,
        SwingPointKind::High => next.close > current.close,
    }
}
