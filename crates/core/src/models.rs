use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// Timeframe for periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Second(u32),
    Minute(u32),
    Hour(u32),
    Daily,
    Weekly,
}

impl Timeframe {
    /// Nominal length of one period at this timeframe.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Second(n) => Duration::seconds(i64::from(*n)),
            Timeframe::Minute(n) => Duration::minutes(i64::from(*n)),
            Timeframe::Hour(n) => Duration::hours(i64::from(*n)),
            Timeframe::Daily => Duration::days(1),
            Timeframe::Weekly => Duration::weeks(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Second(n) => write!(f, "S{n}"),
            Timeframe::Minute(n) => write!(f, "M{n}"),
            Timeframe::Hour(n) => write!(f, "H{n}"),
            Timeframe::Daily => write!(f, "D1"),
            Timeframe::Weekly => write!(f, "W1"),
        }
    }
}

/// Error returned when a timeframe label cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid timeframe '{0}', expected e.g. S30, M1, H4, D1 or W1")]
pub struct ParseTimeframeError(String);

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    /// Parse the labels produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_uppercase();
        let err = || ParseTimeframeError(s.to_string());
        let unit = label.get(..1).ok_or_else(err)?;
        let n: u32 = label[1..].parse().map_err(|_| err())?;
        if n == 0 {
            return Err(err());
        }
        match (unit, n) {
            ("S", n) => Ok(Timeframe::Second(n)),
            ("M", n) => Ok(Timeframe::Minute(n)),
            ("H", n) => Ok(Timeframe::Hour(n)),
            ("D", 1) => Ok(Timeframe::Daily),
            ("W", 1) => Ok(Timeframe::Weekly),
            _ => Err(err()),
        }
    }
}

/// A closed OHLCV period (bar). Immutable once closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Period {
    /// Select one of the OHLC prices.
    pub fn price(&self, field: PriceField) -> Decimal {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
        }
    }
}

/// Which price of a period feeds an indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
}

/// A single bid/ask quote (exchange rate) as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
}

// ---------------------------------------------------------------------------
// Market Structure
// ---------------------------------------------------------------------------

/// Direction classification of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendType {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendType {
    /// Majority vote between bullish and bearish evidence.
    pub fn from_evidence(bullish: usize, bearish: usize) -> Self {
        if bearish > bullish {
            TrendType::Bearish
        } else if bullish > bearish {
            TrendType::Bullish
        } else {
            TrendType::Neutral
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            TrendType::Bullish => TrendType::Bearish,
            TrendType::Bearish => TrendType::Bullish,
            TrendType::Neutral => TrendType::Neutral,
        }
    }
}

impl fmt::Display for TrendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrendType::Bullish => "bullish",
            TrendType::Bearish => "bearish",
            TrendType::Neutral => "neutral",
        };
        f.write_str(label)
    }
}

/// Direction of a swing point run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingPointKind {
    /// Closes strictly falling.
    Low,
    /// Closes strictly rising.
    High,
}

/// A maximal run of consecutive periods whose closes move strictly in one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub kind: SwingPointKind,
    /// Index in the source slice of the first period of the run.
    pub start: usize,
    /// The periods of the run, oldest to newest. Detection never yields an
    /// empty run, but a hand-built or deserialized point may carry one.
    pub periods: Vec<Period>,
}

impl SwingPoint {
    pub fn new(kind: SwingPointKind, start: usize, periods: Vec<Period>) -> Self {
        Self {
            kind,
            start,
            periods,
        }
    }

    /// The period that closed the run.
    pub fn last_period(&self) -> Option<&Period> {
        self.periods.last()
    }

    /// Close of the period that ended the run.
    pub fn close(&self) -> Option<Decimal> {
        self.last_period().map(|p| p.close)
    }

    /// Source index range covered by the run.
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.periods.len()
    }
}

/// A window of periods whose closes cluster around the window midpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionArea {
    pub periods: Vec<Period>,
    pub average_price: Decimal,
    pub support_price: Decimal,
    pub resistance_price: Decimal,
}

/// A horizontal price band rejected by at least two swing points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionZone {
    pub lower: Decimal,
    pub upper: Decimal,
    pub swing_points: Vec<SwingPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn period(close: Decimal) -> Period {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        Period {
            symbol: "EURUSD".to_string(),
            timeframe: Timeframe::Minute(1),
            start,
            end: start + Timeframe::Minute(1).duration(),
            open: dec!(1),
            high: dec!(3),
            low: dec!(0.5),
            close,
            volume: dec!(100),
        }
    }

    #[test]
    fn test_timeframe_labels_round_trip() {
        for tf in [
            Timeframe::Second(30),
            Timeframe::Minute(1),
            Timeframe::Hour(4),
            Timeframe::Daily,
            Timeframe::Weekly,
        ] {
            assert_eq!(tf.to_string().parse::<Timeframe>(), Ok(tf));
        }
        assert_eq!("m15".parse::<Timeframe>(), Ok(Timeframe::Minute(15)));
        assert!("M0".parse::<Timeframe>().is_err());
        assert!("D2".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_period_price_field() {
        let p = period(dec!(2));
        assert_eq!(p.price(PriceField::Open), dec!(1));
        assert_eq!(p.price(PriceField::High), dec!(3));
        assert_eq!(p.price(PriceField::Low), dec!(0.5));
        assert_eq!(p.price(PriceField::default()), dec!(2));
    }

    #[test]
    fn test_trend_from_evidence() {
        assert_eq!(TrendType::from_evidence(3, 1), TrendType::Bullish);
        assert_eq!(TrendType::from_evidence(1, 3), TrendType::Bearish);
        assert_eq!(TrendType::from_evidence(0, 0), TrendType::Neutral);
        assert_eq!(TrendType::Bullish.opposite(), TrendType::Bearish);
    }

    #[test]
    fn test_swing_point_last_period() {
        let sp = SwingPoint::new(
            SwingPointKind::Low,
            4,
            vec![period(dec!(4)), period(dec!(3))],
        );
        assert_eq!(sp.last_period().map(|p| p.close), Some(dec!(3)));
        assert_eq!(sp.close(), Some(dec!(3)));
        assert_eq!(sp.indices(), 4..6);
    }

    #[test]
    fn test_deserialized_empty_swing_point_has_no_last_period() {
        let sp: SwingPoint =
            serde_json::from_str(r#"{"kind":"high","start":7,"periods":[]}"#).unwrap();
        assert!(sp.last_period().is_none());
        assert_eq!(sp.close(), None);
        assert!(sp.indices().is_empty());
    }

    #[test]
    fn test_timeframe_serde() {
        let json = serde_json::to_string(&Timeframe::Minute(5)).unwrap();
        assert_eq!(json, r#"{"minute":5}"#);
        assert_eq!(Timeframe::Hour(4).to_string(), "H4");
    }
}
