use crate::DataError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tickwise_core::{Period, Tick, Timeframe};
use tracing::debug;

/// Load closed periods from a CSV file. The symbol is the file stem.
///
/// Expected columns (case-insensitive, any order):
/// `timestamp` (or `date`, `datetime`, `time`), `open`, `high`, `low`, `close`
/// and an optional `volume`. The timestamp is the period start.
pub fn load_periods_from_csv(path: &Path, timeframe: Timeframe) -> Result<Vec<Period>, DataError> {
    let symbol = symbol_from_path(path, "")?;
    let file = open(path)?;
    load_periods_from_reader(file, &symbol, timeframe)
}

/// Load closed periods from any CSV source, sorted by start time.
pub fn load_periods_from_reader<R: io::Read>(
    reader: R,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Vec<Period>, DataError> {
    let mut reader = csv_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();
    let columns = resolve_period_columns(&headers)?;

    let mut periods = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| DataError::ParseError(format!("CSV record error: {}", e)))?;

        let start = parse_timestamp(field(&record, columns.timestamp)?)?;
        let volume = match columns.volume {
            Some(idx) => parse_decimal(field(&record, idx)?, "volume")?,
            None => Decimal::ZERO,
        };

        periods.push(Period {
            symbol: symbol.to_string(),
            timeframe,
            start,
            end: start + timeframe.duration(),
            open: parse_decimal(field(&record, columns.open)?, "open")?,
            high: parse_decimal(field(&record, columns.high)?, "high")?,
            low: parse_decimal(field(&record, columns.low)?, "low")?,
            close: parse_decimal(field(&record, columns.close)?, "close")?,
            volume,
        });
    }

    periods.sort_by_key(|p| p.start);
    debug!(symbol, %timeframe, periods = periods.len(), "Loaded periods");
    Ok(periods)
}

/// Load ticks from a CSV file named `<SYMBOL>_ticks.csv` or `<SYMBOL>.csv`.
///
/// Expected columns: `timestamp`, `bid`, `ask`.
pub fn load_ticks_from_csv(path: &Path) -> Result<Vec<Tick>, DataError> {
    let symbol = symbol_from_path(path, "_ticks")?;
    let file = open(path)?;
    load_ticks_from_reader(file, &symbol)
}

/// Load ticks from any CSV source, sorted by timestamp.
pub fn load_ticks_from_reader<R: io::Read>(reader: R, symbol: &str) -> Result<Vec<Tick>, DataError> {
    let mut reader = csv_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();

    let ts_col = require_column(&headers, &["timestamp", "date", "datetime", "time"])?;
    let bid_col = require_column(&headers, &["bid"])?;
    let ask_col = require_column(&headers, &["ask"])?;

    let mut ticks = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| DataError::ParseError(format!("CSV record error: {}", e)))?;
        ticks.push(Tick {
            symbol: symbol.to_string(),
            timestamp: parse_timestamp(field(&record, ts_col)?)?,
            bid: parse_decimal(field(&record, bid_col)?, "bid")?,
            ask: parse_decimal(field(&record, ask_col)?, "ask")?,
        });
    }

    ticks.sort_by_key(|t| t.timestamp);
    debug!(symbol, ticks = ticks.len(), "Loaded ticks");
    Ok(ticks)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct PeriodColumns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

fn resolve_period_columns(headers: &csv::StringRecord) -> Result<PeriodColumns, DataError> {
    Ok(PeriodColumns {
        timestamp: require_column(headers, &["timestamp", "date", "datetime", "time"])?,
        open: require_column(headers, &["open", "o"])?,
        high: require_column(headers, &["high", "h"])?,
        low: require_column(headers, &["low", "l"])?,
        close: require_column(headers, &["close", "c"])?,
        volume: find_column(headers, &["volume", "vol", "v"]),
    })
}

fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn open(path: &Path) -> Result<std::fs::File, DataError> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            DataError::NotFound(format!("CSV file not found: {}", path.display()))
        }
        _ => DataError::IoError(e),
    })
}

fn symbol_from_path(path: &Path, suffix: &str) -> Result<String, DataError> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| DataError::ParseError(format!("No file name in {}", path.display())))?;
    Ok(stem.strip_suffix(suffix).unwrap_or(&stem).to_uppercase())
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|header| names.contains(&header.trim().to_lowercase().as_str()))
}

fn require_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize, DataError> {
    find_column(headers, names)
        .ok_or_else(|| DataError::ParseError(format!("No {} column found", names[0])))
}

fn field(record: &csv::StringRecord, idx: usize) -> Result<&str, DataError> {
    record.get(idx).ok_or_else(|| {
        DataError::ParseError(format!(
            "Missing column {} on line {}",
            idx,
            record.position().map_or(0, |p| p.line())
        ))
    })
}

fn parse_decimal(s: &str, field: &str) -> Result<Decimal, DataError> {
    Decimal::from_str(s.trim())
        .map_err(|e| DataError::ParseError(format!("Failed to parse {} '{}': {}", field, s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DataError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Without an offset, assume UTC
    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y.%m.%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%Y%m%d %H:%M:%S",
    ];
    for fmt in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    // Unix seconds
    if let Some(dt) = s.parse::<i64>().ok().and_then(|ts| DateTime::from_timestamp(ts, 0)) {
        return Ok(dt);
    }

    Err(DataError::ParseError(format!(
        "Unable to parse timestamp: '{}'",
        s
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const PERIODS: &str = "\
Date,Open,High,Low,Close,Volume
2024-01-02 09:01:00,1.1010,1.1020,1.1005,1.1015,120
2024-01-02 09:00:00,1.1000,1.1012,1.0998,1.1010,80
";

    #[test]
    fn test_periods_are_sorted_and_stamped() {
        let periods =
            load_periods_from_reader(PERIODS.as_bytes(), "EURUSD", Timeframe::Minute(1)).unwrap();
        assert_eq!(periods.len(), 2);
        assert_eq!(
            periods[0].start,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
        assert_eq!(
            periods[0].end,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 1, 0).unwrap()
        );
        assert_eq!(periods[0].close, dec!(1.1010));
        assert_eq!(periods[1].volume, dec!(120));
        assert_eq!(periods[1].symbol, "EURUSD");
    }

    #[test]
    fn test_volume_is_optional() {
        let csv = "time,o,h,l,c\n1704186000,1,2,0.5,1.5\n";
        let periods = load_periods_from_reader(csv.as_bytes(), "X", Timeframe::Hour(1)).unwrap();
        assert_eq!(periods[0].volume, Decimal::ZERO);
        assert_eq!(
            periods[0].start,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_column_is_a_parse_error() {
        let csv = "timestamp,open,high,low\n2024-01-02,1,2,0,\n";
        let err = load_periods_from_reader(csv.as_bytes(), "X", Timeframe::Daily).unwrap_err();
        assert!(matches!(err, DataError::ParseError(msg) if msg.contains("close")));
    }

    #[test]
    fn test_bad_number_is_a_parse_error() {
        let csv = "timestamp,open,high,low,close\n2024-01-02,1,2,0,abc\n";
        let err = load_periods_from_reader(csv.as_bytes(), "X", Timeframe::Daily).unwrap_err();
        assert!(matches!(err, DataError::ParseError(msg) if msg.contains("close")));
    }

    #[test]
    fn test_ticks_from_reader() {
        let csv = "timestamp,bid,ask\n2024-01-02T09:00:01Z,1.1000,1.1002\n2024-01-02T09:00:00Z,1.0999,1.1001\n";
        let ticks = load_ticks_from_reader(csv.as_bytes(), "EURUSD").unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].bid, dec!(1.0999));
        assert_eq!(ticks[1].ask, dec!(1.1002));
        assert_eq!(ticks[1].symbol, "EURUSD");
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
        for s in [
            "2024-01-02 09:30:00",
            "2024-01-02T09:30:00",
            "2024-01-02T09:30:00+00:00",
            "2024.01.02 09:30",
            "01/02/2024 09:30",
        ] {
            assert_eq!(parse_timestamp(s).unwrap(), expected, "{s}");
        }
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load_periods_from_csv(Path::new("/nonexistent/eurusd.csv"), Timeframe::Daily)
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
        assert_eq!(
            symbol_from_path(Path::new("data/eurusd_ticks.csv"), "_ticks").unwrap(),
            "EURUSD"
        );
    }
}
