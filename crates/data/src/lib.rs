//! Historical data for the feed collaborators: CSV loading and a replaying
//! account that serves a loaded series as if it were live.

pub mod csv_loader;
pub mod replay;

pub use csv_loader::{
    load_periods_from_csv, load_periods_from_reader, load_ticks_from_csv, load_ticks_from_reader,
};
pub use replay::{ReplayAccount, ReplayConfig};

/// Errors from loading historical data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Data not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
