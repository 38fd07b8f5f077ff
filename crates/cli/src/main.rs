use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tickwise_analysis::{analyze, AnalysisConfig, StructureReport};
use tickwise_core::{MarketEvent, Period, PriceField, Tick, Timeframe};
use tickwise_data::{
    load_periods_from_csv, load_periods_from_reader, load_ticks_from_csv, load_ticks_from_reader,
    ReplayAccount, ReplayConfig,
};
use tickwise_indicators::bollinger::BollingerBands;
use tickwise_indicators::ema::Ema;
use tickwise_indicators::rsi::Rsi;
use tickwise_indicators::sma::Sma;
use tickwise_indicators::stochastic::Stochastic;
use tickwise_indicators::ComputationError;
use tickwise_live::{IndicatorInput, LiveIndicator, LiveSession, UpdateCallback};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "tickwise")]
#[command(about = "Technical indicators and market structure over OHLC series, batch or live")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute an indicator over a CSV period series
    Indicators {
        #[command(flatten)]
        series: SeriesArgs,

        #[command(flatten)]
        indicator: IndicatorArgs,

        /// Only print the newest N values
        #[arg(long)]
        tail: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Detect swing points, trend, congestion and rejection zones
    Structure {
        #[command(flatten)]
        series: SeriesArgs,

        /// Tick CSV for the tick trend
        #[arg(long)]
        ticks: Option<PathBuf>,

        /// TOML file with analysis settings
        #[arg(short, long, env = "TICKWISE_ANALYSIS_CONFIG")]
        config: Option<PathBuf>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Seed a live indicator from history, then replay the rest of the series
    Replay {
        #[command(flatten)]
        series: SeriesArgs,

        #[command(flatten)]
        indicator: IndicatorArgs,

        /// Tick CSV to replay alongside the periods
        #[arg(long)]
        ticks: Option<PathBuf>,

        /// Periods served as history before the replay starts
        #[arg(long, default_value = "100")]
        history: usize,

        /// Delay before each replayed event, in milliseconds
        #[arg(long, default_value = "0")]
        interval_ms: u64,
    },
}

#[derive(Args)]
struct SeriesArgs {
    /// Path to the period CSV file
    #[arg(short, long)]
    data: PathBuf,

    /// Timeframe of the file (S30, M1, H4, D1, W1, ...)
    #[arg(short, long, default_value = "M1")]
    timeframe: Timeframe,

    /// Symbol to assign; defaults to the file name
    #[arg(short, long)]
    symbol: Option<String>,
}

#[derive(Args)]
struct IndicatorArgs {
    /// Indicator to compute
    #[arg(short, long, value_enum, default_value = "sma")]
    indicator: IndicatorKind,

    /// Window length
    #[arg(short = 'n', long, default_value = "14")]
    length: usize,

    /// Band width in standard deviations (bollinger)
    #[arg(long, default_value = "2")]
    multiplier: Decimal,

    /// %K smoothing (stochastic)
    #[arg(long, default_value = "3")]
    k_smoothing: usize,

    /// %D smoothing (stochastic)
    #[arg(long, default_value = "3")]
    d_smoothing: usize,

    /// Price of each period fed to the indicator
    #[arg(long, value_enum, default_value = "close")]
    price: PriceArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Bollinger,
    Stochastic,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriceArg {
    Open,
    High,
    Low,
    Close,
}

impl From<PriceArg> for PriceField {
    fn from(arg: PriceArg) -> Self {
        match arg {
            PriceArg::Open => PriceField::Open,
            PriceArg::High => PriceField::High,
            PriceArg::Low => PriceField::Low,
            PriceArg::Close => PriceField::Close,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Indicators {
            series,
            indicator,
            tail,
            json,
        } => run_indicators(series, indicator, tail, json).await,
        Commands::Structure {
            series,
            ticks,
            config,
            json,
        } => run_structure(series, ticks, config, json),
        Commands::Replay {
            series,
            indicator,
            ticks,
            history,
            interval_ms,
        } => {
            let config = ReplayConfig {
                history,
                interval_ms,
                ..Default::default()
            };
            run_replay(series, indicator, ticks, config).await
        }
    }
}

// ---------------------------------------------------------------------------
// indicators
// ---------------------------------------------------------------------------

async fn run_indicators(
    series: SeriesArgs,
    args: IndicatorArgs,
    tail: Option<usize>,
    json: bool,
) -> Result<()> {
    let periods = load_periods(&series)?;
    info!(
        indicator = ?args.indicator,
        length = args.length,
        periods = periods.len(),
        "Computing indicator"
    );
    let columns = indicator_columns(&periods, &args).await?;

    // Every column ends at the newest period
    let rows = columns.first().map_or(0, |(_, values)| values.len());
    let skip = tail.map_or(0, |n| rows.saturating_sub(n));
    let offset = periods.len() - rows;

    if json {
        let output: Vec<serde_json::Value> = (skip..rows)
            .map(|row| {
                let mut entry = serde_json::Map::new();
                entry.insert(
                    "start".into(),
                    serde_json::json!(periods[offset + row].start),
                );
                for (name, values) in &columns {
                    entry.insert((*name).into(), serde_json::json!(values[row]));
                }
                serde_json::Value::Object(entry)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let header: Vec<String> = columns.iter().map(|(name, _)| format!("{name:>14}")).collect();
    println!("{:<26}{}", "start", header.join(""));
    for row in skip..rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|(_, values)| format!("{:>14}", values[row].round_dp(6)))
            .collect();
        println!(
            "{:<26}{}",
            periods[offset + row].start.format("%Y-%m-%d %H:%M:%S"),
            cells.join("")
        );
    }
    Ok(())
}

/// One column per output line, all ending at the newest period.
async fn indicator_columns(
    periods: &[Period],
    args: &IndicatorArgs,
) -> Result<Vec<(&'static str, Vec<Decimal>)>> {
    let field = PriceField::from(args.price);
    let prices: Vec<Decimal> = periods.iter().map(|p| p.price(field)).collect();

    let columns = match args.indicator {
        IndicatorKind::Sma => vec![(
            "sma",
            tickwise_indicators::moving_average(&prices, args.length).await?,
        )],
        IndicatorKind::Ema => vec![(
            "ema",
            tickwise_indicators::exponential_moving_average(&prices, args.length).await?,
        )],
        IndicatorKind::Rsi => vec![(
            "rsi",
            tickwise_indicators::relative_strength_index(&prices, args.length).await?,
        )],
        IndicatorKind::Bollinger => {
            let bands =
                tickwise_indicators::bollinger_bands(&prices, args.length, args.multiplier)
                    .await?;
            vec![
                ("lower", bands.lower),
                ("middle", bands.middle),
                ("upper", bands.upper),
            ]
        }
        IndicatorKind::Stochastic => {
            let highs: Vec<Decimal> = periods.iter().map(|p| p.high).collect();
            let lows: Vec<Decimal> = periods.iter().map(|p| p.low).collect();
            let closes: Vec<Decimal> = periods.iter().map(|p| p.close).collect();
            let stoch = tickwise_indicators::stochastic_oscillator(
                &highs,
                &lows,
                &closes,
                args.length,
                args.k_smoothing,
                args.d_smoothing,
            )
            .await?;
            vec![("k", stoch.k), ("d", stoch.d)]
        }
    };
    Ok(columns)
}

// ---------------------------------------------------------------------------
// structure
// ---------------------------------------------------------------------------

fn run_structure(
    series: SeriesArgs,
    ticks: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => load_analysis_config(&path)?,
        None => AnalysisConfig::default(),
    };
    let periods = load_periods(&series)?;
    let ticks = match ticks {
        Some(path) => load_ticks(&path, series.symbol.as_deref())?,
        None => Vec::new(),
    };

    let report = analyze(&periods, &ticks, &config);
    info!(
        periods = periods.len(),
        ticks = ticks.len(),
        trend = %report.trend,
        "Structure analysis complete"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn load_analysis_config(path: &Path) -> Result<AnalysisConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = toml::from_str(&text)
        .with_context(|| format!("Invalid analysis config {}", path.display()))?;
    debug!(?config, "Loaded analysis config");
    Ok(config)
}

fn print_report(report: &StructureReport) {
    let sep = "=".repeat(60);
    println!("\n{sep}");
    println!("  MARKET STRUCTURE");
    println!("{sep}");
    println!("  Trend:           {}", report.trend);
    println!("  Tick trend:      {}", report.tick_trend);
    println!("  Low swings:      {}", report.low_swings.len());
    for point in &report.low_swings {
        if let Some(last) = point.last_period() {
            println!("    {} @ {}", last.start.format("%Y-%m-%d %H:%M"), last.close);
        }
    }
    println!("  High swings:     {}", report.high_swings.len());
    for point in &report.high_swings {
        if let Some(last) = point.last_period() {
            println!("    {} @ {}", last.start.format("%Y-%m-%d %H:%M"), last.close);
        }
    }
    match &report.congestion {
        Some(area) => println!(
            "  Congestion:      {} periods, support {} / resistance {} (avg {})",
            area.periods.len(),
            area.support_price,
            area.resistance_price,
            area.average_price.round_dp(6)
        ),
        None => println!("  Congestion:      none"),
    }
    for (label, zones) in [
        ("Support", &report.support_rejections),
        ("Resistance", &report.resistance_rejections),
    ] {
        for zone in zones {
            println!(
                "  {label:<10} zone: {} - {} ({} touches)",
                zone.lower.round_dp(6),
                zone.upper.round_dp(6),
                zone.swing_points.len()
            );
        }
    }
    println!("{sep}\n");
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

async fn run_replay(
    series: SeriesArgs,
    args: IndicatorArgs,
    ticks: Option<PathBuf>,
    config: ReplayConfig,
) -> Result<()> {
    let live = live_indicator(&args)?;
    let periods = load_periods(&series)?;
    let Some(last_start) = periods.last().map(|p| p.start) else {
        bail!("No periods loaded from {}", series.data.display());
    };
    let symbol = periods[0].symbol.clone();
    let ticks = match ticks {
        Some(path) => load_ticks(&path, Some(&symbol))?,
        None => Vec::new(),
    };
    let watch_ticks = !ticks.is_empty();

    let account = ReplayAccount::new(&symbol, series.timeframe, periods, ticks, config);
    let session = LiveSession::new();

    let (tx, mut updates) = mpsc::unbounded_channel();
    let on_update: UpdateCallback = Arc::new(move |event: &MarketEvent| {
        let _ = tx.send(event.clone());
    });

    let input = IndicatorInput::new(&symbol, series.timeframe).with_price(args.price.into());
    session
        .start_live_indicator(&live, &account, input, Some(on_update))
        .await?;

    let prices = if watch_ticks {
        let log_tick: UpdateCallback = Arc::new(|event: &MarketEvent| {
            if let MarketEvent::Tick(tick) = event {
                debug!(symbol = %tick.symbol, bid = %tick.bid, ask = %tick.ask, "Tick");
            }
        });
        Some(
            session
                .start_live_prices(&symbol, &account, Some(log_tick))
                .await?,
        )
    } else {
        None
    };

    while live.watermark() < Some(last_start) {
        tokio::select! {
            update = updates.recv() => match update {
                Some(MarketEvent::PeriodClose(period)) => info!(
                    start = %period.start,
                    close = %period.close,
                    value = ?live.value(),
                    "Period closed"
                ),
                Some(MarketEvent::Tick(_)) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                break;
            }
        }
    }

    session.end_live_indicator(&live).await;
    if let Some(prices) = &prices {
        let [bid, ask] = prices.prices();
        info!(%bid, %ask, "Last quote");
        session.end_live_prices(prices).await;
    }
    session.shutdown().await;

    let sep = "=".repeat(60);
    println!("\n{sep}");
    println!("  REPLAY");
    println!("{sep}");
    println!("  Symbol:          {symbol} {}", series.timeframe);
    println!("  Indicator:       {:?}({})", args.indicator, args.length);
    println!("  Periods folded:  {}", live.folded());
    match live.value() {
        Some(value) => println!("  Last value:      {}", value.round_dp(6)),
        None => println!("  Last value:      not ready"),
    }
    println!("{sep}\n");
    Ok(())
}

/// Build the streaming indicator, rejecting windows the batch path would also refuse.
fn live_indicator(args: &IndicatorArgs) -> Result<LiveIndicator, ComputationError> {
    Ok(match args.indicator {
        IndicatorKind::Sma => LiveIndicator::new(Sma::try_new(args.length)?),
        IndicatorKind::Ema => LiveIndicator::new(Ema::try_new(args.length)?),
        IndicatorKind::Rsi => LiveIndicator::new(Rsi::try_new(args.length)?),
        IndicatorKind::Bollinger => {
            LiveIndicator::new(BollingerBands::try_new(args.length, args.multiplier)?)
        }
        IndicatorKind::Stochastic => LiveIndicator::new(Stochastic::try_new(
            args.length,
            args.k_smoothing,
            args.d_smoothing,
        )?),
    })
}

// ---------------------------------------------------------------------------
// loading
// ---------------------------------------------------------------------------

fn load_periods(series: &SeriesArgs) -> Result<Vec<Period>> {
    let periods = match &series.symbol {
        Some(symbol) => {
            let file = File::open(&series.data)
                .with_context(|| format!("Failed to open {}", series.data.display()))?;
            load_periods_from_reader(file, symbol, series.timeframe)?
        }
        None => load_periods_from_csv(&series.data, series.timeframe)?,
    };
    info!(
        data = %series.data.display(),
        timeframe = %series.timeframe,
        periods = periods.len(),
        "Loaded periods"
    );
    Ok(periods)
}

fn load_ticks(path: &Path, symbol: Option<&str>) -> Result<Vec<Tick>> {
    let ticks = match symbol {
        Some(symbol) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            load_ticks_from_reader(file, symbol)?
        }
        None => load_ticks_from_csv(path)?,
    };
    info!(data = %path.display(), ticks = ticks.len(), "Loaded ticks");
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicator_args(argv: &[&str]) -> IndicatorArgs {
        let mut full = vec!["tickwise", "replay", "-d", "EURUSD.csv"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Replay { indicator, .. } => indicator,
            _ => unreachable!(),
        }
    }

    fn series(len: i64) -> Vec<Period> {
        let start = chrono::DateTime::from_timestamp(1_704_186_000, 0).unwrap();
        let timeframe = Timeframe::Minute(1);
        (0..len)
            .map(|i| {
                let close = Decimal::from(100 + (i % 5) * 2 - i % 3);
                let start = start + timeframe.duration() * i as i32;
                Period {
                    symbol: "EURUSD".to_string(),
                    timeframe,
                    start,
                    end: start + timeframe.duration(),
                    open: close,
                    high: close + Decimal::ONE,
                    low: close - Decimal::ONE,
                    close,
                    volume: Decimal::ZERO,
                }
            })
            .collect()
    }

    #[test]
    fn test_zero_windows_are_rejected_for_replay() {
        for argv in [
            &["-n", "0"][..],
            &["-i", "ema", "-n", "0"][..],
            &["-i", "rsi", "-n", "0"][..],
            &["-i", "bollinger", "-n", "0"][..],
            &["-i", "stochastic", "-n", "2", "--k-smoothing", "0"][..],
            &["-i", "stochastic", "-n", "2", "--d-smoothing", "0"][..],
        ] {
            let err = live_indicator(&indicator_args(argv)).unwrap_err();
            assert!(
                matches!(err, ComputationError::InvalidWindow { length: 0, .. }),
                "{argv:?}: {err}"
            );
        }
    }

    #[test]
    fn test_negative_multiplier_is_rejected_for_replay() {
        let args = indicator_args(&["-i", "bollinger", "--multiplier=-1"]);
        assert!(matches!(
            live_indicator(&args),
            Err(ComputationError::InvalidMultiplier(_))
        ));
    }

    #[test]
    fn test_valid_args_build_live_indicator() {
        let args = indicator_args(&["-i", "stochastic", "-n", "5"]);
        let live = live_indicator(&args).unwrap();
        assert!(!live.is_ready());
        assert!(live.input().is_none());
    }

    #[tokio::test]
    async fn test_stochastic_columns_share_length() {
        let periods = series(30);
        let args = indicator_args(&["-i", "stochastic", "-n", "5"]);
        let columns = indicator_columns(&periods, &args).await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].0, "k");
        assert_eq!(columns[1].0, "d");
        // warmup 5 + 3 + 3 - 2
        assert_eq!(columns[0].1.len(), 30 - 9 + 1);
        assert_eq!(columns[0].1.len(), columns[1].1.len());
    }
}
