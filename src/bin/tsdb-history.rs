//! tsdb-history command line tool
//!
//! # Commands
//!
//! - `check-config <file>` - validate a TOML configuration file
//! - `replay <csv> --series NAME` - load `timestamp_secs,value` lines into an
//!   in-memory source and print the bucketed history as JSON
//!
//! # Example Usage
//!
//! ```bash
//! tsdb-history check-config /etc/tsdb-history.toml
//!
//! tsdb-history replay temps.csv --series temp --bucket-size 3600 --fn min --fn max
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use tsdb_history::{
    types::MILLIS_PER_SECOND, AggregateFunction, Config, HistoryQuery, InMemorySampleSource,
    Sample, SeriesEngineBuilder, SeriesInfo, Timestamp, ValueFormat,
};

// =============================================================================
// CLI Definition
// =============================================================================

/// Bucketed history queries over time series
#[derive(Parser)]
#[command(name = "tsdb-history")]
#[command(version)]
#[command(about = "Bucketed history queries over time series", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides TSDB_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    CheckConfig {
        /// TOML file to check
        file: PathBuf,
    },

    /// Replay a CSV file through the engine and print the history
    Replay {
        /// CSV file of `timestamp_secs,value` lines
        csv: PathBuf,

        /// Series name
        #[arg(short, long)]
        series: String,

        /// Value format (int, float, raw, decimal, decimal:<precision>)
        #[arg(long, default_value = "float")]
        format: ValueFormat,

        /// Range start in seconds
        #[arg(long)]
        from: Option<i64>,

        /// Range end in seconds
        #[arg(long)]
        to: Option<i64>,

        /// Bucket width in seconds
        #[arg(long, conflicts_with = "num_buckets")]
        bucket_size: Option<i64>,

        /// Number of buckets
        #[arg(long)]
        num_buckets: Option<i64>,

        /// Aggregation function, repeatable
        #[arg(long = "fn")]
        functions: Vec<AggregateFunction>,
    },
}

// =============================================================================
// Command Handlers
// =============================================================================

fn load_config(path: Option<&Path>) -> tsdb_history::Result<Config> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("TSDB_CONFIG").map(PathBuf::from));
    match path {
        Some(p) => Config::from_file_with_env(p),
        None => Ok(Config::from_env()),
    }
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_check_config(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file_with_env(file)?;
    config.validate()?;

    println!("Configuration is valid!");
    println!();
    println!("Cache Settings:");
    println!("  Backend: {:?}", config.cache.backend);
    println!("  TTL: {}s", config.cache.ttl_secs);
    println!("  Max entries: {}", config.cache.max_entries);
    println!("  Invalidation: {:?}", config.cache.invalidation);
    println!();
    println!("History Settings:");
    println!("  Default function: {}", config.history.default_function);
    println!("  Max buckets: {}", config.history.max_buckets);
    println!(
        "  Bucket table: {}",
        if config.history.bucket_table.is_some() { "custom" } else { "default" }
    );
    Ok(())
}

/// Parse `timestamp_secs,value` lines, blank lines and `#` comments skipped
fn parse_csv(contents: &str) -> Result<Vec<Sample>, String> {
    let mut samples = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (ts, value) = line
            .split_once(',')
            .ok_or_else(|| format!("line {}: expected 'timestamp_secs,value'", n + 1))?;
        let secs: f64 = ts
            .trim()
            .parse()
            .map_err(|e| format!("line {}: bad timestamp '{}': {}", n + 1, ts.trim(), e))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|e| format!("line {}: bad value '{}': {}", n + 1, value.trim(), e))?;
        let timestamp = (secs * MILLIS_PER_SECOND as f64).round() as Timestamp;
        samples.push(Sample::new(timestamp, value));
    }
    Ok(samples)
}

#[allow(clippy::too_many_arguments)]
/// Convert an optional `--from`/`--to` value in seconds to milliseconds
fn secs_to_millis(flag: &str, secs: Option<i64>) -> Result<Option<Timestamp>, String> {
    secs.map(|s| {
        s.checked_mul(MILLIS_PER_SECOND)
            .ok_or_else(|| format!("--{} {} seconds is out of range", flag, s))
    })
    .transpose()
}

async fn cmd_replay(
    config: Config,
    csv: &Path,
    series: &str,
    format: ValueFormat,
    from: Option<i64>,
    to: Option<i64>,
    bucket_size: Option<i64>,
    num_buckets: Option<i64>,
    functions: Vec<AggregateFunction>,
) -> Result<(), Box<dyn std::error::Error>> {
    let from = secs_to_millis("from", from)?;
    let to = secs_to_millis("to", to)?;

    let contents = std::fs::read_to_string(csv)
        .map_err(|e| format!("Failed to read {}: {}", csv.display(), e))?;
    let samples = parse_csv(&contents)?;

    let source = Arc::new(InMemorySampleSource::new());
    source.create_series(SeriesInfo::new(series).with_format(format))?;
    let loaded = source.load(series, samples)?;
    info!(series, loaded, "Samples loaded");

    let functions = if functions.is_empty() {
        vec![config.history.default_function]
    } else {
        functions
    };

    let engine = SeriesEngineBuilder::new()
        .with_source_arc(source)
        .with_config(config)
        .build()
        .await?;

    let mut query = HistoryQuery::new(series).functions(functions);
    query.from = from;
    query.to = to;
    query.bucket_size = bucket_size;
    query.num_buckets = num_buckets;

    let rows = engine.history(&query).await?;
    debug!(rows = rows.len(), stats = ?engine.stats(), "History computed");

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { file } => cmd_check_config(&file),
        Commands::Replay {
            csv,
            series,
            format,
            from,
            to,
            bucket_size,
            num_buckets,
            functions,
        } => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(&config);
            cmd_replay(
                config,
                &csv,
                &series,
                format,
                from,
                to,
                bucket_size,
                num_buckets,
                functions,
            )
            .await
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        let samples = parse_csv("# ts,value\n0,10\n60, 12\n\n120.5,14\n").unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1], Sample::new(60_000, 12.0));
        assert_eq!(samples[2].timestamp, 120_500);
    }

    #[test]
    fn test_parse_csv_reports_line() {
        let err = parse_csv("0,1\nnope\n").unwrap_err();
        assert!(err.starts_with("line 2"));
    }

    #[test]
    fn test_secs_to_millis_rejects_overflow() {
        assert_eq!(secs_to_millis("from", None), Ok(None));
        assert_eq!(secs_to_millis("from", Some(-90)), Ok(Some(-90_000)));

        let err = secs_to_millis("to", Some(i64::MAX / 100)).unwrap_err();
        assert!(err.starts_with("--to"));
    }

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "tsdb-history", "replay", "data.csv", "--series", "temp", "--format", "decimal:2",
            "--bucket-size", "120", "--fn", "first", "--fn", "avg",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay { format, functions, bucket_size, .. } => {
                assert_eq!(format, ValueFormat::Decimal { precision: 2 });
                assert_eq!(functions, vec![AggregateFunction::First, AggregateFunction::Mean]);
                assert_eq!(bucket_size, Some(120));
            },
            _ => panic!("expected replay"),
        }
    }
}
