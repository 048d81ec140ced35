//! CLI argument definitions for rf-fetch.

use clap::{Parser, ValueEnum};
use rf_arena::OverflowPolicy;
pub use rf_cli_common::LogLevel;
use std::path::PathBuf;
use std::time::Duration;

/// Download every chunk of a result set and print its rows as TSV.
///
/// The manifest is a JSON document listing the chunk descriptors and the
/// headers shared by every chunk request:
///
///   {"headers": {"x-amz-server-side-encryption-customer-key": "..."},
///    "chunks": [{"index": 0, "rowCount": 2, "colCount": 3, "locator": "https://..."}]}
///
/// ## Examples
///
///   rf-fetch --manifest result.json > rows.tsv
///
///   rf-fetch -m result.json -w 8 -H "Authorization: Bearer abc" -l debug
#[derive(Parser, Debug)]
#[command(name = "rf-fetch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the chunk manifest (JSON)
    #[arg(short = 'm', long)]
    pub manifest: PathBuf,

    /// Maximum concurrent chunk downloads (must be >= 1)
    #[arg(
        short = 'w',
        long,
        env = "RF_PREFETCH_WIDTH",
        default_value = "4",
        value_parser = parse_positive_usize
    )]
    pub prefetch_width: usize,

    /// Extra request header as "Name: value" (repeatable, overrides the manifest)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// What to do when a chunk outgrows its size estimate
    #[arg(long, value_enum, default_value = "fail")]
    pub overflow: OverflowArg,

    /// Connect timeout, e.g. "10s" or "500ms"
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub connect_timeout: Duration,

    /// Skip row output and only print the summary
    #[arg(long)]
    pub quiet: bool,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

/// Overflow policy argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OverflowArg {
    /// Fail the chunk with an overflow error
    Fail,
    /// Rent more blocks and keep going
    Grow,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::Fail => OverflowPolicy::Fail,
            OverflowArg::Grow => OverflowPolicy::Grow,
        }
    }
}

/// Parse a positive usize (>= 1).
fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value < 1 {
        return Err(format!("{} is not in 1..", value));
    }
    Ok(value)
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    rf_types::ChunkHeaders::parse_pair(s)
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| format!("'{}': {}", s, e))
}
