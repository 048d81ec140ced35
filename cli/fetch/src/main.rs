//! rf-fetch CLI
//!
//! Downloads a chunked query result with bounded prefetch and prints it.

use clap::Parser;
use rf_cli_common::{format_bytes, format_duration, format_number, init_logging};

mod args;
mod run;

use args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    init_logging(args.log_level)?;

    let summary = run::execute(args).await?;

    eprintln!();
    eprintln!("Fetch completed:");
    eprintln!(
        "  Chunks:          {} of {}",
        summary.chunks_delivered, summary.chunks_total
    );
    eprintln!("  Rows written:    {}", format_number(summary.rows_written));
    eprintln!(
        "  Bytes in arenas: {}",
        format_bytes(summary.stats.bytes_materialized)
    );
    eprintln!("  Peak in flight:  {}", summary.stats.peak_in_flight);
    eprintln!("  Duration:        {}", format_duration(summary.duration));

    if let Some(failure) = summary.failure {
        eprintln!("  Failed:          {}", failure);
        std::process::exit(4);
    }

    Ok(())
}
