//! Log subscriber for the resultflow binaries.

use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::LogLevel;

/// Install the global subscriber on stderr; stdout carries rows.
///
/// `RUST_LOG` directives, when set, take precedence over `level`.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let directives = std::env::var("RUST_LOG").ok();
    let filter = build_filter(level, directives.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}

fn build_filter(level: LogLevel, directives: Option<&str>) -> Result<EnvFilter> {
    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| anyhow!("invalid RUST_LOG '{}': {}", directives, e)),
        None => {
            let level: Level = level.into();
            Ok(EnvFilter::default().add_directive(LevelFilter::from(level).into()))
        }
    }
}
