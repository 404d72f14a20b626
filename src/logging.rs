//! Diagnostic logging for the engine, written to stderr.

use anyhow::{Context, Result, anyhow};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

/// Level used when none is given on the command line.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

/// Parse a level name such as `warn` or `DEBUG`.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    name.parse()
        .map_err(|_| anyhow!("unknown log level `{name}'"))
}

/// Install a stderr logger at `level`. Fails if a logger is already set.
pub fn init(level: LevelFilter) -> Result<()> {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    WriteLogger::init(level, config, std::io::stderr()).context("installing logger")
}
