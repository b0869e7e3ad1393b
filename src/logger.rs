//! Diagnostics on standard error
//!
//! Standard output carries extracted content only, so every log line goes
//! to stderr. The level comes from the `-v` count alone.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<u8> for Verbosity {
    fn from(v: u8) -> Self {
        match v {
            0 => Verbosity::Warn,
            1 => Verbosity::Info,
            2 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }
}

impl From<Verbosity> for Level {
    fn from(v: Verbosity) -> Self {
        match v {
            Verbosity::Warn => Level::WARN,
            Verbosity::Info => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }
}

/// Install the global stderr subscriber. Only the first call has an effect.
pub fn init(verbosity: Verbosity) {
    let level: Level = verbosity.into();
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy("");

    let _ = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
