//! Logging setup shared by the Mediacast tools
//!
//! Everything is written to stderr; stdout is reserved for tool output
//! (published job ids, engagement events as JSON lines).
//!
//! ```no_run
//! use libmediacast::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "debug").init();
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const FORMAT_ENV: &str = "MEDIACAST_LOG_FORMAT";
pub const LEVEL_ENV: &str = "MEDIACAST_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain lines, no colors
    #[default]
    Text,
    /// One JSON object per event, fields flattened
    Json,
    /// Multi-line colored output for local debugging
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [LogFormat::Text, LogFormat::Json, LogFormat::Pretty]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown log format '{}' (expected text, json or pretty)", s))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
        }
    }

    /// Read `MEDIACAST_LOG_FORMAT` and `MEDIACAST_LOG_LEVEL`, defaulting to
    /// text at info. `verbose` raises the level to debug.
    pub fn from_env(verbose: bool) -> Self {
        let format = std::env::var(FORMAT_ENV)
            .ok()
            .and_then(|raw| match raw.parse() {
                Ok(format) => Some(format),
                Err(e) => {
                    eprintln!("ignoring {}: {}", FORMAT_ENV, e);
                    None
                }
            })
            .unwrap_or_default();

        let level = if verbose {
            "debug".to_string()
        } else {
            std::env::var(LEVEL_ENV).unwrap_or_else(|_| "info".to_string())
        };

        Self::new(format, level)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Install the global subscriber. Later calls leave the first one in place.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Text => builder.with_target(false).with_ansi(false).try_init(),
            LogFormat::Json => builder.json().flatten_event(true).try_init(),
            LogFormat::Pretty => builder.pretty().with_line_number(true).try_init(),
        };

        if let Err(e) = installed {
            eprintln!("logging already initialized: {}", e);
        }
    }
}

/// Logging for the command-line tools: environment settings plus `--verbose`.
pub fn init_default(verbose: bool) {
    LoggingConfig::from_env(verbose).init();
}
