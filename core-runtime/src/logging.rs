//! # Logging & Tracing Infrastructure
//!
//! Configures the `tracing-subscriber` stack used by the scanner, the
//! protocol adapters and the run coordinator. Supports:
//! - Pretty, compact and JSON output formats
//! - Module-level filtering via `EnvFilter` (e.g. `core_sync=debug`)
//! - `RUST_LOG` override when no explicit filter is configured
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_filter("core_sync=debug,core_catalog=info");
//! init_logging(config).expect("failed to initialize logging");
//!
//! tracing::info!("scanner ready");
//! ```

use crate::error::{Error, Result};
use tracing_subscriber::filter::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format for machine parsing
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Custom filter string (e.g. "core_sync=debug,core_catalog=trace")
    pub filter: Option<String>,
    /// Display target module in logs
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: None,
            display_target: true,
        }
    }
}

impl LoggingConfig {
    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set a custom filter string
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Control whether the target module is displayed
    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }
}

/// Initialize the global tracing subscriber.
///
/// An explicit `filter` takes precedence; otherwise `RUST_LOG` is honored,
/// falling back to `info`. Returns an error if a subscriber is already
/// installed or the filter string is invalid.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = match &config.filter {
        Some(spec) => EnvFilter::try_new(spec)
            .map_err(|e| Error::Config(format!("invalid log filter '{}': {}", spec, e)))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.display_target);

    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {}", e)))
}
