//! # Guardian Telemetry
//!
//! Logging and metrics bootstrap for the guardian node.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guardian_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Logs are structured and metrics can be rendered via the guard
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GUARDIAN_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `GUARDIAN_JSON_LOGS` | `false` (`true` in containers) | JSON log output |
//! | `GUARDIAN_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `GUARDIAN_SERVICE_NAME` | `guardiand` | Service name |
//! | `GUARDIAN_NETWORK` | `testnet` | Network name |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use metrics::{
    register_metrics, MetricsHandle, GOSSIP_MESSAGES_SENT, GUARDIAN_SET_INDEX, GUARDIAN_SET_SIZE,
    NODE_ERRORS, NODE_START_TIME,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install the global log subscriber and register node metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so anything logged during startup can also be counted
    let metrics = register_metrics()?;

    logging::init_logging(&config)?;

    Ok(TelemetryGuard { metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
