//! # guardiand
//!
//! Entry point for a guardian node.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging and metrics
//! 2. Load node and processor configuration from the environment
//! 3. Abort if the guardian key is missing or any setting is invalid
//! 4. Start the processor and its pumps
//! 5. Run until Ctrl+C or a fatal processor error

use anyhow::{Context, Result};
use guardian_node::{NodeConfig, NodeRuntime};
use guardian_processor::ProcessorConfig;
use guardian_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("Invalid node configuration")?;
    let processor_config = ProcessorConfig::from_env();
    info!(?config, "Loaded node configuration");

    let mut runtime = NodeRuntime::start(config, processor_config)?;

    info!(address = %runtime.address(), "Node is running. Press Ctrl+C to stop.");

    let failure = tokio::select! {
        result = runtime.wait() => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            None
        }
    };

    match failure {
        Some(result) => {
            if let Err(e) = &result {
                error!(error = %format!("{e:#}"), "Guardian node stopped");
            }
            result
        }
        None => runtime.shutdown().await,
    }
}
