//! Prometheus metrics for the guardian node process.
//!
//! Processor metrics register themselves with the prometheus default
//! registry; this module owns the node-level metrics and renders both.
//!
//! All metrics follow the naming convention: `guardian_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Node-level metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Unix time the process started
    pub static ref NODE_START_TIME: Gauge = Gauge::new(
        "guardian_node_start_time_seconds",
        "Unix time the guardian node started"
    ).expect("metric creation failed");

    /// Index of the active guardian set
    pub static ref GUARDIAN_SET_INDEX: IntGauge = IntGauge::new(
        "guardian_set_index",
        "Index of the active guardian set"
    ).expect("metric creation failed");

    /// Size of the active guardian set
    pub static ref GUARDIAN_SET_SIZE: IntGauge = IntGauge::new(
        "guardian_set_size",
        "Number of guardians in the active guardian set"
    ).expect("metric creation failed");

    /// Gossip messages leaving the node
    pub static ref GOSSIP_MESSAGES_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("guardian_gossip_messages_sent_total", "Gossip messages sent"),
        &["kind"]  // kind: signed_observation/signed_vaa
    ).expect("metric creation failed");

    /// Errors by component and type
    pub static ref NODE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("guardian_node_errors_total", "Errors by component and type"),
        &["component", "error_type"]
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    /// Render node and processor metrics in the Prometheus text format.
    pub fn gather(&self) -> Result<String, TelemetryError> {
        let mut families = self.registry.gather();
        families.extend(prometheus::gather());

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Register node metrics with [`REGISTRY`]. Calling it again is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(NODE_START_TIME.clone()),
        Box::new(GUARDIAN_SET_INDEX.clone()),
        Box::new(GUARDIAN_SET_SIZE.clone()),
        Box::new(GOSSIP_MESSAGES_SENT.clone()),
        Box::new(NODE_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: REGISTRY.clone(),
    })
}
