//! # Processor Metrics
//!
//! Prometheus metrics for observation aggregation.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! guardian-processor = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `guardian_observations_received_total` - Signed observations received from peers
//! - `guardian_observations_failed_total` - Signed observations dropped, by `cause`
//! - `guardian_observations_by_guardian_total` - Verified observations, by `guardian`
//! - `guardian_messages_signed_total` - Messages signed by this node, by `emitter_chain`
//! - `guardian_quorum_reached_total` - VAAs persisted, by `source` (`local`, `gossip`)
//! - `guardian_aggregation_states_removed_total` - Cleanup deletions, by `reason`
//! - `guardian_reobservation_requests_total` - Re-observation requests sent
//! - `guardian_integrity_alarms_total` - Governance emitter seen in a local observation
//! - `guardian_signed_observation_delay_seconds` - Time from receipt to lane processing

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref OBSERVATIONS_RECEIVED: IntCounter = register_int_counter!(
        "guardian_observations_received_total",
        "Total number of signed observations received from peers"
    )
    .expect("Failed to create OBSERVATIONS_RECEIVED metric");

    pub static ref OBSERVATIONS_FAILED: IntCounterVec = register_int_counter_vec!(
        "guardian_observations_failed_total",
        "Total number of signed observations dropped",
        &["cause"]
    )
    .expect("Failed to create OBSERVATIONS_FAILED metric");

    pub static ref OBSERVATIONS_BY_GUARDIAN: IntCounterVec = register_int_counter_vec!(
        "guardian_observations_by_guardian_total",
        "Total number of verified observations per guardian",
        &["guardian"]
    )
    .expect("Failed to create OBSERVATIONS_BY_GUARDIAN metric");

    pub static ref MESSAGES_SIGNED: IntCounterVec = register_int_counter_vec!(
        "guardian_messages_signed_total",
        "Total number of messages signed by this guardian",
        &["emitter_chain"]
    )
    .expect("Failed to create MESSAGES_SIGNED metric");

    pub static ref QUORUM_REACHED: IntCounterVec = register_int_counter_vec!(
        "guardian_quorum_reached_total",
        "Total number of VAAs persisted",
        &["source"]
    )
    .expect("Failed to create QUORUM_REACHED metric");

    pub static ref STATES_REMOVED: IntCounterVec = register_int_counter_vec!(
        "guardian_aggregation_states_removed_total",
        "Total number of aggregation states removed by the cleanup sweep",
        &["reason"]
    )
    .expect("Failed to create STATES_REMOVED metric");

    pub static ref REOBSERVATION_REQUESTS: IntCounter = register_int_counter!(
        "guardian_reobservation_requests_total",
        "Total number of re-observation requests sent to watchers"
    )
    .expect("Failed to create REOBSERVATION_REQUESTS metric");

    pub static ref INTEGRITY_ALARMS: IntCounter = register_int_counter!(
        "guardian_integrity_alarms_total",
        "Local observations carrying the governance emitter"
    )
    .expect("Failed to create INTEGRITY_ALARMS metric");

    pub static ref SIGNED_OBSERVATION_DELAY: Histogram = register_histogram!(
        "guardian_signed_observation_delay_seconds",
        "Time a signed observation spent queued before lane processing",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("Failed to create SIGNED_OBSERVATION_DELAY metric");
}

#[cfg(feature = "metrics")]
pub fn record_observation_received() {
    OBSERVATIONS_RECEIVED.inc();
}

/// Record a dropped observation with its failure cause
#[cfg(feature = "metrics")]
pub fn record_observation_failed(cause: &str) {
    OBSERVATIONS_FAILED.with_label_values(&[cause]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_observation_by_guardian(guardian: &str) {
    OBSERVATIONS_BY_GUARDIAN.with_label_values(&[guardian]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_message_signed(emitter_chain: &str) {
    MESSAGES_SIGNED.with_label_values(&[emitter_chain]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_quorum_reached(source: &str) {
    QUORUM_REACHED.with_label_values(&[source]).inc();
}

/// Record a cleanup deletion (`late`, `completed`, `timed_out`, `unobserved`)
#[cfg(feature = "metrics")]
pub fn record_state_removed(reason: &str) {
    STATES_REMOVED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_reobservation_request() {
    REOBSERVATION_REQUESTS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_integrity_alarm() {
    INTEGRITY_ALARMS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_signed_observation_delay(seconds: f64) {
    SIGNED_OBSERVATION_DELAY.observe(seconds);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_observation_received() {}

#[cfg(not(feature = "metrics"))]
pub fn record_observation_failed(_cause: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_observation_by_guardian(_guardian: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_message_signed(_emitter_chain: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_quorum_reached(_source: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_state_removed(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_reobservation_request() {}

#[cfg(not(feature = "metrics"))]
pub fn record_integrity_alarm() {}

#[cfg(not(feature = "metrics"))]
pub fn record_signed_observation_delay(_seconds: f64) {}
