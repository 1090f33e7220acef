//! Processor tuning parameters.

use super::errors::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Timeouts, lane counts and queue sizes for the processor.
///
/// The timeouts must keep their relative order:
/// `settlement_time < first_retry_min_wait <= retry_interval <
/// unobserved_timeout < quorum_timeout`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessorConfig {
    /// Grace period before an unsubmitted entry whose VAA is already stored
    /// counts as late
    pub settlement_time: Duration,
    pub first_retry_min_wait: Duration,
    pub retry_interval: Duration,
    /// Lifetime of an entry we never observed ourselves
    pub unobserved_timeout: Duration,
    /// Lifetime of an entry we observed but never saw reach quorum
    pub quorum_timeout: Duration,
    pub cleanup_interval: Duration,
    pub governor_interval: Duration,
    pub pythnet_vaa_ttl: Duration,
    pub num_priority_lanes: usize,
    pub num_total_lanes: usize,
    /// Intake workers per CPU. Zero means a single worker.
    pub worker_factor: f64,
    pub intake_queue_capacity: usize,
    pub lane_queue_capacity: usize,
    pub leader_filtering: bool,
    /// Log integrity alarms at warn instead of error
    pub downgrade_integrity_alarms: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            settlement_time: Duration::from_secs(30),
            first_retry_min_wait: Duration::from_secs(5 * 60),
            retry_interval: Duration::from_secs(5 * 60),
            unobserved_timeout: Duration::from_secs(60 * 60),
            quorum_timeout: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(30),
            governor_interval: Duration::from_secs(60),
            pythnet_vaa_ttl: Duration::from_secs(60 * 60),
            num_priority_lanes: 2,
            num_total_lanes: 8,
            worker_factor: 1.0,
            intake_queue_capacity: 1024,
            lane_queue_capacity: 512,
            leader_filtering: false,
            downgrade_integrity_alarms: false,
        }
    }
}

impl ProcessorConfig {
    /// Defaults overridden from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `GUARDIAN_SETTLEMENT_SECS`
    /// - `GUARDIAN_RETRY_WAIT_SECS`
    /// - `GUARDIAN_RETRY_INTERVAL_SECS`
    /// - `GUARDIAN_UNOBSERVED_TIMEOUT_SECS`
    /// - `GUARDIAN_QUORUM_TIMEOUT_SECS`
    /// - `GUARDIAN_CLEANUP_INTERVAL_SECS`
    /// - `GUARDIAN_PRIORITY_LANES` / `GUARDIAN_TOTAL_LANES`
    /// - `GUARDIAN_WORKER_FACTOR`
    /// - `GUARDIAN_LEADER_FILTERING` (`true`/`1`)
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("GUARDIAN_SETTLEMENT_SECS") {
            config.settlement_time = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("GUARDIAN_RETRY_WAIT_SECS") {
            config.first_retry_min_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("GUARDIAN_RETRY_INTERVAL_SECS") {
            config.retry_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("GUARDIAN_UNOBSERVED_TIMEOUT_SECS") {
            config.unobserved_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("GUARDIAN_QUORUM_TIMEOUT_SECS") {
            config.quorum_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("GUARDIAN_CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse("GUARDIAN_PRIORITY_LANES") {
            config.num_priority_lanes = n;
        }
        if let Some(n) = env_parse("GUARDIAN_TOTAL_LANES") {
            config.num_total_lanes = n;
        }
        if let Some(f) = env_parse("GUARDIAN_WORKER_FACTOR") {
            config.worker_factor = f;
        }
        if let Ok(v) = env::var("GUARDIAN_LEADER_FILTERING") {
            config.leader_filtering = v == "true" || v == "1";
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settlement_time >= self.first_retry_min_wait {
            return Err(ConfigError::TimeoutOrdering(
                "settlement_time must be below first_retry_min_wait",
            ));
        }
        if self.first_retry_min_wait > self.retry_interval {
            return Err(ConfigError::TimeoutOrdering(
                "first_retry_min_wait must not exceed retry_interval",
            ));
        }
        if self.retry_interval >= self.unobserved_timeout {
            return Err(ConfigError::TimeoutOrdering(
                "retry_interval must be below unobserved_timeout",
            ));
        }
        if self.unobserved_timeout >= self.quorum_timeout {
            return Err(ConfigError::TimeoutOrdering(
                "unobserved_timeout must be below quorum_timeout",
            ));
        }
        if self.cleanup_interval.is_zero() || self.governor_interval.is_zero() {
            return Err(ConfigError::TimeoutOrdering("timer intervals must be non-zero"));
        }

        if self.num_priority_lanes == 0 || self.num_total_lanes <= self.num_priority_lanes {
            return Err(ConfigError::InvalidLanes {
                priority: self.num_priority_lanes,
                total: self.num_total_lanes,
            });
        }

        if self.intake_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("intake_queue_capacity"));
        }
        if self.lane_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("lane_queue_capacity"));
        }

        if !self.worker_factor.is_finite() || self.worker_factor < 0.0 {
            return Err(ConfigError::InvalidWorkerFactor(self.worker_factor));
        }

        Ok(())
    }

    /// Intake worker count for a machine with `cpus` cores.
    pub fn intake_workers(&self, cpus: usize) -> usize {
        if self.worker_factor == 0.0 {
            return 1;
        }
        ((cpus as f64 * self.worker_factor).ceil() as usize).max(1)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
