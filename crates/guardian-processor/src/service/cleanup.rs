//! Cleanup Sweeper
//!
//! Periodic pass over one lane's aggregation states. Rules are evaluated top
//! down and the first match wins:
//!
//! | # | Condition | Action |
//! |---|-----------|--------|
//! | 1 | not submitted, older than settlement time, VAA already stored | delete (late) |
//! | 2 | submitted | delete (completed) |
//! | 3 | observed by us, older than quorum timeout | delete (timed out) |
//! | 4 | not observed by us, older than unobserved timeout | delete (unobserved) |
//! | 5 | observed, past first retry wait, retry interval elapsed, reliable | re-request and retransmit |
//! | 6 | observed, past first retry wait, unreliable | delete (timed out) |

use super::ProcessorContext;
use crate::domain::{Digest, ProcessorResult, StateShard};
use crate::events::ObservationRequest;
use crate::metrics;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What one sweep did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub late: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub unobserved: usize,
    pub retried: usize,
    /// Every digest whose state was deleted
    pub removed_digests: Vec<Digest>,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.late + self.completed + self.timed_out + self.unobserved
    }

    pub fn merge(&mut self, other: SweepReport) {
        self.late += other.late;
        self.completed += other.completed;
        self.timed_out += other.timed_out;
        self.unobserved += other.unobserved;
        self.retried += other.retried;
        self.removed_digests.extend(other.removed_digests);
    }
}

impl ProcessorContext {
    /// Apply the cleanup rules to every entry in `shard`.
    ///
    /// Only a failed retransmit is fatal.
    pub(crate) async fn sweep(
        &self,
        shard: &mut StateShard,
        now: Instant,
    ) -> ProcessorResult<SweepReport> {
        let config = &self.config;
        let mut report = SweepReport::default();

        for digest in shard.digests() {
            let Some(state) = shard.get_mut(&digest) else {
                continue;
            };
            let age = state.age(now);

            if !state.submitted && age > config.settlement_time {
                if let Some(message_id) = state.message_id {
                    if self.store.has_vaa(&message_id).await {
                        debug!(
                            digest = %digest,
                            message_id = %message_id,
                            signatures = state.signatures.len(),
                            "Expiring late VAA"
                        );
                        shard.remove(&digest);
                        report.removed_digests.push(digest);
                        metrics::record_state_removed("late");
                        report.late += 1;
                        continue;
                    }
                }
            }

            if state.submitted {
                shard.remove(&digest);
                report.removed_digests.push(digest);
                metrics::record_state_removed("completed");
                report.completed += 1;
                continue;
            }

            let owned = state.is_owned();

            if owned && age > config.quorum_timeout {
                info!(
                    digest = %digest,
                    message_id = ?state.message_id,
                    signatures = state.signatures.len(),
                    need = state.quorum(),
                    "Expiring VAA that never reached quorum"
                );
                shard.remove(&digest);
                report.removed_digests.push(digest);
                metrics::record_state_removed("timed_out");
                report.timed_out += 1;
                continue;
            }

            if !owned && age > config.unobserved_timeout {
                debug!(
                    digest = %digest,
                    message_id = ?state.message_id,
                    signatures = state.signatures.len(),
                    "Expiring signatures for message we never observed"
                );
                shard.remove(&digest);
                report.removed_digests.push(digest);
                metrics::record_state_removed("unobserved");
                report.unobserved += 1;
                continue;
            }

            if !owned || age < config.first_retry_min_wait {
                continue;
            }

            let reliable = state
                .our_observation
                .as_ref()
                .is_some_and(|o| o.is_reliable());

            if !reliable {
                info!(
                    digest = %digest,
                    message_id = ?state.message_id,
                    "Expiring unreliable VAA that cannot be re-observed"
                );
                shard.remove(&digest);
                report.removed_digests.push(digest);
                metrics::record_state_removed("timed_out");
                report.timed_out += 1;
                continue;
            }

            if now.saturating_duration_since(state.last_retry) < config.retry_interval {
                continue;
            }

            info!(
                digest = %digest,
                message_id = ?state.message_id,
                retry = state.retry_count + 1,
                signatures = state.signatures.len(),
                need = state.quorum(),
                "Resubmitting observation"
            );

            if let Some(observation) = &state.our_observation {
                let request = ObservationRequest {
                    chain_id: observation.emitter_chain,
                    tx_hash: observation.tx_hash.clone(),
                };
                match self.reobservation.request_reobservation(request) {
                    Ok(()) => metrics::record_reobservation_request(),
                    Err(e) => warn!(digest = %digest, error = %e, "Failed to request re-observation"),
                }
            }

            if let Some(gossip) = &state.our_message {
                self.broadcaster.retransmit(gossip.clone())?;
            }

            state.last_retry = now;
            state.retry_count += 1;
            report.retried += 1;
        }

        Ok(report)
    }
}
