//! Dispatcher
//!
//! Single task that owns routing and the timers. The first job for a digest
//! goes to the lane picked by the bucket router and the digest stays pinned
//! to that lane until the lane reports it vacated, so a guardian set rotation
//! never splits one digest's state across lanes. The cleanup tick fans a
//! sweep out to every lane; the governor tick publishes messages whose hold
//! period ended.

use super::lane::{LaneJob, LaneMessage, Vacated};
use super::{wait_for_shutdown, ProcessorContext};
use crate::domain::{Digest, ProcessorError, ProcessorResult, VerificationFailure};
use crate::events::{PeerObservation, SelfObservation, SignedObservation};
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Lane holding a digest's state, and the last job routed there for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LaneOwner {
    lane: usize,
    last_seq: u64,
}

pub(crate) struct Dispatcher {
    ctx: Arc<ProcessorContext>,
    signed: mpsc::Receiver<(SignedObservation, Instant)>,
    self_observations: mpsc::Receiver<SelfObservation>,
    lanes: Vec<mpsc::Sender<LaneMessage>>,
    vacated: mpsc::UnboundedReceiver<Vacated>,
    owners: HashMap<Digest, LaneOwner>,
    next_seq: u64,
}

impl Dispatcher {
    pub(crate) fn new(
        ctx: Arc<ProcessorContext>,
        signed: mpsc::Receiver<(SignedObservation, Instant)>,
        self_observations: mpsc::Receiver<SelfObservation>,
        lanes: Vec<mpsc::Sender<LaneMessage>>,
        vacated: mpsc::UnboundedReceiver<Vacated>,
    ) -> Self {
        Self {
            ctx,
            signed,
            self_observations,
            lanes,
            vacated,
            owners: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Lane currently holding state for `digest`, if any.
    pub(crate) fn owner_of(&self, digest: &Digest) -> Option<usize> {
        self.owners.get(digest).map(|owner| owner.lane)
    }

    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ProcessorResult<()> {
        let cleanup_every = self.ctx.config.cleanup_interval;
        let governor_every = self.ctx.config.governor_interval;

        let mut cleanup = interval_at(Instant::now() + cleanup_every, cleanup_every);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut governor = interval_at(Instant::now() + governor_every, governor_every);
        governor.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                Some((raw, received_at)) = self.signed.recv() => {
                    self.dispatch_signed(raw, received_at).await?;
                }
                Some(event) = self.self_observations.recv() => {
                    self.dispatch_self(event).await?;
                }
                Some(vacated) = self.vacated.recv() => self.release_vacated(vacated),
                _ = cleanup.tick() => self.dispatch_sweep().await?,
                _ = governor.tick() => self.release_governed().await?,
            }
        }

        debug!("Dispatcher stopped");
        Ok(())
    }

    pub(crate) async fn dispatch_signed(
        &mut self,
        raw: SignedObservation,
        received_at: Instant,
    ) -> ProcessorResult<()> {
        metrics::record_observation_received();

        let observation = match PeerObservation::parse(raw, received_at) {
            Ok(observation) => observation,
            Err(failure) => {
                metrics::record_observation_failed(failure.as_label());
                debug!(error = %failure, "Dropping malformed signed observation");
                return Ok(());
            }
        };

        let Some(guardian_set) = self.ctx.guardian_sets.current_set() else {
            let failure = VerificationFailure::UninitializedGuardianSet;
            metrics::record_observation_failed(failure.as_label());
            warn!(
                digest = %observation.digest,
                message_id = %observation.message_id,
                "Dropping observation, guardian set not initialized"
            );
            return Ok(());
        };

        let digest = observation.digest;
        let lane = match self.owner_of(&digest) {
            Some(lane) => lane,
            None => {
                let my_index = guardian_set
                    .key_index(&self.ctx.signer.address())
                    .unwrap_or(0);
                let route = self.ctx.router.route(&digest, my_index, guardian_set.len());

                if !route.is_leader {
                    debug!(
                        digest = %digest,
                        message_id = %observation.message_id,
                        "Not in leader set for digest"
                    );
                    return Ok(());
                }
                route.lane
            }
        };

        self.send_owned(
            digest,
            lane,
            LaneJob::Peer {
                observation,
                guardian_set,
            },
        )
        .await
    }

    pub(crate) async fn dispatch_self(&mut self, event: SelfObservation) -> ProcessorResult<()> {
        let digest = event.digest;
        let lane = match self.owner_of(&digest) {
            Some(lane) => lane,
            None => {
                let guardian_set = self
                    .ctx
                    .guardian_sets
                    .current_set()
                    .unwrap_or_else(|| Arc::clone(&event.guardian_set));
                let my_index = guardian_set.key_index(&event.address).unwrap_or(0);
                self.ctx.router.route(&digest, my_index, guardian_set.len()).lane
            }
        };

        self.send_owned(digest, lane, LaneJob::SelfObserved(event))
            .await
    }

    /// Forget digests a lane no longer holds, unless a job for them was
    /// routed after the one the report refers to.
    pub(crate) fn release_vacated(&mut self, vacated: Vacated) {
        for digest in vacated.digests {
            if self
                .owners
                .get(&digest)
                .is_some_and(|owner| owner.last_seq <= vacated.seq)
            {
                self.owners.remove(&digest);
                trace!(digest = %digest, "Released lane ownership");
            }
        }
    }

    pub(super) async fn dispatch_sweep(&mut self) -> ProcessorResult<()> {
        let now = Instant::now();
        for lane in 0..self.lanes.len() {
            self.send_to_lane(lane, LaneJob::Sweep { now }).await?;
        }
        self.ctx.store.prune_pythnet(now);
        Ok(())
    }

    /// Publish messages the governor released. Each must still be governed.
    pub(super) async fn release_governed(&mut self) -> ProcessorResult<()> {
        let Some(governor) = self.ctx.governor.clone() else {
            return Ok(());
        };

        let released = governor
            .release_pending()
            .await
            .map_err(ProcessorError::Governor)?;

        for observation in released {
            let message_id = observation.message_id();
            if !governor.is_governed(observation.emitter_chain, &observation.emitter_address) {
                return Err(ProcessorError::GovernorViolation(message_id.to_string()));
            }

            if !self.ctx.submit_to_accountant(&observation).await {
                continue;
            }

            info!(message_id = %message_id, "Governor released message");
            if let Some(event) = self.ctx.observe_message(observation).await? {
                self.dispatch_self(event).await?;
            }
        }

        Ok(())
    }

    /// Send a job for `digest` and record `lane` as its owner.
    async fn send_owned(&mut self, digest: Digest, lane: usize, job: LaneJob) -> ProcessorResult<()> {
        let last_seq = self.send_to_lane(lane, job).await?;
        self.owners.insert(digest, LaneOwner { lane, last_seq });
        Ok(())
    }

    async fn send_to_lane(&mut self, lane: usize, job: LaneJob) -> ProcessorResult<u64> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.lanes[lane]
            .send(LaneMessage { seq, job })
            .await
            .map_err(|_| ProcessorError::ChannelClosed("lane"))?;
        Ok(seq)
    }
}
