//! Lane workers
//!
//! Each lane is the only task that ever touches its [`StateShard`]. The
//! dispatcher pins every digest to the lane that first received it, so no
//! entry needs a lock. Whenever a lane ends a job without state for a digest
//! it reports it back as [`Vacated`], which releases the pin.

use super::ProcessorContext;
use crate::domain::{Digest, GuardianSet, ProcessorResult, StateShard};
use crate::events::{PeerObservation, SelfObservation};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

pub(crate) enum LaneJob {
    Peer {
        observation: PeerObservation,
        /// Set active when the dispatcher routed the job
        guardian_set: Arc<GuardianSet>,
    },
    SelfObserved(SelfObservation),
    Sweep {
        now: Instant,
    },
}

/// A job tagged with the dispatcher's sequence number.
pub(crate) struct LaneMessage {
    pub(crate) seq: u64,
    pub(crate) job: LaneJob,
}

/// Digests a lane held no state for once it finished job `seq`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Vacated {
    pub(crate) seq: u64,
    pub(crate) digests: Vec<Digest>,
}

pub(crate) struct LaneWorker {
    id: usize,
    ctx: Arc<ProcessorContext>,
    shard: StateShard,
    jobs: mpsc::Receiver<LaneMessage>,
    vacated: mpsc::UnboundedSender<Vacated>,
}

impl LaneWorker {
    pub(crate) fn new(
        id: usize,
        ctx: Arc<ProcessorContext>,
        jobs: mpsc::Receiver<LaneMessage>,
        vacated: mpsc::UnboundedSender<Vacated>,
    ) -> Self {
        Self {
            id,
            ctx,
            shard: StateShard::new(),
            jobs,
            vacated,
        }
    }

    /// Runs until the dispatcher drops its sender.
    pub(crate) async fn run(mut self) -> ProcessorResult<()> {
        while let Some(message) = self.jobs.recv().await {
            self.handle(message).await?;
        }
        debug!(lane = self.id, "Lane worker stopped");
        Ok(())
    }

    pub(super) async fn handle(&mut self, message: LaneMessage) -> ProcessorResult<()> {
        let LaneMessage { seq, job } = message;
        match job {
            LaneJob::Peer {
                observation,
                guardian_set,
            } => {
                let digest = observation.digest;
                let outcome = self
                    .ctx
                    .handle_peer_observation(&mut self.shard, observation, &guardian_set, Instant::now())
                    .await?;
                trace!(lane = self.id, digest = %digest, ?outcome, "Handled signed observation");
                if self.shard.get(&digest).is_none() {
                    self.report_vacated(seq, vec![digest]);
                }
            }
            LaneJob::SelfObserved(event) => {
                let digest = event.digest;
                let outcome = self
                    .ctx
                    .handle_self_observation(&mut self.shard, event, Instant::now())
                    .await?;
                trace!(lane = self.id, digest = %digest, ?outcome, "Handled self observation");
            }
            LaneJob::Sweep { now } => {
                let mut report = self.ctx.sweep(&mut self.shard, now).await?;
                if report.removed() > 0 || report.retried > 0 {
                    debug!(
                        lane = self.id,
                        late = report.late,
                        completed = report.completed,
                        timed_out = report.timed_out,
                        unobserved = report.unobserved,
                        retried = report.retried,
                        remaining = self.shard.len(),
                        "Cleanup sweep"
                    );
                }
                let removed = std::mem::take(&mut report.removed_digests);
                if !removed.is_empty() {
                    self.report_vacated(seq, removed);
                }
            }
        }
        Ok(())
    }

    fn report_vacated(&self, seq: u64, digests: Vec<Digest>) {
        if self.vacated.send(Vacated { seq, digests }).is_err() {
            trace!(lane = self.id, "Dispatcher gone, dropping vacated digests");
        }
    }
}
