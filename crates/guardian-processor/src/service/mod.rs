//! Guardian processor service
//!
//! # Architecture
//!
//! ```text
//! ProcessorHandle ──local/accountant/quorum VAA──▶ intake workers (N, shared queues)
//!        │                                              │ SelfObservation
//!        └──signed observations──▶ dispatcher ◀─────────┘
//!                                     │ route(digest)
//!                         ┌───────────┼───────────┐
//!                         ▼           ▼           ▼
//!                       lane 0      lane 1  ...  lane L-1   (each owns a StateShard)
//! ```
//!
//! - The dispatcher is the only task that routes, and the only one that runs
//!   the cleanup and governor timers. It pins each digest to one lane until
//!   that lane reports the digest's state gone.
//! - A lane is the only task that reads or writes its shard.
//! - The first worker error stops every worker and is returned from
//!   [`GuardianProcessor::run`].

mod broadcast;
mod cleanup;
mod dispatch;
mod intake;
mod lane;
mod message;
mod observation;
mod storage;

pub use broadcast::Broadcaster;
pub use cleanup::SweepReport;
pub use observation::{verify_peer_signature, AggregationOutcome};
pub use storage::ArtifactStore;

use crate::domain::{BucketRouter, Observation, ProcessorConfig, ProcessorError, ProcessorResult};
use crate::events::{SignedObservation, SignedVaaWithQuorum};
use crate::ports::{
    Accountant, GossipTransport, Governor, GuardianSetProvider, GuardianSigner, ProcessorHandle,
    ReobservationSink, VaaStore,
};
use dispatch::Dispatcher;
use intake::IntakeWorker;
use lane::LaneWorker;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info};

/// External collaborators of the processor.
#[derive(Clone)]
pub struct ProcessorDependencies {
    pub signer: Arc<dyn GuardianSigner>,
    pub guardian_sets: Arc<dyn GuardianSetProvider>,
    pub store: Arc<dyn VaaStore>,
    pub gossip: Arc<dyn GossipTransport>,
    pub reobservation: Arc<dyn ReobservationSink>,
    pub governor: Option<Arc<dyn Governor>>,
    pub accountant: Option<Arc<dyn Accountant>>,
}

/// Shared, read-only state every worker needs.
pub struct ProcessorContext {
    pub(crate) config: ProcessorConfig,
    pub(crate) router: BucketRouter,
    pub(crate) signer: Arc<dyn GuardianSigner>,
    pub(crate) guardian_sets: Arc<dyn GuardianSetProvider>,
    pub(crate) store: ArtifactStore,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) reobservation: Arc<dyn ReobservationSink>,
    pub(crate) governor: Option<Arc<dyn Governor>>,
    pub(crate) accountant: Option<Arc<dyn Accountant>>,
}

impl ProcessorContext {
    pub fn new(deps: ProcessorDependencies, config: ProcessorConfig) -> Self {
        Self {
            router: BucketRouter::new(
                config.num_priority_lanes,
                config.num_total_lanes,
                config.leader_filtering,
            ),
            signer: deps.signer,
            guardian_sets: deps.guardian_sets,
            store: ArtifactStore::new(deps.store, config.pythnet_vaa_ttl),
            broadcaster: Broadcaster::new(deps.gossip),
            reobservation: deps.reobservation,
            governor: deps.governor,
            accountant: deps.accountant,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

/// The observation aggregation core.
pub struct GuardianProcessor {
    ctx: Arc<ProcessorContext>,
    /// Held so the inbound queues stay open for as long as the processor runs
    handle: ProcessorHandle,
    local: async_channel::Receiver<Observation>,
    accountant_released: async_channel::Receiver<Observation>,
    quorum_vaas: async_channel::Receiver<SignedVaaWithQuorum>,
    signed: mpsc::Receiver<(SignedObservation, Instant)>,
    intake_workers: usize,
}

impl GuardianProcessor {
    /// Validate `config` and build the processor and its input handle.
    pub fn new(
        deps: ProcessorDependencies,
        config: ProcessorConfig,
    ) -> ProcessorResult<(Self, ProcessorHandle)> {
        config.validate()?;

        let capacity = config.intake_queue_capacity;
        let (local_tx, local) = async_channel::bounded(capacity);
        let (accountant_tx, accountant_released) = async_channel::bounded(capacity);
        let (quorum_tx, quorum_vaas) = async_channel::bounded(capacity);
        let (signed_tx, signed) = mpsc::channel(capacity);

        let handle = ProcessorHandle {
            local: local_tx,
            accountant_released: accountant_tx,
            quorum_vaas: quorum_tx,
            signed: signed_tx,
        };

        let intake_workers = config.intake_workers(num_cpus::get());

        let processor = Self {
            ctx: Arc::new(ProcessorContext::new(deps, config)),
            handle: handle.clone(),
            local,
            accountant_released,
            quorum_vaas,
            signed,
            intake_workers,
        };

        Ok((processor, handle))
    }

    pub fn intake_workers(&self) -> usize {
        self.intake_workers
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped), or a
    /// worker fails.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> ProcessorResult<()> {
        let config = self.ctx.config.clone();
        let mut workers: JoinSet<ProcessorResult<()>> = JoinSet::new();

        let (self_tx, self_rx) = mpsc::channel(config.intake_queue_capacity);

        let (vacated_tx, vacated_rx) = mpsc::unbounded_channel();
        let mut lanes = Vec::with_capacity(config.num_total_lanes);
        for id in 0..config.num_total_lanes {
            let (tx, rx) = mpsc::channel(config.lane_queue_capacity);
            lanes.push(tx);
            let lane = LaneWorker::new(id, Arc::clone(&self.ctx), rx, vacated_tx.clone());
            workers.spawn(lane.run());
        }
        drop(vacated_tx);

        for id in 0..self.intake_workers {
            let worker = IntakeWorker {
                id,
                ctx: Arc::clone(&self.ctx),
                local: self.local.clone(),
                accountant_released: self.accountant_released.clone(),
                quorum_vaas: self.quorum_vaas.clone(),
                self_observations: self_tx.clone(),
            };
            workers.spawn(worker.run(shutdown.clone()));
        }
        drop(self_tx);

        let dispatcher =
            Dispatcher::new(Arc::clone(&self.ctx), self.signed, self_rx, lanes, vacated_rx);
        workers.spawn(dispatcher.run(shutdown.clone()));

        info!(
            intake_workers = self.intake_workers,
            lanes = config.num_total_lanes,
            priority_lanes = config.num_priority_lanes,
            leader_filtering = config.leader_filtering,
            "Guardian processor started"
        );

        let result = supervise(&mut workers, &shutdown).await;
        workers.abort_all();
        drop(self.handle);

        match &result {
            Ok(()) => info!("Guardian processor stopped"),
            Err(e) => error!(error = %e, "Guardian processor failed"),
        }
        result
    }
}

/// Wait for every worker. The first failure wins; closed channels after
/// shutdown was requested are expected and ignored.
async fn supervise(
    workers: &mut JoinSet<ProcessorResult<()>>,
    shutdown: &watch::Receiver<bool>,
) -> ProcessorResult<()> {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(ProcessorError::ChannelClosed(_))) if *shutdown.borrow() => {}
            Ok(Err(e)) => return Err(e),
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(ProcessorError::WorkerPanicked(e.to_string())),
        }
    }
    Ok(())
}

/// Resolves once shutdown is requested or the sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests;
