//! # Node Runtime
//!
//! Wires the in-process adapters around a [`GuardianProcessor`] and owns its
//! lifecycle.
//!
//! ```text
//! ProcessorHandle ──→ GuardianProcessor ──gossip queue──→ gossip pump ──┐
//!        ↑                    │                                        │
//!        └────────────────────┼──────────── loopback ──────────────────┘
//!                             └──re-observation queue──→ re-observation log
//! ```
//!
//! There is no peer-to-peer transport in this binary: the gossip pump counts
//! every outbound message and loops it back into the processor, which is
//! what a node sees from its own publications on a real network.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use guardian_processor::events::ObservationRequest;
use guardian_processor::{
    ChannelGossip, ChannelReobservationSink, GossipMessage, GuardianAddress, GuardianProcessor,
    GuardianSetState, GuardianSigner, InMemoryVaaStore, ProcessorConfig, ProcessorDependencies,
    ProcessorHandle, ProcessorResult,
};
use guardian_telemetry::{
    GOSSIP_MESSAGES_SENT, GUARDIAN_SET_INDEX, GUARDIAN_SET_SIZE, NODE_ERRORS, NODE_START_TIME,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;

/// How long shutdown waits for the processor to drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Re-observation requests buffered before new ones are rejected.
const REOBSERVATION_QUEUE: usize = 256;

/// A running guardian node.
pub struct NodeRuntime {
    address: GuardianAddress,
    handle: ProcessorHandle,
    store: Arc<InMemoryVaaStore>,
    guardian_sets: Arc<GuardianSetState>,
    shutdown_tx: watch::Sender<bool>,
    processor: JoinHandle<ProcessorResult<()>>,
    pumps: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Build the processor and spawn it with its pumps. Must be called from
    /// within a tokio runtime.
    pub fn start(config: NodeConfig, processor_config: ProcessorConfig) -> Result<Self> {
        let address = config.signer.address();

        info!("===========================================");
        info!("  guardiand v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        if !config.guardian_set.contains(&address) {
            warn!(
                address = %address,
                index = config.guardian_set.index,
                "Our key is not in the guardian set, signatures will not count towards quorum"
            );
        }

        GUARDIAN_SET_INDEX.set(i64::from(config.guardian_set.index));
        GUARDIAN_SET_SIZE.set(config.guardian_set.len() as i64);
        NODE_START_TIME.set(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
        );

        let store = Arc::new(InMemoryVaaStore::new());
        let guardian_sets = Arc::new(GuardianSetState::with_set(config.guardian_set));
        let (gossip, gossip_rx) = ChannelGossip::new(config.gossip_queue);
        let (reobservation, reobservation_rx) = ChannelReobservationSink::new(REOBSERVATION_QUEUE);

        let deps = ProcessorDependencies {
            signer: config.signer,
            guardian_sets: guardian_sets.clone(),
            store: store.clone(),
            gossip: Arc::new(gossip),
            reobservation: Arc::new(reobservation),
            governor: None,
            accountant: None,
        };

        let (processor, handle) = GuardianProcessor::new(deps, processor_config)
            .context("Failed to create guardian processor")?;
        info!(
            address = %address,
            intake_workers = processor.intake_workers(),
            "Guardian processor configured"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let processor = tokio::spawn(processor.run(shutdown_rx));

        let pumps = vec![
            tokio::spawn(pump_gossip(gossip_rx, handle.clone())),
            tokio::spawn(log_reobservations(reobservation_rx)),
        ];

        Ok(Self {
            address,
            handle,
            store,
            guardian_sets,
            shutdown_tx,
            processor,
            pumps,
        })
    }

    pub fn address(&self) -> GuardianAddress {
        self.address
    }

    /// Input side of the processor.
    pub fn handle(&self) -> &ProcessorHandle {
        &self.handle
    }

    pub fn store(&self) -> &Arc<InMemoryVaaStore> {
        &self.store
    }

    /// For guardian set rotation.
    pub fn guardian_sets(&self) -> &Arc<GuardianSetState> {
        &self.guardian_sets
    }

    /// Resolves when the processor stops on its own, which only happens on
    /// a fatal error.
    pub async fn wait(&mut self) -> Result<()> {
        let result = (&mut self.processor)
            .await
            .context("Guardian processor task panicked")?;
        result.context("Guardian processor failed")
    }

    /// Signal shutdown and wait for the processor to drain.
    pub async fn shutdown(self) -> Result<()> {
        info!("Initiating graceful shutdown...");

        if self.shutdown_tx.send(true).is_err() {
            debug!("Processor already stopped");
        }

        let result = match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.processor).await {
            Ok(joined) => joined
                .context("Guardian processor task panicked")?
                .context("Guardian processor failed"),
            Err(_) => {
                error!("Guardian processor did not stop in time");
                Ok(())
            }
        };

        for pump in self.pumps {
            pump.abort();
        }

        info!("Shutdown complete");
        result
    }
}

/// Drain the outbound gossip queue, loop each message back in.
async fn pump_gossip(mut gossip: mpsc::Receiver<Vec<u8>>, handle: ProcessorHandle) {
    while let Some(bytes) = gossip.recv().await {
        let kind = match GossipMessage::decode(&bytes) {
            Ok(GossipMessage::SignedObservation(_)) => "signed_observation",
            Ok(GossipMessage::SignedVaaWithQuorum(_)) => "signed_vaa",
            Err(e) => {
                NODE_ERRORS.with_label_values(&["gossip", "decode"]).inc();
                warn!(error = %e, "Dropping undecodable outbound gossip");
                continue;
            }
        };
        GOSSIP_MESSAGES_SENT.with_label_values(&[kind]).inc();
        debug!(kind, bytes = bytes.len(), "Gossip message sent");

        if let Err(e) = handle.submit_gossip(&bytes).await {
            debug!(error = %e, "Processor no longer accepting gossip");
            break;
        }
    }
}

/// No watchers run in this binary; re-observation requests are only logged.
async fn log_reobservations(mut requests: mpsc::Receiver<ObservationRequest>) {
    while let Some(request) = requests.recv().await {
        info!(
            chain = %request.chain_id,
            tx_hash = %hex::encode(&request.tx_hash),
            "Re-observation requested"
        );
    }
}
