//! Intake workers
//!
//! A pool of identical workers sharing the inbound MPMC queues: local
//! observations (filtered through the governor and accountant), accountant
//! releases, and VAAs that arrive already carrying a quorum.

use super::{wait_for_shutdown, ProcessorContext};
use crate::domain::{Observation, ProcessorError, ProcessorResult};
use crate::events::{SelfObservation, SignedVaaWithQuorum};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

pub(crate) struct IntakeWorker {
    pub(crate) id: usize,
    pub(crate) ctx: Arc<ProcessorContext>,
    pub(crate) local: async_channel::Receiver<Observation>,
    pub(crate) accountant_released: async_channel::Receiver<Observation>,
    pub(crate) quorum_vaas: async_channel::Receiver<SignedVaaWithQuorum>,
    pub(crate) self_observations: mpsc::Sender<SelfObservation>,
}

impl IntakeWorker {
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) -> ProcessorResult<()> {
        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                Ok(observation) = self.local.recv() => self.handle_local(observation).await?,
                Ok(observation) = self.accountant_released.recv() => {
                    self.handle_accountant_release(observation).await?;
                }
                Ok(message) = self.quorum_vaas.recv() => {
                    self.ctx.handle_quorum_vaa(message).await;
                }
                else => break,
            }
        }

        debug!(worker = self.id, "Intake worker stopped");
        Ok(())
    }

    pub(super) async fn handle_local(&self, observation: Observation) -> ProcessorResult<()> {
        if !self.ctx.accept_local(&observation) {
            return Ok(());
        }

        if let Some(governor) = &self.ctx.governor {
            let admitted = governor
                .admit(&observation)
                .await
                .map_err(ProcessorError::Governor)?;
            if !admitted {
                debug!(message_id = %observation.message_id(), "Message held by governor");
                return Ok(());
            }
        }

        if !self.ctx.submit_to_accountant(&observation).await {
            return Ok(());
        }

        self.publish(observation).await
    }

    pub(super) async fn handle_accountant_release(&self, observation: Observation) -> ProcessorResult<()> {
        let Some(accountant) = &self.ctx.accountant else {
            return Err(ProcessorError::AccountantNotConfigured);
        };

        if !accountant.covers(&observation) {
            return Err(ProcessorError::AccountantViolation(
                observation.message_id().to_string(),
            ));
        }

        self.publish(observation).await
    }

    async fn publish(&self, observation: Observation) -> ProcessorResult<()> {
        if let Some(event) = self.ctx.observe_message(observation).await? {
            self.self_observations
                .send(event)
                .await
                .map_err(|_| ProcessorError::ChannelClosed("self observations"))?;
        }
        Ok(())
    }
}

impl ProcessorContext {
    /// Run `observation` past the accountant, if one is configured. `false`
    /// means the accountant holds it (or rejected it) and it must not be
    /// signed now.
    pub(crate) async fn submit_to_accountant(&self, observation: &Observation) -> bool {
        let Some(accountant) = &self.accountant else {
            return true;
        };

        match accountant.submit_observation(observation).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(message_id = %observation.message_id(), "Message pending accountant approval");
                false
            }
            Err(e) => {
                warn!(
                    message_id = %observation.message_id(),
                    error = %e,
                    "Accountant failed to process message, dropping"
                );
                false
            }
        }
    }
}
