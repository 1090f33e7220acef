//! Driving ports (Inbound API)

use crate::domain::{Observation, ProcessorError, ProcessorResult};
use crate::events::{GossipMessage, SignedObservation, SignedVaaWithQuorum};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Everything that can enter the processor from outside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    /// Confirmed by one of our watchers
    LocalObservation(Observation),
    /// A peer's signature over a digest
    SignedObservation(SignedObservation),
    /// A VAA some other guardian already assembled
    QuorumVaa(SignedVaaWithQuorum),
}

impl From<GossipMessage> for InboundMessage {
    fn from(message: GossipMessage) -> Self {
        match message {
            GossipMessage::SignedObservation(m) => InboundMessage::SignedObservation(m),
            GossipMessage::SignedVaaWithQuorum(m) => InboundMessage::QuorumVaa(m),
        }
    }
}

/// Cloneable sender side of the processor's queues.
///
/// Every queue is bounded; `submit` waits for room instead of dropping.
#[derive(Clone, Debug)]
pub struct ProcessorHandle {
    pub(crate) local: async_channel::Sender<Observation>,
    pub(crate) accountant_released: async_channel::Sender<Observation>,
    pub(crate) quorum_vaas: async_channel::Sender<SignedVaaWithQuorum>,
    pub(crate) signed: mpsc::Sender<(SignedObservation, Instant)>,
}

impl ProcessorHandle {
    pub async fn submit(&self, message: InboundMessage) -> ProcessorResult<()> {
        match message {
            InboundMessage::LocalObservation(obs) => self
                .local
                .send(obs)
                .await
                .map_err(|_| ProcessorError::ChannelClosed("local observations")),
            InboundMessage::SignedObservation(msg) => self
                .signed
                .send((msg, Instant::now()))
                .await
                .map_err(|_| ProcessorError::ChannelClosed("signed observations")),
            InboundMessage::QuorumVaa(msg) => self
                .quorum_vaas
                .send(msg)
                .await
                .map_err(|_| ProcessorError::ChannelClosed("quorum vaas")),
        }
    }

    /// Decode a gossip payload from a peer and submit it.
    pub async fn submit_gossip(&self, bytes: &[u8]) -> ProcessorResult<()> {
        let message =
            GossipMessage::decode(bytes).map_err(|e| ProcessorError::Encoding(e.to_string()))?;
        self.submit(message.into()).await
    }

    /// A message the accountant held back has been approved.
    pub async fn submit_accountant_release(&self, observation: Observation) -> ProcessorResult<()> {
        self.accountant_released
            .send(observation)
            .await
            .map_err(|_| ProcessorError::ChannelClosed("accountant releases"))
    }
}
