//! Broadcaster
//!
//! Encodes gossip messages and pushes them onto the outbound transport. The
//! transport never blocks; a full queue surfaces as
//! [`ProcessorError::GossipQueueFull`] and stops the processor.

use crate::domain::{Digest, GuardianAddress, MessageId, ProcessorResult, SignatureBytes, Vaa};
use crate::events::{GossipMessage, SignedObservation, SignedVaaWithQuorum};
use crate::ports::GossipTransport;
use std::sync::Arc;
use tracing::debug;

pub struct Broadcaster {
    transport: Arc<dyn GossipTransport>,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn GossipTransport>) -> Self {
        Self { transport }
    }

    /// Send our signature over `digest`. Returns the encoded message so it
    /// can be retransmitted later.
    pub fn broadcast_signature(
        &self,
        address: GuardianAddress,
        digest: Digest,
        signature: SignatureBytes,
        tx_hash: Vec<u8>,
        message_id: MessageId,
    ) -> ProcessorResult<Vec<u8>> {
        let message = GossipMessage::SignedObservation(SignedObservation::new(
            address, digest, signature, tx_hash, message_id,
        ));
        let bytes = message.encode()?;
        self.transport.send(bytes.clone())?;
        debug!(digest = %digest, message_id = %message_id, "Broadcast signed observation");
        Ok(bytes)
    }

    pub fn broadcast_signed_vaa(&self, vaa: &Vaa) -> ProcessorResult<()> {
        let message = GossipMessage::SignedVaaWithQuorum(SignedVaaWithQuorum::from_vaa(vaa));
        self.transport.send(message.encode()?)?;
        debug!(message_id = %vaa.message_id(), "Broadcast signed VAA");
        Ok(())
    }

    /// Resend an already-encoded message.
    pub fn retransmit(&self, encoded: Vec<u8>) -> ProcessorResult<()> {
        self.transport.send(encoded)?;
        Ok(())
    }
}
