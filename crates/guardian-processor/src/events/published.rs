//! Gossip messages sent to peers
//!
//! Encoded with `bincode` and handed to the transport as opaque bytes.

use crate::domain::{
    ChainId, Digest, GuardianAddress, MessageId, ProcessorError, SignatureBytes, Vaa,
};
use serde::{Deserialize, Serialize};

/// One guardian's signature over a digest.
///
/// Fields arrive from the network unchecked, so they are raw byte vectors.
/// The dispatcher validates them into a [`PeerObservation`](crate::events::PeerObservation).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedObservation {
    /// Claimed signer address (20 bytes)
    pub addr: Vec<u8>,
    /// Signing digest (32 bytes)
    pub hash: Vec<u8>,
    /// Recoverable signature (65 bytes)
    pub signature: Vec<u8>,
    pub tx_hash: Vec<u8>,
    /// `chain/emitter/sequence`
    pub message_id: String,
}

impl SignedObservation {
    pub fn new(
        address: GuardianAddress,
        digest: Digest,
        signature: SignatureBytes,
        tx_hash: Vec<u8>,
        message_id: MessageId,
    ) -> Self {
        Self {
            addr: address.0.to_vec(),
            hash: digest.0.to_vec(),
            signature: signature.to_vec(),
            tx_hash,
            message_id: message_id.to_string(),
        }
    }
}

/// A VAA that already carries a quorum of signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVaaWithQuorum {
    /// Marshalled VAA
    pub vaa: Vec<u8>,
}

impl SignedVaaWithQuorum {
    pub fn from_vaa(vaa: &Vaa) -> Self {
        Self { vaa: vaa.marshal() }
    }
}

/// Envelope for everything the processor puts on the gossip network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipMessage {
    SignedObservation(SignedObservation),
    SignedVaaWithQuorum(SignedVaaWithQuorum),
}

impl GossipMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProcessorError> {
        bincode::serialize(self).map_err(|e| ProcessorError::Encoding(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Ask the watcher for `chain_id` to look at `tx_hash` again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub chain_id: ChainId,
    pub tx_hash: Vec<u8>,
}
