//! Events consumed by the lane workers

use super::published::SignedObservation;
use crate::domain::{
    Digest, GuardianAddress, GuardianSet, MessageId, Observation, SignatureBytes,
    VerificationFailure,
};
use std::sync::Arc;
use tokio::time::Instant;

/// A peer's signed observation after structural validation.
///
/// The signature has not been checked yet; that happens on the owning lane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerObservation {
    pub digest: Digest,
    pub address: GuardianAddress,
    pub signature: SignatureBytes,
    pub tx_hash: Vec<u8>,
    pub message_id: MessageId,
    pub received_at: Instant,
}

impl PeerObservation {
    /// Validate the field widths and message id of a raw gossip message.
    pub fn parse(
        raw: SignedObservation,
        received_at: Instant,
    ) -> Result<Self, VerificationFailure> {
        let digest =
            Digest::from_slice(&raw.hash).ok_or(VerificationFailure::Malformed("hash"))?;
        let address =
            GuardianAddress::from_slice(&raw.addr).ok_or(VerificationFailure::Malformed("addr"))?;
        let signature: SignatureBytes = raw
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| VerificationFailure::Malformed("signature"))?;
        let message_id = raw
            .message_id
            .parse::<MessageId>()
            .map_err(VerificationFailure::InvalidMessageId)?;

        Ok(Self {
            digest,
            address,
            signature,
            tx_hash: raw.tx_hash,
            message_id,
            received_at,
        })
    }
}

/// This node signed `digest` for `observation`.
#[derive(Clone, Debug)]
pub struct SelfObservation {
    pub digest: Digest,
    pub observation: Observation,
    pub address: GuardianAddress,
    pub signature: SignatureBytes,
    /// Encoded gossip message, retransmitted on retry
    pub gossip: Vec<u8>,
    /// Guardian set the record was built against
    pub guardian_set: Arc<GuardianSet>,
}
