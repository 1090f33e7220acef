//! Observation Aggregator
//!
//! Runs on the lane that owns a digest. Collects verified signatures into
//! the lane's [`StateShard`] and assembles, stores and gossips the VAA once
//! a quorum of the frozen guardian set has signed and we hold our own
//! observation.
//!
//! Also verifies VAAs that arrive already carrying a quorum.

use super::ProcessorContext;
use crate::domain::{
    recover_address, AggregationState, Digest, GuardianSet, ProcessorResult, StateShard, Vaa,
    VerificationFailure,
};
use crate::events::{PeerObservation, SelfObservation, SignedVaaWithQuorum};
use crate::metrics;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What a single aggregation step did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AggregationOutcome {
    AlreadySubmitted,
    /// The VAA was completed elsewhere and is already in the store
    AlreadyStored,
    /// This guardian's signature was already recorded
    Duplicate,
    Rejected(VerificationFailure),
    Pending { have: usize, need: usize },
    /// Quorum reached but we have not observed the message ourselves yet
    AwaitingLocalObservation,
    Submitted,
}

/// Check that `peer` carries a valid signature by a member of `guardian_set`.
pub fn verify_peer_signature(
    peer: &PeerObservation,
    guardian_set: &GuardianSet,
) -> Result<(), VerificationFailure> {
    let recovered = recover_address(&peer.digest, &peer.signature)
        .map_err(VerificationFailure::InvalidSignature)?;

    if recovered != peer.address {
        return Err(VerificationFailure::PubkeyMismatch {
            claimed: peer.address,
            recovered,
        });
    }

    if !guardian_set.contains(&peer.address) {
        return Err(VerificationFailure::UnknownGuardian(
            peer.address,
            guardian_set.index,
        ));
    }

    Ok(())
}

impl ProcessorContext {
    /// Handle a peer's signature. `current_set` is used only if no state
    /// exists yet for the digest.
    pub(crate) async fn handle_peer_observation(
        &self,
        shard: &mut StateShard,
        peer: PeerObservation,
        current_set: &Arc<GuardianSet>,
        now: Instant,
    ) -> ProcessorResult<AggregationOutcome> {
        let digest = peer.digest;
        metrics::record_signed_observation_delay(
            now.saturating_duration_since(peer.received_at).as_secs_f64(),
        );

        if shard.get(&digest).is_some_and(|s| s.submitted) {
            debug!(digest = %digest, "Already submitted, ignoring signature");
            return Ok(AggregationOutcome::AlreadySubmitted);
        }

        if self.store.has_vaa(&peer.message_id).await {
            debug!(digest = %digest, message_id = %peer.message_id, "Already have VAA, ignoring signature");
            return Ok(AggregationOutcome::AlreadyStored);
        }

        if shard
            .get(&digest)
            .is_some_and(|s| s.has_signature(&peer.address))
        {
            debug!(digest = %digest, guardian = %peer.address, "Duplicate signature");
            return Ok(AggregationOutcome::Duplicate);
        }

        let snapshot = shard
            .get(&digest)
            .map(|s| Arc::clone(&s.guardian_set))
            .unwrap_or_else(|| Arc::clone(current_set));

        if let Err(failure) = verify_peer_signature(&peer, &snapshot) {
            metrics::record_observation_failed(failure.as_label());
            match &failure {
                VerificationFailure::UnknownGuardian(..) => debug!(
                    digest = %digest,
                    message_id = %peer.message_id,
                    error = %failure,
                    "Observation by unknown guardian, is our guardian set outdated?"
                ),
                _ => warn!(
                    digest = %digest,
                    message_id = %peer.message_id,
                    error = %failure,
                    "Rejected signed observation"
                ),
            }
            return Ok(AggregationOutcome::Rejected(failure));
        }

        metrics::record_observation_by_guardian(&peer.address.to_string());

        let state = shard.get_or_create(digest, now, &snapshot);
        if state.message_id.is_none() {
            state.message_id = Some(peer.message_id);
            state.tx_hash = peer.tx_hash;
        }
        state.record_signature(peer.address, peer.signature);

        self.try_finalize(digest, state).await
    }

    /// Record our own observation and signature, then check for quorum.
    pub(crate) async fn handle_self_observation(
        &self,
        shard: &mut StateShard,
        event: SelfObservation,
        now: Instant,
    ) -> ProcessorResult<AggregationOutcome> {
        let digest = event.digest;
        let state = shard.get_or_create(digest, now, &event.guardian_set);

        if state.submitted {
            return Ok(AggregationOutcome::AlreadySubmitted);
        }

        if state.our_observation.is_none() {
            state.message_id = Some(event.observation.message_id());
            state.tx_hash = event.observation.tx_hash.clone();
            state.our_observation = Some(event.observation);
            state.our_message = Some(event.gossip);
        }

        if state.guardian_set.contains(&event.address) {
            state.record_signature(event.address, event.signature);
        } else {
            debug!(
                digest = %digest,
                index = state.guardian_set.index,
                "Our key is not in the guardian set for this digest"
            );
        }

        self.try_finalize(digest, state).await
    }

    /// Assemble, store and gossip the VAA if `state` has everything it needs.
    async fn try_finalize(
        &self,
        digest: Digest,
        state: &mut AggregationState,
    ) -> ProcessorResult<AggregationOutcome> {
        if state.submitted {
            return Ok(AggregationOutcome::AlreadySubmitted);
        }

        let need = state.quorum();
        if state.signatures.len() < need {
            debug!(digest = %digest, have = state.signatures.len(), need, "Quorum not yet met");
            return Ok(AggregationOutcome::Pending {
                have: state.signatures.len(),
                need,
            });
        }

        let Some(observation) = &state.our_observation else {
            debug!(digest = %digest, "Quorum met but message not yet observed locally");
            return Ok(AggregationOutcome::AwaitingLocalObservation);
        };

        let signatures = state.ordered_signatures();
        if signatures.len() < need {
            debug!(
                digest = %digest,
                have = signatures.len(),
                need,
                "Quorum not met after aggregation, guardian set change?"
            );
            return Ok(AggregationOutcome::Pending {
                have: signatures.len(),
                need,
            });
        }

        let mut vaa = observation.create_vaa(state.guardian_set.index);
        vaa.signatures = signatures;

        info!(
            digest = %digest,
            message_id = %vaa.message_id(),
            signatures = vaa.signatures.len(),
            "Signed VAA with quorum"
        );

        if let Err(e) = self.store.store_vaa(&vaa).await {
            error!(digest = %digest, message_id = %vaa.message_id(), error = %e, "Failed to store signed VAA");
        }
        metrics::record_quorum_reached("local");

        self.broadcaster.broadcast_signed_vaa(&vaa)?;
        state.submitted = true;

        Ok(AggregationOutcome::Submitted)
    }

    /// Verify and persist a VAA that some other guardian assembled. Returns
    /// whether it was stored.
    pub(crate) async fn handle_quorum_vaa(&self, message: SignedVaaWithQuorum) -> bool {
        let vaa = match Vaa::unmarshal(&message.vaa) {
            Ok(vaa) => vaa,
            Err(e) => {
                warn!(error = %e, "Received invalid VAA in SignedVaaWithQuorum message");
                return false;
            }
        };

        let message_id = vaa.message_id();
        if self.store.has_vaa(&message_id).await {
            debug!(message_id = %message_id, "Ignoring SignedVaaWithQuorum for VAA we already stored");
            return false;
        }

        let digest = vaa.signing_digest();
        let Some(guardian_set) = self.guardian_sets.current_set() else {
            warn!(
                digest = %digest,
                message_id = %message_id,
                "Dropping SignedVaaWithQuorum, guardian set not initialized"
            );
            return false;
        };

        if let Err(e) = vaa.verify(&guardian_set) {
            warn!(
                digest = %digest,
                message_id = %message_id,
                error = %e,
                "Dropping SignedVaaWithQuorum, verification failed"
            );
            return false;
        }

        debug!(digest = %digest, message_id = %message_id, "Storing inbound signed VAA with quorum");
        if let Err(e) = self.store.store_vaa(&vaa).await {
            error!(message_id = %message_id, error = %e, "Failed to store signed VAA");
            return false;
        }
        metrics::record_quorum_reached("gossip");

        true
    }
}
