//! Message Observer
//!
//! Turns a locally confirmed observation into our signature: build the
//! record against the current guardian set, sign its digest, gossip the
//! signature and hand a [`SelfObservation`] to the owning lane.

use super::ProcessorContext;
use crate::domain::{Observation, ProcessorResult, GOVERNANCE_CHAIN, GOVERNANCE_EMITTER};
use crate::events::SelfObservation;
use crate::metrics;
use tracing::{debug, error, warn};

impl ProcessorContext {
    /// Cheap checks every local observation passes before the governor and
    /// accountant see it. `false` means drop.
    pub(crate) fn accept_local(&self, observation: &Observation) -> bool {
        if observation.emitter_chain == GOVERNANCE_CHAIN
            && observation.emitter_address == GOVERNANCE_EMITTER
        {
            metrics::record_integrity_alarm();
            let message_id = observation.message_id();
            if self.config.downgrade_integrity_alarms {
                warn!(message_id = %message_id, "Observation carries the governance emitter, dropping");
            } else {
                error!(message_id = %message_id, "INTEGRITY ALARM: observation carries the governance emitter, dropping");
            }
            return false;
        }

        if self.guardian_sets.current_set().is_none() {
            warn!(
                message_id = %observation.message_id(),
                "Dropping local observation, guardian set not initialized"
            );
            return false;
        }

        true
    }

    /// Sign and gossip `observation`. Returns the event for the owning lane,
    /// or `None` if the message needs no signature.
    ///
    /// Signing and gossip failures are fatal.
    pub(crate) async fn observe_message(
        &self,
        observation: Observation,
    ) -> ProcessorResult<Option<SelfObservation>> {
        let Some(guardian_set) = self.guardian_sets.current_set() else {
            warn!(
                message_id = %observation.message_id(),
                "Dropping local observation, guardian set not initialized"
            );
            return Ok(None);
        };

        let message_id = observation.message_id();
        if self.store.has_vaa(&message_id).await {
            debug!(message_id = %message_id, "VAA already stored, not signing");
            return Ok(None);
        }

        let vaa = observation.create_vaa(guardian_set.index);
        let digest = vaa.signing_digest();
        let signature = self.signer.sign(&digest)?;
        let address = self.signer.address();

        debug!(
            digest = %digest,
            message_id = %message_id,
            tx_hash = %hex::encode(&observation.tx_hash),
            reobservation = observation.is_reobservation,
            "Observed and signed message"
        );
        metrics::record_message_signed(&observation.emitter_chain.to_string());

        let gossip = self.broadcaster.broadcast_signature(
            address,
            digest,
            signature,
            observation.tx_hash.clone(),
            message_id,
        )?;

        Ok(Some(SelfObservation {
            digest,
            observation,
            address,
            signature,
            gossip,
            guardian_set,
        }))
    }
}
