//! Aggregation state per digest and the lane-owned shard that holds it.

use super::guardian_set::GuardianSet;
use super::observation::{MessageId, Observation};
use super::primitives::{Digest, GuardianAddress, SignatureBytes};
use super::vaa::GuardianSignature;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Where a digest sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationPhase {
    /// Peer signatures only, below quorum.
    Collecting,
    /// Own observation present, quorum not met.
    Observed,
    /// Quorum met via peers, own observation still missing.
    WaitingOnLocalObservation,
    Submitted,
}

/// In-memory record of everything known about one digest.
#[derive(Clone, Debug)]
pub struct AggregationState {
    pub first_observed: Instant,
    pub last_retry: Instant,
    pub retry_count: u32,
    /// Set once this node observes the message itself
    pub our_observation: Option<Observation>,
    /// Encoded gossip message carrying our own signature, kept for retransmit
    pub our_message: Option<Vec<u8>>,
    pub message_id: Option<MessageId>,
    pub tx_hash: Vec<u8>,
    pub signatures: HashMap<GuardianAddress, SignatureBytes>,
    pub submitted: bool,
    /// Set active when this entry was created. Never replaced.
    pub guardian_set: Arc<GuardianSet>,
}

impl AggregationState {
    pub fn new(now: Instant, guardian_set: Arc<GuardianSet>) -> Self {
        Self {
            first_observed: now,
            last_retry: now,
            retry_count: 0,
            our_observation: None,
            our_message: None,
            message_id: None,
            tx_hash: Vec::new(),
            signatures: HashMap::new(),
            submitted: false,
            guardian_set,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_observed)
    }

    pub fn is_owned(&self) -> bool {
        self.our_observation.is_some()
    }

    pub fn has_signature(&self, address: &GuardianAddress) -> bool {
        self.signatures.contains_key(address)
    }

    /// Returns `false` if `address` already signed.
    pub fn record_signature(&mut self, address: GuardianAddress, signature: SignatureBytes) -> bool {
        if self.signatures.contains_key(&address) {
            return false;
        }
        self.signatures.insert(address, signature);
        true
    }

    pub fn quorum(&self) -> usize {
        self.guardian_set.quorum()
    }

    pub fn has_quorum(&self) -> bool {
        self.signatures.len() >= self.quorum()
    }

    pub fn phase(&self) -> AggregationPhase {
        match (self.submitted, self.has_quorum(), self.is_owned()) {
            (true, _, _) => AggregationPhase::Submitted,
            (false, true, false) => AggregationPhase::WaitingOnLocalObservation,
            (false, _, true) => AggregationPhase::Observed,
            (false, false, false) => AggregationPhase::Collecting,
        }
    }

    /// Signatures ordered by the signer's index in the snapshot. Signers that
    /// are not members, or whose index does not fit in a byte, are skipped.
    pub fn ordered_signatures(&self) -> Vec<GuardianSignature> {
        let mut out: Vec<GuardianSignature> = self
            .signatures
            .iter()
            .filter_map(|(addr, sig)| {
                let index = self.guardian_set.key_index(addr)?;
                Some(GuardianSignature {
                    index: u8::try_from(index).ok()?,
                    signature: *sig,
                })
            })
            .collect();
        out.sort_by_key(|s| s.index);
        out
    }
}

/// Aggregation states owned by a single lane worker.
#[derive(Debug, Default)]
pub struct StateShard {
    entries: HashMap<Digest, AggregationState>,
}

impl StateShard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing state for `digest`, or a fresh one frozen on `guardian_set`.
    pub fn get_or_create(
        &mut self,
        digest: Digest,
        now: Instant,
        guardian_set: &Arc<GuardianSet>,
    ) -> &mut AggregationState {
        self.entries
            .entry(digest)
            .or_insert_with(|| AggregationState::new(now, Arc::clone(guardian_set)))
    }

    pub fn get(&self, digest: &Digest) -> Option<&AggregationState> {
        self.entries.get(digest)
    }

    pub fn get_mut(&mut self, digest: &Digest) -> Option<&mut AggregationState> {
        self.entries.get_mut(digest)
    }

    pub fn remove(&mut self, digest: &Digest) -> Option<AggregationState> {
        self.entries.remove(digest)
    }

    pub fn digests(&self) -> Vec<Digest> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
