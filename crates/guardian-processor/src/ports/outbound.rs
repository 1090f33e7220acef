//! Driven ports (Outbound dependencies)
//!
//! Everything the processor needs from the rest of the node. Implementations
//! for tests and single-process deployments live in [`crate::adapters`].

use crate::domain::{
    ChainId, Digest, EmitterAddress, GuardianAddress, GuardianSet, MessageId, Observation,
    SignatureBytes, SignerError, StoreError, TransportError, Vaa,
};
use crate::events::ObservationRequest;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistent store of completed VAAs, keyed by message id.
///
/// Point reads and writes only. Each call is expected to be atomic on its
/// own; the processor never needs a transaction spanning calls.
#[async_trait]
pub trait VaaStore: Send + Sync {
    async fn has_vaa(&self, id: &MessageId) -> Result<bool, StoreError>;

    async fn get_vaa_bytes(&self, id: &MessageId) -> Result<Vec<u8>, StoreError>;

    async fn store_vaa(&self, vaa: &Vaa) -> Result<(), StoreError>;
}

/// Rate limiter for value-moving messages.
#[async_trait]
pub trait Governor: Send + Sync {
    /// `Ok(true)` if the message may be published now. `Ok(false)` means the
    /// governor queued it and will hand it back from [`release_pending`].
    ///
    /// [`release_pending`]: Governor::release_pending
    async fn admit(&self, observation: &Observation) -> Result<bool, String>;

    /// Messages whose hold period expired since the last call.
    async fn release_pending(&self) -> Result<Vec<Observation>, String>;

    fn is_governed(&self, emitter_chain: ChainId, emitter_address: &EmitterAddress) -> bool;
}

/// Cross-chain balance accountant.
#[async_trait]
pub trait Accountant: Send + Sync {
    /// `Ok(true)` if the message may be published now. `Ok(false)` means it
    /// is pending approval and will come back through
    /// [`ProcessorHandle::submit_accountant_release`](crate::ports::ProcessorHandle::submit_accountant_release).
    async fn submit_observation(&self, observation: &Observation) -> Result<bool, String>;

    /// Whether the accountant is responsible for this message at all.
    fn covers(&self, observation: &Observation) -> bool;
}

/// Channel back to the watchers.
pub trait ReobservationSink: Send + Sync {
    fn request_reobservation(&self, request: ObservationRequest) -> Result<(), String>;
}

/// Source of the currently active guardian set.
pub trait GuardianSetProvider: Send + Sync {
    /// `None` until the first set is known.
    fn current_set(&self) -> Option<Arc<GuardianSet>>;
}

/// Outbound gossip. Must not block: a full queue is reported, not waited on.
pub trait GossipTransport: Send + Sync {
    fn send(&self, message: Vec<u8>) -> Result<(), TransportError>;
}

/// This node's guardian key.
pub trait GuardianSigner: Send + Sync {
    fn sign(&self, digest: &Digest) -> Result<SignatureBytes, SignerError>;

    fn address(&self) -> GuardianAddress;
}
