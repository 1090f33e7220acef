//! # guardian-processor
//!
//! Observation aggregation core of a guardian node.
//!
//! ## Architecture
//!
//! Every guardian independently observes cross-chain messages, signs the
//! double-keccak digest of the message body and gossips the signature. Once a
//! supermajority (`n*2/3 + 1`) of the guardian set has signed the same digest,
//! the signatures are assembled into a VAA, persisted and gossiped.
//!
//! ```text
//! watchers ──Observation──→ [governor / accountant] ──→ sign ──SignedObservation──→ gossip
//!                                                         │
//! gossip ──SignedObservation──→ route(digest) ──→ lane ───┴──→ quorum ──SignedVaaWithQuorum──→ gossip
//!                                                              │
//!                                                              └──→ VaaStore
//! ```
//!
//! State for a digest is owned by exactly one lane, so aggregation needs no
//! locks. A periodic sweep expires, retries or re-requests stuck entries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guardian_processor::{GuardianProcessor, ProcessorConfig, ProcessorDependencies};
//!
//! let (processor, handle) = GuardianProcessor::new(deps, ProcessorConfig::default())?;
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(processor.run(shutdown_rx));
//!
//! handle.submit(InboundMessage::LocalObservation(observation)).await?;
//! ```
//!
//! ## Security
//!
//! - Peer signatures are recovered and checked against the guardian set
//!   frozen when the digest was first seen
//! - Inbound VAAs must carry a quorum of valid signatures
//! - Observations carrying the governance emitter raise an integrity alarm
//!   and are never signed

pub mod adapters;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::{
    ChannelGossip, ChannelReobservationSink, GuardianSetState, InMemoryVaaStore, KeySigner,
};
pub use domain::{
    quorum, BucketRouter, ChainId, Digest, EmitterAddress, GuardianAddress, GuardianSet,
    MessageId, Observation, ProcessorConfig, ProcessorError, ProcessorResult, Vaa,
};
pub use events::{GossipMessage, ObservationRequest, SignedObservation, SignedVaaWithQuorum};
pub use ports::{
    Accountant, GossipTransport, Governor, GuardianSetProvider, GuardianSigner, InboundMessage,
    ProcessorHandle, ReobservationSink, VaaStore,
};
pub use service::{GuardianProcessor, ProcessorDependencies, SweepReport};
