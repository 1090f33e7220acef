//! Error types for the guardian processor
//!
//! Only [`ProcessorError`] is fatal. Verification failures are counted and
//! dropped, store errors are logged, and neither ever leaves a worker.

use super::primitives::GuardianAddress;
use thiserror::Error;

/// Failures while recovering a signer from a signature.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Invalid signature format")]
    InvalidFormat,

    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    #[error("Failed to recover public key")]
    RecoveryFailed,
}

/// VAA decoding and verification errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaaError {
    #[error("VAA is too short: {0} bytes")]
    TooShort(usize),

    #[error("Unsupported VAA version: {0}")]
    UnsupportedVersion(u8),

    #[error("Failed to read signature [{0}]")]
    TruncatedSignature(usize),

    #[error("Failed to read body field: {0}")]
    TruncatedBody(&'static str),

    #[error("Guardian set has no keys")]
    EmptyGuardianSet,

    #[error("Insufficient signatures: {got}, quorum is {quorum}")]
    NoQuorum { got: usize, quorum: usize },

    #[error("Invalid guardian signatures")]
    InvalidSignatures,
}

/// Why an inbound signed observation was dropped. Counted by cause.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationFailure {
    #[error("malformed observation: {0}")]
    Malformed(&'static str),

    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(SignatureError),

    #[error("address {claimed} does not match recovered signer {recovered}")]
    PubkeyMismatch {
        claimed: GuardianAddress,
        recovered: GuardianAddress,
    },

    #[error("guardian {0} is not in guardian set {1}")]
    UnknownGuardian(GuardianAddress, u32),

    #[error("guardian set not initialized")]
    UninitializedGuardianSet,
}

impl VerificationFailure {
    /// Metric label for this failure cause.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::InvalidMessageId(_) => "invalid_message_id",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::PubkeyMismatch { .. } => "pubkey_mismatch",
            Self::UnknownGuardian(..) => "unknown_guardian",
            Self::UninitializedGuardianSet => "uninitialized_guardian_set",
        }
    }
}

/// Persistent store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("VAA not found")]
    NotFound,

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Signer failures. The node cannot operate without its key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Signing failed: {0}")]
pub struct SignerError(pub String);

/// Outbound gossip transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Outbound gossip queue is full")]
    QueueFull,

    #[error("Outbound gossip queue is closed")]
    Closed,
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Timeouts out of order: {0}")]
    TimeoutOrdering(&'static str),

    #[error("Invalid lane configuration: {priority} priority lanes of {total} total")]
    InvalidLanes { priority: usize, total: usize },

    #[error("Queue capacity must be non-zero: {0}")]
    ZeroCapacity(&'static str),

    #[error("Worker factor must be a finite number, positive or zero, got {0}")]
    InvalidWorkerFactor(f64),
}

/// Fatal processor errors. Any of these stops every worker.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Signing(#[from] SignerError),

    #[error("Outbound gossip queue full, refusing to drop consensus traffic")]
    GossipQueueFull,

    #[error("Outbound gossip queue closed")]
    GossipClosed,

    #[error("Failed to encode gossip message: {0}")]
    Encoding(String),

    #[error("Governor released a message that is not governed: {0}")]
    GovernorViolation(String),

    #[error("Governor failed: {0}")]
    Governor(String),

    #[error("Accountant published a message it does not cover: {0}")]
    AccountantViolation(String),

    #[error("Accountant event received but no accountant is configured")]
    AccountantNotConfigured,

    #[error("Internal channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

impl From<TransportError> for ProcessorError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::QueueFull => ProcessorError::GossipQueueFull,
            TransportError::Closed => ProcessorError::GossipClosed,
        }
    }
}

/// Result type for processor operations
pub type ProcessorResult<T> = Result<T, ProcessorError>;
