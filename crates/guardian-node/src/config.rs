//! # Node Configuration
//!
//! Identity and wiring parameters read from the environment. Processor
//! tuning lives in [`guardian_processor::ProcessorConfig`].
//!
//! ## Security Requirements
//!
//! - `GUARDIAN_KEY` MUST be set; the node refuses to start without a key

use std::fmt;
use std::sync::Arc;

use guardian_processor::domain::{SignerError, MAX_GUARDIANS};
use guardian_processor::{GuardianAddress, GuardianSet, GuardianSigner, KeySigner};
use thiserror::Error;

/// Default capacity of the outbound gossip queue.
pub const DEFAULT_GOSSIP_QUEUE: usize = 1024;

/// Configuration errors. Any of these aborts start-up.
#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("GUARDIAN_KEY is not set")]
    MissingKey,

    #[error("Invalid GUARDIAN_KEY: {0}")]
    InvalidKey(#[from] SignerError),

    #[error("Invalid guardian address in GUARDIAN_SET: {0}")]
    InvalidAddress(String),

    #[error("Guardian {0} listed twice in GUARDIAN_SET")]
    DuplicateGuardian(GuardianAddress),

    #[error("GUARDIAN_SET has {0} guardians, at most {MAX_GUARDIANS} are supported")]
    TooManyGuardians(usize),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Complete node configuration.
pub struct NodeConfig {
    /// This node's signing key.
    pub signer: Arc<KeySigner>,
    /// Initial guardian set.
    pub guardian_set: GuardianSet,
    /// Outbound gossip queue capacity.
    pub gossip_queue: usize,
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("address", &self.signer.address())
            .field("guardian_set", &self.guardian_set)
            .field("gossip_queue", &self.gossip_queue)
            .finish()
    }
}

impl NodeConfig {
    /// Load from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `GUARDIAN_KEY`: hex secp256k1 secret (required)
    /// - `GUARDIAN_SET`: comma-separated hex addresses (default: our own address)
    /// - `GUARDIAN_SET_INDEX`: index of that set (default: 0)
    /// - `GUARDIAN_GOSSIP_QUEUE`: gossip queue capacity (default: 1024)
    pub fn from_env() -> Result<Self, NodeConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NodeConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("GUARDIAN_KEY").ok_or(NodeConfigError::MissingKey)?;
        let signer = Arc::new(KeySigner::from_hex(&secret)?);

        let index = match lookup("GUARDIAN_SET_INDEX") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| NodeConfigError::InvalidValue {
                    key: "GUARDIAN_SET_INDEX",
                    value: raw,
                })?,
            None => 0,
        };

        let keys = match lookup("GUARDIAN_SET") {
            Some(raw) => parse_guardian_set(&raw)?,
            None => vec![signer.address()],
        };

        let gossip_queue = match lookup("GUARDIAN_GOSSIP_QUEUE") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(NodeConfigError::InvalidValue {
                        key: "GUARDIAN_GOSSIP_QUEUE",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_GOSSIP_QUEUE,
        };

        Ok(Self {
            signer,
            guardian_set: GuardianSet::new(index, keys),
            gossip_queue,
        })
    }
}

fn parse_guardian_set(raw: &str) -> Result<Vec<GuardianAddress>, NodeConfigError> {
    let mut keys: Vec<GuardianAddress> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let address = GuardianAddress::from_hex(entry)
            .ok_or_else(|| NodeConfigError::InvalidAddress(entry.to_string()))?;
        if keys.contains(&address) {
            return Err(NodeConfigError::DuplicateGuardian(address));
        }
        keys.push(address);
    }
    if keys.is_empty() {
        return Err(NodeConfigError::InvalidAddress(raw.to_string()));
    }
    if keys.len() > MAX_GUARDIANS {
        return Err(NodeConfigError::TooManyGuardians(keys.len()));
    }
    Ok(keys)
}
