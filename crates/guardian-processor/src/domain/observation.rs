//! Locally observed messages and their identity

use super::primitives::{ChainId, EmitterAddress};
use super::vaa::Vaa;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A message published on a source chain, as confirmed by a watcher.
///
/// Immutable once produced. Owned by the aggregation state that first
/// captures it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub tx_hash: Vec<u8>,
    /// Unix seconds
    pub timestamp: u32,
    pub nonce: u32,
    pub sequence: u64,
    pub consistency_level: u8,
    pub emitter_chain: ChainId,
    pub emitter_address: EmitterAddress,
    pub payload: Vec<u8>,
    /// Set when the watcher cannot re-observe this message on request
    pub unreliable: bool,
    pub is_reobservation: bool,
}

impl Observation {
    pub fn message_id(&self) -> MessageId {
        MessageId {
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            sequence: self.sequence,
        }
    }

    /// Whether a re-observation can be requested for this message.
    pub fn is_reliable(&self) -> bool {
        !self.unreliable
    }

    /// Build the unsigned VAA for this observation.
    pub fn create_vaa(&self, guardian_set_index: u32) -> Vaa {
        Vaa::build_record(self, guardian_set_index)
    }
}

/// Identity of a message: `(emitter_chain, emitter_address, sequence)`.
///
/// Key of the persistent VAA store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId {
    pub emitter_chain: ChainId,
    pub emitter_address: EmitterAddress,
    pub sequence: u64,
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.emitter_chain, self.emitter_address, self.sequence
        )
    }
}

impl FromStr for MessageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 3 {
            return Err(format!("expected chain/emitter/sequence, got {s:?}"));
        }

        let chain = parts[0]
            .parse::<u16>()
            .map_err(|e| format!("invalid chain id {:?}: {e}", parts[0]))?;
        let emitter = EmitterAddress::from_hex(parts[1])
            .ok_or_else(|| format!("invalid emitter address {:?}", parts[1]))?;
        let sequence = parts[2]
            .parse::<u64>()
            .map_err(|e| format!("invalid sequence {:?}: {e}", parts[2]))?;

        Ok(MessageId {
            emitter_chain: ChainId(chain),
            emitter_address: emitter,
            sequence,
        })
    }
}
