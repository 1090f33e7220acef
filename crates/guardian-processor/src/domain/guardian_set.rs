//! Guardian set domain entity

use super::primitives::GuardianAddress;
use super::vaa::quorum;
use std::collections::HashMap;

/// Signer indexes are a single byte on the wire.
pub const MAX_GUARDIANS: usize = u8::MAX as usize;

/// Ordered, versioned guardian membership.
///
/// Aggregation states hold an `Arc` snapshot of the set that was active
/// when they were created; quorum is always computed against that snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardianSet {
    pub index: u32,
    pub keys: Vec<GuardianAddress>,
    /// Unix seconds after which the set is no longer valid. `None` for the
    /// current set.
    pub expiration_time: Option<u64>,
    lookup: HashMap<GuardianAddress, usize>,
}

impl GuardianSet {
    pub fn new(index: u32, keys: Vec<GuardianAddress>) -> Self {
        let lookup = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
        Self {
            index,
            keys,
            expiration_time: None,
            lookup,
        }
    }

    pub fn with_expiration(mut self, expiration_time: u64) -> Self {
        self.expiration_time = Some(expiration_time);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether every member can be addressed by a one-byte signer index.
    pub fn fits_wire_format(&self) -> bool {
        self.keys.len() <= MAX_GUARDIANS
    }

    /// Position of `address` in the set.
    pub fn key_index(&self, address: &GuardianAddress) -> Option<usize> {
        self.lookup.get(address).copied()
    }

    pub fn contains(&self, address: &GuardianAddress) -> bool {
        self.lookup.contains_key(address)
    }

    /// Minimum number of signatures for this set.
    pub fn quorum(&self) -> usize {
        quorum(self.keys.len())
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.expiration_time.is_some_and(|t| now_secs > t)
    }

    pub fn keys_as_hex(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.to_string()).collect()
    }
}
