//! Primitive identifiers shared by every part of the processor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw 32-byte hash
pub type Hash = [u8; 32];

/// Recoverable secp256k1 signature: `r || s || v`
pub type SignatureBytes = [u8; 65];

/// Signing digest of a VAA body. Content-addresses all aggregation state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(pub Hash);

impl Digest {
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// First 8 bytes read as a big-endian integer. Input to the bucket router.
    pub fn bucket_key(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <Hash>::try_from(bytes).ok().map(Self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(self.0))
    }
}

/// Ethereum-style guardian address (last 20 bytes of keccak256(pubkey))
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GuardianAddress(pub [u8; 20]);

impl GuardianAddress {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }

    /// Parse a hex address, with or without `0x` prefix.
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = hex::decode(s.trim().trim_start_matches("0x")).ok()?;
        Self::from_slice(&raw)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for GuardianAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for GuardianAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Emitter address on the source chain, left-padded to 32 bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EmitterAddress(pub [u8; 32]);

impl EmitterAddress {
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = hex::decode(s).ok()?;
        <[u8; 32]>::try_from(raw.as_slice()).ok().map(Self)
    }
}

impl fmt::Display for EmitterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for EmitterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Source chain identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ChainId(pub u16);

impl ChainId {
    pub const SOLANA: ChainId = ChainId(1);
    pub const ETHEREUM: ChainId = ChainId(2);
    /// High-volume oracle chain whose VAAs are cached in memory only
    pub const PYTHNET: ChainId = ChainId(26);
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain that hosts the governance emitter
pub const GOVERNANCE_CHAIN: ChainId = ChainId::SOLANA;

/// Reserved governance emitter. Must never appear in a normal observation.
pub const GOVERNANCE_EMITTER: EmitterAddress = EmitterAddress([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4,
]);
