//! # VAA (attestation record)
//!
//! Deterministic construction of the attestation record from an
//! [`Observation`] and its signing digest.
//!
//! ## Binary layout (version 1, big-endian)
//!
//! ```text
//! version u8 | guardian_set_index u32 | n u8 | n × (index u8, sig [65])
//! timestamp u32 | nonce u32 | emitter_chain u16 | emitter_address [32]
//! sequence u64 | consistency_level u8 | payload ...
//! ```
//!
//! The signing digest covers only the body (from `timestamp` onwards) and is
//! `keccak256(keccak256(body))`.

use super::crypto::{keccak256, recover_address};
use super::errors::VaaError;
use super::guardian_set::GuardianSet;
use super::observation::{MessageId, Observation};
use super::primitives::{ChainId, Digest, EmitterAddress, GuardianAddress, SignatureBytes};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

pub const SUPPORTED_VAA_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + 4 + 1;
const SIGNATURE_LEN: usize = 1 + 65;
const BODY_FIXED_LEN: usize = 4 + 4 + 2 + 32 + 8 + 1;

/// Minimum signatures for a guardian set of `n` members.
pub fn quorum(n: usize) -> usize {
    n * 2 / 3 + 1
}

/// A guardian's signature together with its index in the guardian set
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSignature {
    pub index: u8,
    #[serde_as(as = "Bytes")]
    pub signature: SignatureBytes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vaa {
    pub version: u8,
    pub guardian_set_index: u32,
    pub signatures: Vec<GuardianSignature>,
    pub timestamp: u32,
    pub nonce: u32,
    pub emitter_chain: ChainId,
    pub emitter_address: EmitterAddress,
    pub sequence: u64,
    pub consistency_level: u8,
    pub payload: Vec<u8>,
}

impl Vaa {
    /// Unsigned record for `observation`. Identical inputs always produce
    /// identical bytes.
    pub fn build_record(observation: &Observation, guardian_set_index: u32) -> Self {
        Self {
            version: SUPPORTED_VAA_VERSION,
            guardian_set_index,
            signatures: Vec::new(),
            timestamp: observation.timestamp,
            nonce: observation.nonce,
            emitter_chain: observation.emitter_chain,
            emitter_address: observation.emitter_address,
            sequence: observation.sequence,
            consistency_level: observation.consistency_level,
            payload: observation.payload.clone(),
        }
    }

    pub fn message_id(&self) -> MessageId {
        MessageId {
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            sequence: self.sequence,
        }
    }

    pub fn signing_body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BODY_FIXED_LEN + self.payload.len());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.emitter_chain.0.to_be_bytes());
        buf.extend_from_slice(&self.emitter_address.0);
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.push(self.consistency_level);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Hash of the hashed body. Hashing twice lets on-chain verifiers pass
    /// the 32-byte inner hash instead of the full body.
    pub fn signing_digest(&self) -> Digest {
        Digest(keccak256(&keccak256(&self.signing_body())))
    }

    pub fn marshal(&self) -> Vec<u8> {
        let body = self.signing_body();
        // The count is a single byte; anything past 255 signatures is dropped
        let count = u8::try_from(self.signatures.len()).unwrap_or(u8::MAX);
        let signatures = &self.signatures[..usize::from(count)];

        let mut buf =
            Vec::with_capacity(HEADER_LEN + signatures.len() * SIGNATURE_LEN + body.len());
        buf.push(self.version);
        buf.extend_from_slice(&self.guardian_set_index.to_be_bytes());
        buf.push(count);
        for sig in signatures {
            buf.push(sig.index);
            buf.extend_from_slice(&sig.signature);
        }
        buf.extend_from_slice(&body);
        buf
    }

    pub fn unmarshal(data: &[u8]) -> Result<Self, VaaError> {
        if data.len() < HEADER_LEN + BODY_FIXED_LEN {
            return Err(VaaError::TooShort(data.len()));
        }

        let version = data[0];
        if version != SUPPORTED_VAA_VERSION {
            return Err(VaaError::UnsupportedVersion(version));
        }

        let mut reader = Reader::new(&data[1..]);
        let guardian_set_index = reader.u32("guardian_set_index")?;
        let num_signatures = reader.u8("signature_count")? as usize;

        let mut signatures = Vec::with_capacity(num_signatures);
        for i in 0..num_signatures {
            let index = reader.u8("index").map_err(|_| VaaError::TruncatedSignature(i))?;
            let raw = reader
                .take(65, "signature")
                .map_err(|_| VaaError::TruncatedSignature(i))?;
            let mut signature = [0u8; 65];
            signature.copy_from_slice(raw);
            signatures.push(GuardianSignature { index, signature });
        }

        let timestamp = reader.u32("timestamp")?;
        let nonce = reader.u32("nonce")?;
        let emitter_chain = ChainId(reader.u16("emitter_chain")?);
        let mut emitter = [0u8; 32];
        emitter.copy_from_slice(reader.take(32, "emitter_address")?);
        let sequence = reader.u64("sequence")?;
        let consistency_level = reader.u8("consistency_level")?;

        // An empty payload is valid
        let payload = reader.rest();

        Ok(Self {
            version,
            guardian_set_index,
            signatures,
            timestamp,
            nonce,
            emitter_chain,
            emitter_address: EmitterAddress(emitter),
            sequence,
            consistency_level,
            payload: payload.to_vec(),
        })
    }

    /// Check every signature against the positional guardian `addresses`.
    ///
    /// Indexes must be strictly increasing, in range, and recover to the
    /// address at that index. No signer may appear twice.
    pub fn verify_signatures(&self, addresses: &[GuardianAddress]) -> bool {
        if addresses.len() < self.signatures.len() {
            return false;
        }

        let digest = self.signing_digest();
        let mut last_index: Option<u8> = None;

        for sig in &self.signatures {
            if sig.index as usize >= addresses.len() {
                return false;
            }
            if last_index.is_some_and(|last| sig.index <= last) {
                return false;
            }
            last_index = Some(sig.index);

            match recover_address(&digest, &sig.signature) {
                Ok(addr) if addr == addresses[sig.index as usize] => {}
                _ => return false,
            }
        }

        true
    }

    /// Full verification of a quorum VAA against `guardian_set`.
    pub fn verify(&self, guardian_set: &GuardianSet) -> Result<(), VaaError> {
        if guardian_set.is_empty() {
            return Err(VaaError::EmptyGuardianSet);
        }

        let quorum = guardian_set.quorum();
        if self.signatures.len() < quorum {
            return Err(VaaError::NoQuorum {
                got: self.signatures.len(),
                quorum,
            });
        }

        if !self.verify_signatures(&guardian_set.keys) {
            return Err(VaaError::InvalidSignatures);
        }

        Ok(())
    }
}

/// Cursor over a byte slice for [`Vaa::unmarshal`].
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], VaaError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(VaaError::TruncatedBody(field));
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, VaaError> {
        Ok(self.take(1, field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, VaaError> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2, field)?);
        Ok(u16::from_be_bytes(buf))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, VaaError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, field)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, VaaError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, field)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }
}
