//! # secp256k1 helpers
//!
//! Keccak hashing, public-key recovery and Ethereum-style address derivation.
//! Signatures are 65 bytes: `r || s || v` with `v` in `{0, 1, 27, 28}`.

use super::errors::SignatureError;
use super::primitives::{Digest, GuardianAddress, Hash, SignatureBytes};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest as _, Keccak256};

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Derive the guardian address from a public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> GuardianAddress {
    let pubkey_bytes = public_key.to_encoded_point(false);

    // Skip the 0x04 uncompressed-point prefix
    let hash = keccak256(&pubkey_bytes.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    GuardianAddress(address)
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover_address(
    digest: &Digest,
    signature: &SignatureBytes,
) -> Result<GuardianAddress, SignatureError> {
    let recovery_id = parse_recovery_id(signature[64])?;

    let sig = Signature::from_slice(&signature[..64]).map_err(|_| SignatureError::InvalidFormat)?;

    let recovered = VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered))
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };

    RecoveryId::try_from(id).map_err(|_| SignatureError::InvalidRecoveryId(v))
}
