//! secp256k1 guardian key adapter

use crate::domain::{address_from_pubkey, Digest, GuardianAddress, SignatureBytes, SignerError};
use crate::ports::GuardianSigner;
use k256::ecdsa::SigningKey;

/// Signs digests with an in-memory secp256k1 key.
pub struct KeySigner {
    key: SigningKey,
    address: GuardianAddress,
}

impl KeySigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_from_pubkey(key.verifying_key());
        Self { key, address }
    }

    /// Parse a 32-byte hex secret, with or without `0x` prefix.
    pub fn from_hex(secret: &str) -> Result<Self, SignerError> {
        let raw = hex::decode(secret.trim().trim_start_matches("0x"))
            .map_err(|e| SignerError(format!("guardian key is not hex: {e}")))?;
        let key = SigningKey::from_slice(&raw)
            .map_err(|_| SignerError("guardian key is not a valid secp256k1 scalar".into()))?;
        Ok(Self::new(key))
    }
}

impl GuardianSigner for KeySigner {
    fn sign(&self, digest: &Digest) -> Result<SignatureBytes, SignerError> {
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| SignerError(e.to_string()))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recid.to_byte();
        Ok(out)
    }

    fn address(&self) -> GuardianAddress {
        self.address
    }
}
