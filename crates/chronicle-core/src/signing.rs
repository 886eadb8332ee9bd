//! HMAC-SHA256 entry signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use chronicle_contracts::error::{LedgerError, LedgerResult};

use crate::traits::EntrySigner;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// Signs entry hashes with a shared secret.
///
/// The stored signature is the lowercase hex HMAC-SHA256 of the entry hash's
/// ASCII bytes.
pub struct HmacSigner {
    key_id: String,
    /// Keyed MAC state; cloned per signature.
    mac: HmacSha256,
}

impl HmacSigner {
    /// Build a signer from raw key bytes.
    ///
    /// Returns `LedgerError::Config` for keys shorter than `MIN_KEY_LEN`.
    pub fn new(key_id: impl Into<String>, key: impl Into<Vec<u8>>) -> LedgerResult<Self> {
        let key = key.into();
        if key.len() < MIN_KEY_LEN {
            return Err(LedgerError::Config {
                reason: format!(
                    "signing key must be at least {} bytes, got {}",
                    MIN_KEY_LEN,
                    key.len()
                ),
            });
        }
        let mac = HmacSha256::new_from_slice(&key).map_err(|e| LedgerError::Config {
            reason: format!("signing key rejected: {}", e),
        })?;
        Ok(Self {
            key_id: key_id.into(),
            mac,
        })
    }

    /// Build a signer from a hex-encoded key.
    pub fn from_hex(key_id: impl Into<String>, key_hex: &str) -> LedgerResult<Self> {
        let key = hex::decode(key_hex.trim()).map_err(|e| LedgerError::Config {
            reason: format!("signing key is not valid hex: {}", e),
        })?;
        Self::new(key_id, key)
    }

    fn mac(&self, entry_hash: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(entry_hash.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl EntrySigner for HmacSigner {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, entry_hash: &str) -> String {
        hex::encode(self.mac(entry_hash))
    }

    fn verify(&self, entry_hash: &str, signature: &str) -> bool {
        let Ok(stored) = hex::decode(signature) else {
            return false;
        };
        let computed = self.mac(entry_hash);
        if stored.len() != computed.len() {
            return false;
        }
        stored.ct_eq(computed.as_slice()).into()
    }
}
