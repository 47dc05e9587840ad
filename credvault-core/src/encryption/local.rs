//! Local encryption provider.
//!
//! Intention:
//! * Encrypt credential fields with AES-GCM-256 under the active key.
//! * Derive each 256-bit key from a configured secret via HKDF-SHA256.
//! * Keep inactive keys around for decryption only, so stored data can be
//!   re-encrypted under the active key.

use crate::encryption::{EncryptionProvider, ProviderCiphertext};
use crate::error::ProviderError;
use crate::types::KeyId;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

pub const SYMMETRIC_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

const KEY_DERIVATION_INFO: &[u8] = b"credvault_encryption_key_v1";

/* -------------------------------------------------------------------------
 * Key material
 * ---------------------------------------------------------------------- */

/// A derived AES-256 key and its identifier
pub struct LocalEncryptionKey {
    id: KeyId,
    key: [u8; SYMMETRIC_KEY_LEN],
}

impl fmt::Debug for LocalEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEncryptionKey")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl LocalEncryptionKey {
    /// Derive a key from `secret`. Without an explicit id the key is named by
    /// a SHA-256 fingerprint of the derived key, so the same secret always
    /// maps to the same id.
    pub fn derive(secret: &str, key_id: Option<KeyId>) -> Result<Self, ProviderError> {
        if secret.is_empty() {
            return Err(ProviderError::Crypto("empty key secret".to_string()));
        }
        let key = hkdf_derive(secret.as_bytes(), KEY_DERIVATION_INFO)?;
        let id = key_id.unwrap_or_else(|| {
            let fingerprint = Sha256::digest(key);
            KeyId::new(hex::encode(&fingerprint[..16]))
        });
        Ok(Self { id, key })
    }

    pub fn id(&self) -> &KeyId {
        &self.id
    }
}

/* -------------------------------------------------------------------------
 * Provider
 * ---------------------------------------------------------------------- */

pub struct AesGcmEncryptionProvider {
    active: KeyId,
    keys: HashMap<KeyId, [u8; SYMMETRIC_KEY_LEN]>,
}

impl fmt::Debug for AesGcmEncryptionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmEncryptionProvider")
            .field("active", &self.active)
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl AesGcmEncryptionProvider {
    pub fn new(active: LocalEncryptionKey, inactive: Vec<LocalEncryptionKey>) -> Self {
        let mut keys = HashMap::with_capacity(inactive.len() + 1);
        for key in inactive {
            keys.insert(key.id, key.key);
        }
        let active_id = active.id.clone();
        keys.insert(active.id, active.key);
        Self {
            active: active_id,
            keys,
        }
    }

    pub fn active_key_id(&self) -> &KeyId {
        &self.active
    }
}

impl EncryptionProvider for AesGcmEncryptionProvider {
    fn encrypt(&self, plaintext: &str) -> Result<ProviderCiphertext, ProviderError> {
        let key = self
            .keys
            .get(&self.active)
            .ok_or_else(|| ProviderError::UnknownKey(self.active.clone()))?;
        let (ciphertext, nonce) = encrypt(key, plaintext.as_bytes())?;
        Ok(ProviderCiphertext {
            key_id: self.active.clone(),
            ciphertext,
            nonce: nonce.to_vec(),
        })
    }

    fn decrypt(
        &self,
        key_id: &KeyId,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<String, ProviderError> {
        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| ProviderError::UnknownKey(key_id.clone()))?;
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| ProviderError::Crypto("invalid nonce length".to_string()))?;
        let plain = decrypt(key, ciphertext, &nonce)?;
        String::from_utf8(plain)
            .map_err(|_| ProviderError::Crypto("decrypted value is not UTF-8".to_string()))
    }
}

/* -------------------------------------------------------------------------
 * Encrypt / Decrypt helpers
 * ---------------------------------------------------------------------- */

fn encrypt(
    key: &[u8; SYMMETRIC_KEY_LEN],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN]), ProviderError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ProviderError::Crypto(format!("AES init failed: {e}")))?;
    let nonce: [u8; NONCE_LEN] = Aes256Gcm::generate_nonce(&mut OsRng).into();
    let ciphertext = cipher
        .encrypt(&nonce.into(), plaintext)
        .map_err(|_| ProviderError::Crypto("AES-GCM encryption failed".to_string()))?;
    Ok((ciphertext, nonce))
}

fn decrypt(
    key: &[u8; SYMMETRIC_KEY_LEN],
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>, ProviderError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ProviderError::Crypto(format!("AES init failed: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ProviderError::Crypto("AES-GCM authentication failed".to_string()))
}

fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; SYMMETRIC_KEY_LEN], ProviderError> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; SYMMETRIC_KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| ProviderError::Crypto(format!("HKDF error: {e}")))?;
    Ok(okm)
}
