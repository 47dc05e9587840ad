//! Encryption abstraction.
//!
//! [`EncryptionProvider`] is the opaque backend (HSM, KMS or the local
//! AES-GCM provider). [`Encryptor`] wraps it with null handling and failure
//! wrapping and is the only place where cleartext meets ciphertext.

pub mod local;

use crate::error::{EncryptionError, ProviderError};
use crate::types::KeyId;
use credvault_common::logging::Logger;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub use self::local::{AesGcmEncryptionProvider, LocalEncryptionKey};

/// Output of a provider encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCiphertext {
    pub key_id: KeyId,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Opaque encryption backend, keyed by the identifier of the key it used
pub trait EncryptionProvider: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<ProviderCiphertext, ProviderError>;
    fn decrypt(&self, key_id: &KeyId, ciphertext: &[u8], nonce: &[u8])
        -> Result<String, ProviderError>;
}

/// One encrypted field. Either all three parts are present or the blob is
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub key_id: Option<KeyId>,
    pub ciphertext: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
}

impl EncryptedBlob {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.key_id.is_some() && self.ciphertext.is_some() && self.nonce.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.key_id.is_none() && self.ciphertext.is_none() && self.nonce.is_none()
    }
}

/// A stored blob together with the id of the row holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedValue {
    pub uuid: Uuid,
    pub blob: EncryptedBlob,
}

impl EncryptedValue {
    pub fn new(blob: EncryptedBlob) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            blob,
        }
    }

    pub fn key_id(&self) -> Option<&KeyId> {
        self.blob.key_id.as_ref()
    }
}

/// Null-safe front for an [`EncryptionProvider`]
pub struct Encryptor {
    provider: Arc<dyn EncryptionProvider>,
    logger: Arc<Logger>,
}

impl fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryptor").finish_non_exhaustive()
    }
}

impl Encryptor {
    pub fn new(provider: Arc<dyn EncryptionProvider>, logger: Arc<Logger>) -> Self {
        Self { provider, logger }
    }

    /// Encrypt `cleartext`. `None` yields an empty blob without touching the
    /// provider.
    pub fn encrypt(&self, cleartext: Option<&str>) -> Result<EncryptedBlob, EncryptionError> {
        let Some(cleartext) = cleartext else {
            return Ok(EncryptedBlob::empty());
        };

        match self.provider.encrypt(cleartext) {
            Ok(encrypted) => {
                self.logger
                    .debug_args(format_args!("Encrypted value with key {}", encrypted.key_id));
                Ok(EncryptedBlob {
                    key_id: Some(encrypted.key_id),
                    ciphertext: Some(encrypted.ciphertext),
                    nonce: Some(encrypted.nonce),
                })
            }
            Err(e) => {
                self.logger.warn_args(format_args!("Encryption failed: {e}"));
                Err(EncryptionError::new(e))
            }
        }
    }

    /// Decrypt `blob`. A partially populated blob decrypts to `None` without
    /// touching the provider.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Option<String>, EncryptionError> {
        let (Some(key_id), Some(ciphertext), Some(nonce)) =
            (&blob.key_id, &blob.ciphertext, &blob.nonce)
        else {
            return Ok(None);
        };

        match self.provider.decrypt(key_id, ciphertext, nonce) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                self.logger
                    .warn_args(format_args!("Decryption with key {key_id} failed: {e}"));
                Err(EncryptionError::new(e))
            }
        }
    }
}
