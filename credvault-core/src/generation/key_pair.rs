use crate::error::{Result, VaultError};
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;

/// Source of fresh RSA key pairs. Injected so tests can count or stub
/// key generation.
pub trait KeyPairGenerator: Send + Sync {
    fn generate(&self, key_length: u32) -> Result<PKey<Private>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSslKeyPairGenerator;

impl KeyPairGenerator for OpenSslKeyPairGenerator {
    fn generate(&self, key_length: u32) -> Result<PKey<Private>> {
        let rsa = Rsa::generate(key_length).map_err(|e| {
            VaultError::KeyGenerationError(format!("Failed to generate {key_length}-bit RSA key: {e}"))
        })?;
        PKey::from_rsa(rsa).map_err(|e| VaultError::KeyGenerationError(e.to_string()))
    }
}

/// PKCS#8 PEM encoding of the private half
pub fn private_key_pem(key_pair: &PKeyRef<Private>) -> Result<String> {
    let pem = key_pair.private_key_to_pem_pkcs8()?;
    String::from_utf8(pem).map_err(|e| VaultError::SerializationError(e.to_string()))
}

/// SubjectPublicKeyInfo PEM encoding of the public half
pub fn public_key_pem(key_pair: &PKeyRef<Private>) -> Result<String> {
    let pem = key_pair.public_key_to_pem()?;
    String::from_utf8(pem).map_err(|e| VaultError::SerializationError(e.to_string()))
}

/// Modulus size of a PEM encoded RSA public key, 0 when unparseable
pub fn public_key_length(public_key_pem: &str) -> u32 {
    PKey::public_key_from_pem(public_key_pem.as_bytes())
        .map(|key| key.bits())
        .unwrap_or(0)
}
