//! OpenSSH public key encoding.
//!
//! Public keys are stored in the single-line `authorized_keys` form
//! `ssh-rsa <base64 blob> [comment]`, where the blob is the wire encoding of
//! the key type, exponent and modulus.

use crate::error::{Result, ValidationError, VaultError};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use openssl::pkey::{PKeyRef, Private};
use sha2::{Digest, Sha256};

const SSH_RSA: &str = "ssh-rsa";
const SSH_ED25519: &str = "ssh-ed25519";

fn put_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_mpint(out: &mut Vec<u8>, magnitude: &[u8]) {
    if magnitude.first().is_some_and(|b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(magnitude.len() + 1);
        padded.push(0);
        padded.extend_from_slice(magnitude);
        put_string(out, &padded);
    } else {
        put_string(out, magnitude);
    }
}

/// Render the public half of an RSA key pair as an OpenSSH public key line
pub fn encode_rsa_public_key(key_pair: &PKeyRef<Private>, comment: &str) -> Result<String> {
    let rsa = key_pair
        .rsa()
        .map_err(|e| VaultError::KeyGenerationError(format!("Key pair is not RSA: {e}")))?;

    let mut blob = Vec::new();
    put_string(&mut blob, SSH_RSA.as_bytes());
    put_mpint(&mut blob, &rsa.e().to_vec());
    put_mpint(&mut blob, &rsa.n().to_vec());

    let mut line = format!("{SSH_RSA} {}", STANDARD.encode(&blob));
    if !comment.is_empty() {
        line.push(' ');
        line.push_str(comment);
    }
    Ok(line)
}

/// Parsed view of an OpenSSH public key line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublicKey {
    key_type: String,
    key_length: u32,
    comment: String,
    fingerprint: String,
}

struct BlobReader<'a> {
    bytes: &'a [u8],
}

impl<'a> BlobReader<'a> {
    fn read_string(&mut self) -> Option<&'a [u8]> {
        let len = u32::from_be_bytes(self.bytes.get(..4)?.try_into().ok()?) as usize;
        let value = self.bytes.get(4..4 + len)?;
        self.bytes = &self.bytes[4 + len..];
        Some(value)
    }
}

fn bit_length(magnitude: &[u8]) -> u32 {
    let magnitude = match magnitude.iter().position(|b| *b != 0) {
        Some(start) => &magnitude[start..],
        None => return 0,
    };
    (magnitude.len() as u32 - 1) * 8 + (8 - magnitude[0].leading_zeros())
}

impl SshPublicKey {
    pub fn parse(line: &str) -> std::result::Result<Self, ValidationError> {
        let mut parts = line.trim().splitn(3, ' ');
        let key_type = parts.next().ok_or(ValidationError::InvalidPublicKey)?;
        let encoded = parts.next().ok_or(ValidationError::InvalidPublicKey)?;
        let comment = parts.next().unwrap_or_default().trim().to_string();

        let blob = STANDARD
            .decode(encoded)
            .map_err(|_| ValidationError::InvalidPublicKey)?;
        let mut reader = BlobReader { bytes: &blob };
        let embedded_type = reader.read_string().ok_or(ValidationError::InvalidPublicKey)?;
        if embedded_type != key_type.as_bytes() {
            return Err(ValidationError::InvalidPublicKey);
        }

        let key_length = match key_type {
            SSH_RSA => {
                let _exponent = reader.read_string().ok_or(ValidationError::InvalidPublicKey)?;
                let modulus = reader.read_string().ok_or(ValidationError::InvalidPublicKey)?;
                bit_length(modulus)
            }
            SSH_ED25519 => 256,
            _ => 0,
        };

        Ok(Self {
            key_type: key_type.to_string(),
            key_length,
            comment,
            fingerprint: format!("SHA256:{}", STANDARD_NO_PAD.encode(Sha256::digest(&blob))),
        })
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn key_length(&self) -> u32 {
        self.key_length
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{KeyPairGenerator, OpenSslKeyPairGenerator};

    #[test]
    fn test_encoded_key_parses_back() {
        let key_pair = OpenSslKeyPairGenerator.generate(2048).unwrap();
        let line = encode_rsa_public_key(&key_pair, "deploy@ci").unwrap();
        assert!(line.starts_with("ssh-rsa AAAAB3NzaC1yc2E"));

        let parsed = SshPublicKey::parse(&line).unwrap();
        assert_eq!(parsed.key_type(), "ssh-rsa");
        assert_eq!(parsed.key_length(), 2048);
        assert_eq!(parsed.comment(), "deploy@ci");
        assert!(parsed.fingerprint().starts_with("SHA256:"));
        assert!(!parsed.fingerprint().ends_with('='));
    }

    #[test]
    fn test_comment_is_optional() {
        let key_pair = OpenSslKeyPairGenerator.generate(2048).unwrap();
        let line = encode_rsa_public_key(&key_pair, "").unwrap();
        assert_eq!(line.split(' ').count(), 2);
        assert_eq!(SshPublicKey::parse(&line).unwrap().comment(), "");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(
            SshPublicKey::parse("ssh-rsa !!!"),
            Err(ValidationError::InvalidPublicKey)
        );
        assert_eq!(
            SshPublicKey::parse("ssh-rsa"),
            Err(ValidationError::InvalidPublicKey)
        );
    }
}
