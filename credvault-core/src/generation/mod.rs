//! Generation parameters and credential generators.
//!
//! Parameters are validated when they are constructed or generated from, and
//! compared structurally to decide whether a regeneration request would
//! produce a materially different credential.

pub mod key_pair;
pub mod password;

use crate::certificate::{CertificateGenerationParameters, CertificateGenerator};
use crate::credential::{CredentialValue, KeyPairCredentialValue, UserCredentialValue};
use crate::error::{Result, ValidationError};
use crate::ssh;
use crate::types::CredentialType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use key_pair::{KeyPairGenerator, OpenSslKeyPairGenerator};

pub const DEFAULT_KEY_LENGTH: u32 = 2048;
pub const VALID_KEY_LENGTHS: [u32; 3] = [2048, 3072, 4096];
pub const DEFAULT_PASSWORD_LENGTH: usize = 30;
pub const MIN_PASSWORD_LENGTH: usize = 4;
pub const MAX_PASSWORD_LENGTH: usize = 200;

pub fn validate_key_length(key_length: u32) -> std::result::Result<(), ValidationError> {
    if VALID_KEY_LENGTHS.contains(&key_length) {
        Ok(())
    } else {
        Err(ValidationError::InvalidKeyLength(key_length))
    }
}

/* ------------------------------ Parameters ------------------------------- */

/// Parameters for password and user credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringGenerationParameters {
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub exclude_lower: bool,
    #[serde(default)]
    pub exclude_upper: bool,
    #[serde(default)]
    pub exclude_number: bool,
    #[serde(default)]
    pub include_special: bool,
}

impl Default for StringGenerationParameters {
    fn default() -> Self {
        Self {
            length: DEFAULT_PASSWORD_LENGTH,
            username: None,
            exclude_lower: false,
            exclude_upper: false,
            exclude_number: false,
            include_special: false,
        }
    }
}

impl StringGenerationParameters {
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Same parameters with the username dropped
    pub fn without_username(&self) -> Self {
        Self {
            username: None,
            ..self.clone()
        }
    }

    pub fn excludes_all_charsets(&self) -> bool {
        self.exclude_lower && self.exclude_upper && self.exclude_number && !self.include_special
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&self.length) {
            return Err(ValidationError::InvalidPasswordLength(self.length));
        }
        if self.excludes_all_charsets() {
            return Err(ValidationError::ExcludesAllCharsets);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaGenerationParameters {
    pub key_length: u32,
}

impl Default for RsaGenerationParameters {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshGenerationParameters {
    pub key_length: u32,
    #[serde(default)]
    pub ssh_comment: String,
}

impl Default for SshGenerationParameters {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            ssh_comment: String::new(),
        }
    }
}

/// Inputs that drove (or would drive) generation of a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationParameters {
    Password(StringGenerationParameters),
    User(StringGenerationParameters),
    Rsa(RsaGenerationParameters),
    Ssh(SshGenerationParameters),
    Certificate(CertificateGenerationParameters),
}

impl GenerationParameters {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            GenerationParameters::Password(_) => CredentialType::Password,
            GenerationParameters::User(_) => CredentialType::User,
            GenerationParameters::Rsa(_) => CredentialType::Rsa,
            GenerationParameters::Ssh(_) => CredentialType::Ssh,
            GenerationParameters::Certificate(_) => CredentialType::Certificate,
        }
    }

    /// The string parameters of a password or user request
    pub fn string_parameters(&self) -> Option<&StringGenerationParameters> {
        match self {
            GenerationParameters::Password(parameters) | GenerationParameters::User(parameters) => {
                Some(parameters)
            }
            _ => None,
        }
    }
}

/* ------------------------------ Generator -------------------------------- */

/// Produces fresh credential values for every generable type
pub struct CredentialGenerator {
    key_pairs: Arc<dyn KeyPairGenerator>,
    certificates: Arc<CertificateGenerator>,
}

impl CredentialGenerator {
    pub fn new(
        key_pairs: Arc<dyn KeyPairGenerator>,
        certificates: Arc<CertificateGenerator>,
    ) -> Self {
        Self {
            key_pairs,
            certificates,
        }
    }

    pub fn generate(&self, parameters: &GenerationParameters) -> Result<CredentialValue> {
        match parameters {
            GenerationParameters::Password(parameters) => Ok(CredentialValue::Password(
                password::generate_password(parameters)?,
            )),
            GenerationParameters::User(parameters) => {
                let username = parameters
                    .username
                    .clone()
                    .unwrap_or_else(password::generate_username);
                Ok(CredentialValue::User(UserCredentialValue {
                    username: Some(username),
                    password: password::generate_password(parameters)?,
                    salt: password::generate_salt(),
                }))
            }
            GenerationParameters::Rsa(parameters) => {
                validate_key_length(parameters.key_length)?;
                let key_pair = self.key_pairs.generate(parameters.key_length)?;
                Ok(CredentialValue::Rsa(KeyPairCredentialValue {
                    public_key: key_pair::public_key_pem(&key_pair)?,
                    private_key: key_pair::private_key_pem(&key_pair)?,
                }))
            }
            GenerationParameters::Ssh(parameters) => {
                validate_key_length(parameters.key_length)?;
                let key_pair = self.key_pairs.generate(parameters.key_length)?;
                Ok(CredentialValue::Ssh(KeyPairCredentialValue {
                    public_key: ssh::encode_rsa_public_key(&key_pair, &parameters.ssh_comment)?,
                    private_key: key_pair::private_key_pem(&key_pair)?,
                }))
            }
            GenerationParameters::Certificate(parameters) => Ok(CredentialValue::Certificate(
                self.certificates.generate(parameters)?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lengths() {
        assert_eq!(
            validate_key_length(1024),
            Err(ValidationError::InvalidKeyLength(1024))
        );
        for length in VALID_KEY_LENGTHS {
            assert!(validate_key_length(length).is_ok());
        }
    }

    #[test]
    fn test_string_parameter_validation() {
        let parameters = StringGenerationParameters::default();
        assert!(parameters.validate().is_ok());

        let too_short = StringGenerationParameters::default().with_length(3);
        assert_eq!(
            too_short.validate(),
            Err(ValidationError::InvalidPasswordLength(3))
        );

        let nothing_left = StringGenerationParameters {
            exclude_lower: true,
            exclude_upper: true,
            exclude_number: true,
            ..Default::default()
        };
        assert_eq!(
            nothing_left.validate(),
            Err(ValidationError::ExcludesAllCharsets)
        );
    }

    #[test]
    fn test_stored_string_parameters_round_trip_through_json() {
        let parameters = StringGenerationParameters::default()
            .with_length(12)
            .with_username("admin");
        let json = serde_json::to_string(&parameters).unwrap();
        let parsed: StringGenerationParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, parameters);

        let legacy: StringGenerationParameters = serde_json::from_str(r#"{"length":20}"#).unwrap();
        assert_eq!(legacy.length, 20);
        assert!(!legacy.include_special);
    }
}
