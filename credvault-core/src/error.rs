use crate::types::{CredentialType, KeyId};
use thiserror::Error;

/// User input errors. Each carries a stable machine-readable code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one of common name, organization, organizational unit, locality, state or country must be set")]
    MissingCertificateParameters,

    #[error("a signing CA name is required unless the certificate is self-signed or a CA")]
    MissingSigningCa,

    #[error("a CA name and the self-signed flag cannot both be set")]
    CaAndSelfSign,

    #[error("key length {0} is not one of 2048, 3072 or 4096")]
    InvalidKeyLength(u32),

    #[error("alternative name '{0}' is not a valid IP address or DNS name")]
    InvalidAlternativeName(String),

    #[error("unknown key usage '{0}'")]
    InvalidKeyUsage(String),

    #[error("unknown extended key usage '{0}'")]
    InvalidExtendedKeyUsage(String),

    #[error("duration {0} must be between 1 and 3650 days")]
    InvalidDuration(i64),

    #[error("{field} must be at most {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("a value is required for {0} credentials")]
    MissingValue(CredentialType),

    #[error("at least one of ca, certificate or private key must be set")]
    MissingCertificateCredentials,

    #[error("json credentials must be a JSON object")]
    InvalidJsonValue,

    #[error("credential name '{0}' is invalid")]
    InvalidCredentialName(String),

    #[error("credential type {requested} does not match existing type {existing}")]
    TypeMismatch {
        existing: CredentialType,
        requested: CredentialType,
    },

    #[error("password length {0} must be between 4 and 200")]
    InvalidPasswordLength(usize),

    #[error("the requested parameters exclude every character set")]
    ExcludesAllCharsets,

    #[error("public key could not be parsed")]
    InvalidPublicKey,

    #[error("credentials of type {0} cannot be regenerated")]
    CannotRegenerate(CredentialType),
}

impl ValidationError {
    /// Stable code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingCertificateParameters => "missing_certificate_parameters",
            ValidationError::MissingSigningCa => "missing_signing_ca",
            ValidationError::CaAndSelfSign => "ca_and_self_sign",
            ValidationError::InvalidKeyLength(_) => "invalid_key_length",
            ValidationError::InvalidAlternativeName(_) => "invalid_alternate_name",
            ValidationError::InvalidKeyUsage(_) => "invalid_key_usage",
            ValidationError::InvalidExtendedKeyUsage(_) => "invalid_extended_key_usage",
            ValidationError::InvalidDuration(_) => "invalid_duration",
            ValidationError::FieldTooLong { .. } => "field_too_long",
            ValidationError::MissingValue(_) => "missing_value",
            ValidationError::MissingCertificateCredentials => "missing_certificate_credentials",
            ValidationError::InvalidJsonValue => "invalid_json_value",
            ValidationError::InvalidCredentialName(_) => "invalid_credential_name",
            ValidationError::TypeMismatch { .. } => "type_mismatch",
            ValidationError::InvalidPasswordLength(_) => "invalid_password_length",
            ValidationError::ExcludesAllCharsets => "excludes_all_charsets",
            ValidationError::InvalidPublicKey => "invalid_public_key",
            ValidationError::CannotRegenerate(_) => "cannot_regenerate",
        }
    }

    /// The offending field or value, when there is one
    pub fn field(&self) -> Option<String> {
        match self {
            ValidationError::InvalidKeyLength(length) => Some(length.to_string()),
            ValidationError::InvalidAlternativeName(name) => Some(name.clone()),
            ValidationError::InvalidKeyUsage(flag) => Some(flag.clone()),
            ValidationError::InvalidExtendedKeyUsage(flag) => Some(flag.clone()),
            ValidationError::InvalidDuration(days) => Some(days.to_string()),
            ValidationError::FieldTooLong { field, .. } => Some(field.to_string()),
            ValidationError::MissingValue(credential_type) => {
                Some(credential_type.as_str().to_string())
            }
            ValidationError::InvalidCredentialName(name) => Some(name.clone()),
            ValidationError::InvalidPasswordLength(length) => Some(length.to_string()),
            _ => None,
        }
    }
}

/// A referenced entity does not exist or is unusable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("the default CA has not been configured")]
    DefaultCaNotFound,

    #[error("CA '{0}' could not be found")]
    CaNotFound(String),

    #[error("CA '{0}' has no private key")]
    CaMissingPrivateKey(String),

    #[error("credential '{0}' is not a certificate authority")]
    CertNotCa(String),

    #[error("credential '{0}' could not be found")]
    CredentialNotFound(String),
}

/// Errors reported by an encryption provider implementation
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unknown encryption key {0}")]
    UnknownKey(KeyId),

    #[error("encryption provider unavailable: {0}")]
    Unavailable(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

/// Opaque encryption failure.
///
/// The message never includes plaintext or key material; the provider
/// cause stays reachable through `source()` for server-side logs.
#[derive(Error, Debug)]
#[error("encryption operation failed")]
pub struct EncryptionError {
    #[source]
    source: ProviderError,
}

impl EncryptionError {
    pub fn new(source: ProviderError) -> Self {
        Self { source }
    }

    pub fn provider_error(&self) -> &ProviderError {
        &self.source
    }
}

/// Errors from the persistence collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Coarse classification used by callers that map errors to a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Resolution,
    Crypto,
    Storage,
    ReadOnly,
    Internal,
}

/// Error type for credvault-core operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("the vault is in read-only mode")]
    ReadOnlyMode,

    #[error("certificate error: {0}")]
    CertificateError(String),

    #[error("key generation error: {0}")]
    KeyGenerationError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl VaultError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            VaultError::Validation(_) => ErrorCategory::Validation,
            VaultError::Resolution(_) => ErrorCategory::Resolution,
            VaultError::Encryption(_) => ErrorCategory::Crypto,
            VaultError::Store(_) => ErrorCategory::Storage,
            VaultError::ReadOnlyMode => ErrorCategory::ReadOnly,
            VaultError::CertificateError(_)
            | VaultError::KeyGenerationError(_)
            | VaultError::SerializationError(_)
            | VaultError::ConfigError(_) => ErrorCategory::Internal,
        }
    }
}

impl From<openssl::error::ErrorStack> for VaultError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        VaultError::CertificateError(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::ConfigError(err.to_string())
    }
}

/// Result type for credvault-core operations
pub type Result<T> = std::result::Result<T, VaultError>;
