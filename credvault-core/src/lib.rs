//! Credvault core – credential versions, encryption key lifecycle and
//! certificate issuance

pub mod certificate;
pub mod config;
pub mod credential;
pub mod encryption;
pub mod error;
pub mod generation;
pub mod key_rotation;
pub mod ssh;
pub mod store;
pub mod types;
pub mod vault;
pub mod writer;

pub use error::{
    EncryptionError, ErrorCategory, ProviderError, ResolutionError, Result, StoreError,
    ValidationError, VaultError,
};

pub use types::{
    normalize_credential_name, CredentialName, CredentialType, KeyId, SystemTimeSource,
    TimeSource,
};

pub use encryption::{
    AesGcmEncryptionProvider, EncryptedBlob, EncryptedValue, EncryptionProvider, Encryptor,
    LocalEncryptionKey, ProviderCiphertext,
};

pub use credential::{
    CertificateCredentialValue, CredentialBehavior, CredentialFactory, CredentialValue,
    CredentialVersion, KeyPairCredentialValue, UserCredentialValue,
};

pub use generation::{
    CredentialGenerator, GenerationParameters, KeyPairGenerator, OpenSslKeyPairGenerator,
    RsaGenerationParameters, SshGenerationParameters, StringGenerationParameters,
};

pub use certificate::{
    CertificateAuthorityLookup, CertificateGenerationParameters, CertificateGenerationRequest,
    CertificateGenerator, CertificateReader, SerialNumberSource, StoreAuthorityLookup,
    DEFAULT_CA_NAME,
};

pub use key_rotation::{KeyClassification, KeyRotator, KeySet, KeyUsageReport, RotationSummary};

pub use store::{CredentialVersionRecord, CredentialVersionStore, EncryptedValueStore};

pub use config::{OperatingMode, VaultConfig};

pub use vault::{Vault, VaultBuilder};

pub use writer::{CredentialWriter, GenerateRequest, OverwriteMode, SetRequest};
