//! Credential versions.
//!
//! A credential is a named history of immutable versions. Every version
//! shares a [`VersionCore`] (identity, timestamp, encrypted primary value)
//! and adds its type-specific fields. [`CredentialVersion`] is the closed sum
//! over the seven types; [`CredentialBehavior`] is what each of them
//! implements.

pub mod certificate;
pub mod factory;
pub mod key_pair;
pub mod password;
pub mod simple;
pub mod value;

use crate::encryption::{EncryptedValue, Encryptor};
use crate::error::Result;
use crate::generation::GenerationParameters;
use crate::store::CredentialVersionRecord;
use crate::types::{CredentialName, CredentialType};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub use certificate::CertificateCredentialVersion;
pub use factory::CredentialFactory;
pub use key_pair::{RsaCredentialVersion, SshCredentialVersion};
pub use password::{PasswordCredentialVersion, UserCredentialVersion};
pub use simple::{JsonCredentialVersion, ValueCredentialVersion};
pub use value::{
    CertificateCredentialValue, CredentialValue, KeyPairCredentialValue, UserCredentialValue,
};

/// Re-encrypt `value` in place under the active key, keeping its uuid
pub(crate) fn reencrypt(encryptor: &Encryptor, value: &mut EncryptedValue) -> Result<()> {
    let cleartext = encryptor.decrypt(&value.blob)?;
    value.blob = encryptor.encrypt(cleartext.as_deref())?;
    Ok(())
}

/// Fields shared by every credential version
#[derive(Debug, Clone)]
pub struct VersionCore {
    uuid: Uuid,
    credential_name: CredentialName,
    version_created_at: DateTime<Utc>,
    encrypted_value: EncryptedValue,
    encryptor: Arc<Encryptor>,
}

impl VersionCore {
    pub(crate) fn new(
        credential_name: CredentialName,
        version_created_at: DateTime<Utc>,
        cleartext: Option<&str>,
        encryptor: Arc<Encryptor>,
    ) -> Result<Self> {
        let encrypted_value = EncryptedValue::new(encryptor.encrypt(cleartext)?);
        Ok(Self {
            uuid: Uuid::new_v4(),
            credential_name,
            version_created_at,
            encrypted_value,
            encryptor,
        })
    }

    pub(crate) fn from_record(record: &CredentialVersionRecord, encryptor: Arc<Encryptor>) -> Self {
        Self {
            uuid: record.uuid,
            credential_name: record.credential_name.clone(),
            version_created_at: record.version_created_at,
            encrypted_value: record.encrypted_value.clone(),
            encryptor,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn credential_name(&self) -> &CredentialName {
        &self.credential_name
    }

    pub fn version_created_at(&self) -> DateTime<Utc> {
        self.version_created_at
    }

    pub fn encrypted_value(&self) -> &EncryptedValue {
        &self.encrypted_value
    }

    pub(crate) fn encryptor(&self) -> &Arc<Encryptor> {
        &self.encryptor
    }

    pub(crate) fn decrypt(&self) -> Result<Option<String>> {
        Ok(self.encryptor.decrypt(&self.encrypted_value.blob)?)
    }

    /// Encrypt a secondary field with this version's encryptor
    pub(crate) fn encrypt_field(&self, cleartext: &str) -> Result<EncryptedValue> {
        Ok(EncryptedValue::new(self.encryptor.encrypt(Some(cleartext))?))
    }

    pub(crate) fn decrypt_field(&self, value: &EncryptedValue) -> Result<Option<String>> {
        Ok(self.encryptor.decrypt(&value.blob)?)
    }

    pub(crate) fn rotate(&mut self) -> Result<()> {
        reencrypt(&self.encryptor, &mut self.encrypted_value)
    }

    /// Record carrying only the shared fields
    pub(crate) fn record(&self, credential_type: CredentialType) -> CredentialVersionRecord {
        CredentialVersionRecord {
            uuid: self.uuid,
            credential_name: self.credential_name.clone(),
            version_created_at: self.version_created_at,
            type_tag: credential_type.as_str().to_string(),
            encrypted_value: self.encrypted_value.clone(),
            encrypted_generation_parameters: None,
            username: None,
            salt: None,
            public_key: None,
            ca: None,
            certificate: None,
            ca_name: None,
            transitional: false,
        }
    }
}

/// Capabilities every credential version provides
pub trait CredentialBehavior {
    fn core(&self) -> &VersionCore;

    fn credential_type(&self) -> CredentialType;

    /// Decrypted content of this version
    fn value(&self) -> Result<CredentialValue>;

    /// Re-encrypt every encrypted field under the active key
    fn rotate(&mut self) -> Result<()>;

    /// Whether regenerating with `parameters` would produce an equivalent
    /// credential. Types without generation parameters never match.
    fn matches_generation_parameters(&self, _parameters: &GenerationParameters) -> Result<bool> {
        Ok(false)
    }

    /// Parameters that would regenerate this version, when known
    fn generation_parameters(&self) -> Result<Option<GenerationParameters>> {
        Ok(None)
    }

    fn to_record(&self) -> CredentialVersionRecord;
}

/// One version of any credential type
#[derive(Debug, Clone)]
pub enum CredentialVersion {
    Value(ValueCredentialVersion),
    Json(JsonCredentialVersion),
    Password(PasswordCredentialVersion),
    User(UserCredentialVersion),
    Certificate(CertificateCredentialVersion),
    Rsa(RsaCredentialVersion),
    Ssh(SshCredentialVersion),
}

impl CredentialVersion {
    fn behavior(&self) -> &dyn CredentialBehavior {
        match self {
            CredentialVersion::Value(version) => version,
            CredentialVersion::Json(version) => version,
            CredentialVersion::Password(version) => version,
            CredentialVersion::User(version) => version,
            CredentialVersion::Certificate(version) => version,
            CredentialVersion::Rsa(version) => version,
            CredentialVersion::Ssh(version) => version,
        }
    }

    fn behavior_mut(&mut self) -> &mut dyn CredentialBehavior {
        match self {
            CredentialVersion::Value(version) => version,
            CredentialVersion::Json(version) => version,
            CredentialVersion::Password(version) => version,
            CredentialVersion::User(version) => version,
            CredentialVersion::Certificate(version) => version,
            CredentialVersion::Rsa(version) => version,
            CredentialVersion::Ssh(version) => version,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.behavior().core().uuid()
    }

    pub fn credential_name(&self) -> &CredentialName {
        self.behavior().core().credential_name()
    }

    pub fn name(&self) -> &str {
        &self.credential_name().name
    }

    pub fn version_created_at(&self) -> DateTime<Utc> {
        self.behavior().core().version_created_at()
    }

    pub fn credential_type(&self) -> CredentialType {
        self.behavior().credential_type()
    }

    pub fn value(&self) -> Result<CredentialValue> {
        self.behavior().value()
    }

    pub fn rotate(&mut self) -> Result<()> {
        self.behavior_mut().rotate()
    }

    pub fn matches_generation_parameters(&self, parameters: &GenerationParameters) -> Result<bool> {
        self.behavior().matches_generation_parameters(parameters)
    }

    pub fn generation_parameters(&self) -> Result<Option<GenerationParameters>> {
        self.behavior().generation_parameters()
    }

    pub fn to_record(&self) -> CredentialVersionRecord {
        self.behavior().to_record()
    }

    pub fn as_certificate(&self) -> Option<&CertificateCredentialVersion> {
        match self {
            CredentialVersion::Certificate(version) => Some(version),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&UserCredentialVersion> {
        match self {
            CredentialVersion::User(version) => Some(version),
            _ => None,
        }
    }
}
