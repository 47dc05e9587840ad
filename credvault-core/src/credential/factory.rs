use crate::credential::simple::JsonCredentialVersion;
use crate::credential::{
    CertificateCredentialVersion, CredentialValue, CredentialVersion, PasswordCredentialVersion,
    RsaCredentialVersion, SshCredentialVersion, UserCredentialVersion, ValueCredentialVersion,
    VersionCore,
};
use crate::encryption::Encryptor;
use crate::error::{Result, ValidationError};
use crate::generation::key_pair::public_key_length;
use crate::generation::password::generate_salt;
use crate::generation::GenerationParameters;
use crate::ssh::SshPublicKey;
use crate::store::CredentialVersionRecord;
use crate::types::{with_leading_slash, CredentialName, CredentialType, TimeSource};
use std::sync::Arc;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// Builds credential versions from storage records and from fresh values
pub struct CredentialFactory {
    encryptor: Arc<Encryptor>,
    clock: Arc<dyn TimeSource>,
}

impl CredentialFactory {
    pub fn new(encryptor: Arc<Encryptor>, clock: Arc<dyn TimeSource>) -> Self {
        Self { encryptor, clock }
    }

    pub fn encryptor(&self) -> &Arc<Encryptor> {
        &self.encryptor
    }

    /// Hydrate a stored record.
    ///
    /// # Panics
    ///
    /// Panics when the record carries a type tag this build does not know;
    /// such a row means the store and the engine disagree about the schema.
    pub fn from_storage(&self, record: CredentialVersionRecord) -> CredentialVersion {
        let Some(credential_type) = CredentialType::from_tag(&record.type_tag) else {
            panic!(
                "unrecognized credential type tag '{}' on version {}",
                record.type_tag, record.uuid
            );
        };
        let core = VersionCore::from_record(&record, self.encryptor.clone());
        match credential_type {
            CredentialType::Value => CredentialVersion::Value(ValueCredentialVersion::new(core)),
            CredentialType::Json => CredentialVersion::Json(JsonCredentialVersion::new(core)),
            CredentialType::Password => CredentialVersion::Password(
                PasswordCredentialVersion::from_record(core, &record),
            ),
            CredentialType::User => {
                CredentialVersion::User(UserCredentialVersion::from_record(core, &record))
            }
            CredentialType::Certificate => CredentialVersion::Certificate(
                CertificateCredentialVersion::from_record(core, &record),
            ),
            CredentialType::Rsa => {
                CredentialVersion::Rsa(RsaCredentialVersion::from_record(core, &record))
            }
            CredentialType::Ssh => {
                CredentialVersion::Ssh(SshCredentialVersion::from_record(core, &record))
            }
        }
    }

    /// Build a new, unsaved version of `name` holding `value`.
    ///
    /// When `existing` is given the new version joins its history.
    /// `generation_parameters` are kept only by the types that cannot derive
    /// them from the value itself.
    pub fn new_version(
        &self,
        credential_type: CredentialType,
        name: &str,
        value: CredentialValue,
        existing: Option<&CredentialVersion>,
        generation_parameters: Option<&GenerationParameters>,
    ) -> Result<CredentialVersion> {
        if value.credential_type() != credential_type {
            return Err(ValidationError::TypeMismatch {
                existing: value.credential_type(),
                requested: credential_type,
            }
            .into());
        }
        let credential_name = match existing {
            Some(existing) if existing.credential_type() != credential_type => {
                return Err(ValidationError::TypeMismatch {
                    existing: existing.credential_type(),
                    requested: credential_type,
                }
                .into());
            }
            Some(existing) => existing.credential_name().clone(),
            None => CredentialName::new(name)?,
        };
        let string_parameters =
            generation_parameters.and_then(GenerationParameters::string_parameters);
        let now = self.clock.now();
        let core = |cleartext: Option<&str>| {
            VersionCore::new(
                credential_name.clone(),
                now,
                cleartext,
                self.encryptor.clone(),
            )
        };

        let version = match value {
            CredentialValue::Value(value) => {
                if value.is_empty() {
                    return Err(ValidationError::MissingValue(CredentialType::Value).into());
                }
                CredentialVersion::Value(ValueCredentialVersion::new(core(Some(&value))?))
            }
            CredentialValue::Json(document) => {
                if document.is_empty() {
                    return Err(ValidationError::MissingValue(CredentialType::Json).into());
                }
                let text = JsonCredentialVersion::serialize(&document)?;
                CredentialVersion::Json(JsonCredentialVersion::new(core(Some(&text))?))
            }
            CredentialValue::Password(password) => {
                if password.is_empty() {
                    return Err(ValidationError::MissingValue(CredentialType::Password).into());
                }
                CredentialVersion::Password(PasswordCredentialVersion::new(
                    core(Some(&password))?,
                    string_parameters,
                )?)
            }
            CredentialValue::User(user) => {
                if user.password.is_empty() {
                    return Err(ValidationError::MissingValue(CredentialType::User).into());
                }
                let salt = if user.salt.is_empty() {
                    generate_salt()
                } else {
                    user.salt
                };
                CredentialVersion::User(UserCredentialVersion::new(
                    core(Some(&user.password))?,
                    non_empty(user.username),
                    salt,
                    string_parameters,
                )?)
            }
            CredentialValue::Certificate(certificate) => {
                if certificate.is_empty() {
                    return Err(ValidationError::MissingCertificateCredentials.into());
                }
                let private_key = non_empty(certificate.private_key);
                CredentialVersion::Certificate(CertificateCredentialVersion::new(
                    core(private_key.as_deref())?,
                    non_empty(certificate.ca),
                    non_empty(certificate.certificate),
                    non_empty(certificate.ca_name).map(|name| with_leading_slash(&name)),
                    certificate.transitional,
                ))
            }
            CredentialValue::Rsa(key_pair) => {
                if key_pair.private_key.is_empty() && key_pair.public_key.is_empty() {
                    return Err(ValidationError::MissingValue(CredentialType::Rsa).into());
                }
                if !key_pair.public_key.is_empty() && public_key_length(&key_pair.public_key) == 0
                {
                    return Err(ValidationError::InvalidPublicKey.into());
                }
                let private_key = non_empty(Some(key_pair.private_key));
                CredentialVersion::Rsa(RsaCredentialVersion::new(
                    core(private_key.as_deref())?,
                    key_pair.public_key,
                ))
            }
            CredentialValue::Ssh(key_pair) => {
                if key_pair.private_key.is_empty() && key_pair.public_key.is_empty() {
                    return Err(ValidationError::MissingValue(CredentialType::Ssh).into());
                }
                if !key_pair.public_key.is_empty() {
                    SshPublicKey::parse(&key_pair.public_key)?;
                }
                let private_key = non_empty(Some(key_pair.private_key));
                CredentialVersion::Ssh(SshCredentialVersion::new(
                    core(private_key.as_deref())?,
                    key_pair.public_key,
                ))
            }
        };
        Ok(version)
    }
}
