//! Password and user credentials. Both remember the string generation
//! parameters they were generated with, encrypted alongside the secret.

use crate::credential::{
    reencrypt, CredentialBehavior, CredentialValue, UserCredentialValue, VersionCore,
};
use crate::encryption::EncryptedValue;
use crate::error::Result;
use crate::generation::{GenerationParameters, StringGenerationParameters};
use crate::store::CredentialVersionRecord;
use crate::types::CredentialType;

fn encrypt_parameters(
    core: &VersionCore,
    parameters: Option<&StringGenerationParameters>,
) -> Result<Option<EncryptedValue>> {
    parameters
        .map(|parameters| core.encrypt_field(&serde_json::to_string(parameters)?))
        .transpose()
}

fn decrypt_parameters(
    core: &VersionCore,
    encrypted: Option<&EncryptedValue>,
) -> Result<Option<StringGenerationParameters>> {
    let Some(encrypted) = encrypted else {
        return Ok(None);
    };
    match core.decrypt_field(encrypted)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct PasswordCredentialVersion {
    core: VersionCore,
    encrypted_generation_parameters: Option<EncryptedValue>,
}

impl PasswordCredentialVersion {
    pub(crate) fn new(
        core: VersionCore,
        parameters: Option<&StringGenerationParameters>,
    ) -> Result<Self> {
        let encrypted_generation_parameters = encrypt_parameters(&core, parameters)?;
        Ok(Self {
            core,
            encrypted_generation_parameters,
        })
    }

    pub(crate) fn from_record(core: VersionCore, record: &CredentialVersionRecord) -> Self {
        Self {
            core,
            encrypted_generation_parameters: record.encrypted_generation_parameters.clone(),
        }
    }

    pub fn string_parameters(&self) -> Result<Option<StringGenerationParameters>> {
        decrypt_parameters(&self.core, self.encrypted_generation_parameters.as_ref())
    }
}

impl CredentialBehavior for PasswordCredentialVersion {
    fn core(&self) -> &VersionCore {
        &self.core
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::Password
    }

    fn value(&self) -> Result<CredentialValue> {
        Ok(CredentialValue::Password(
            self.core.decrypt()?.unwrap_or_default(),
        ))
    }

    fn rotate(&mut self) -> Result<()> {
        self.core.rotate()?;
        if let Some(parameters) = self.encrypted_generation_parameters.as_mut() {
            reencrypt(self.core.encryptor(), parameters)?;
        }
        Ok(())
    }

    /// The username plays no part in a password
    fn matches_generation_parameters(&self, parameters: &GenerationParameters) -> Result<bool> {
        let Some(requested) = parameters.string_parameters() else {
            return Ok(false);
        };
        Ok(self
            .string_parameters()?
            .is_some_and(|stored| stored.without_username() == requested.without_username()))
    }

    fn generation_parameters(&self) -> Result<Option<GenerationParameters>> {
        Ok(self.string_parameters()?.map(GenerationParameters::Password))
    }

    fn to_record(&self) -> CredentialVersionRecord {
        CredentialVersionRecord {
            encrypted_generation_parameters: self.encrypted_generation_parameters.clone(),
            ..self.core.record(CredentialType::Password)
        }
    }
}

/// Username, password and crypt salt. The password is the primary value.
#[derive(Debug, Clone)]
pub struct UserCredentialVersion {
    core: VersionCore,
    username: Option<String>,
    salt: String,
    encrypted_generation_parameters: Option<EncryptedValue>,
}

impl UserCredentialVersion {
    pub(crate) fn new(
        core: VersionCore,
        username: Option<String>,
        salt: String,
        parameters: Option<&StringGenerationParameters>,
    ) -> Result<Self> {
        let encrypted_generation_parameters = encrypt_parameters(&core, parameters)?;
        Ok(Self {
            core,
            username,
            salt,
            encrypted_generation_parameters,
        })
    }

    pub(crate) fn from_record(core: VersionCore, record: &CredentialVersionRecord) -> Self {
        Self {
            core,
            username: record.username.clone(),
            salt: record.salt.clone().unwrap_or_default(),
            encrypted_generation_parameters: record.encrypted_generation_parameters.clone(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn string_parameters(&self) -> Result<Option<StringGenerationParameters>> {
        decrypt_parameters(&self.core, self.encrypted_generation_parameters.as_ref())
    }
}

impl CredentialBehavior for UserCredentialVersion {
    fn core(&self) -> &VersionCore {
        &self.core
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::User
    }

    fn value(&self) -> Result<CredentialValue> {
        Ok(CredentialValue::User(UserCredentialValue {
            username: self.username.clone(),
            password: self.core.decrypt()?.unwrap_or_default(),
            salt: self.salt.clone(),
        }))
    }

    fn rotate(&mut self) -> Result<()> {
        self.core.rotate()?;
        if let Some(parameters) = self.encrypted_generation_parameters.as_mut() {
            reencrypt(self.core.encryptor(), parameters)?;
        }
        Ok(())
    }

    /// A requested username must equal the stored one. A request without a
    /// username matches only a version whose username was generated.
    fn matches_generation_parameters(&self, parameters: &GenerationParameters) -> Result<bool> {
        let Some(requested) = parameters.string_parameters() else {
            return Ok(false);
        };
        let Some(stored) = self.string_parameters()? else {
            return Ok(false);
        };
        let username_matches = match &requested.username {
            Some(username) => self.username.as_ref() == Some(username),
            None => stored.username.is_none(),
        };
        Ok(username_matches && stored.without_username() == requested.without_username())
    }

    fn generation_parameters(&self) -> Result<Option<GenerationParameters>> {
        Ok(self.string_parameters()?.map(GenerationParameters::User))
    }

    fn to_record(&self) -> CredentialVersionRecord {
        CredentialVersionRecord {
            encrypted_generation_parameters: self.encrypted_generation_parameters.clone(),
            username: self.username.clone(),
            salt: Some(self.salt.clone()),
            ..self.core.record(CredentialType::User)
        }
    }
}
