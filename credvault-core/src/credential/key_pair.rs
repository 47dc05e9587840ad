use crate::credential::{CredentialBehavior, CredentialValue, KeyPairCredentialValue, VersionCore};
use crate::error::Result;
use crate::generation::key_pair::public_key_length;
use crate::generation::{GenerationParameters, RsaGenerationParameters, SshGenerationParameters};
use crate::ssh::SshPublicKey;
use crate::store::CredentialVersionRecord;
use crate::types::CredentialType;

/// RSA key pair. The private key is the encrypted primary value; the PEM
/// public key is stored in clear.
#[derive(Debug, Clone)]
pub struct RsaCredentialVersion {
    core: VersionCore,
    public_key: String,
}

impl RsaCredentialVersion {
    pub(crate) fn new(core: VersionCore, public_key: String) -> Self {
        Self { core, public_key }
    }

    pub(crate) fn from_record(core: VersionCore, record: &CredentialVersionRecord) -> Self {
        Self::new(core, record.public_key.clone().unwrap_or_default())
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Modulus size, 0 when the public key cannot be read
    pub fn key_length(&self) -> u32 {
        public_key_length(&self.public_key)
    }
}

impl CredentialBehavior for RsaCredentialVersion {
    fn core(&self) -> &VersionCore {
        &self.core
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::Rsa
    }

    fn value(&self) -> Result<CredentialValue> {
        Ok(CredentialValue::Rsa(KeyPairCredentialValue {
            public_key: self.public_key.clone(),
            private_key: self.core.decrypt()?.unwrap_or_default(),
        }))
    }

    fn rotate(&mut self) -> Result<()> {
        self.core.rotate()
    }

    fn matches_generation_parameters(&self, parameters: &GenerationParameters) -> Result<bool> {
        Ok(match parameters {
            GenerationParameters::Rsa(requested) => requested.key_length == self.key_length(),
            _ => false,
        })
    }

    fn generation_parameters(&self) -> Result<Option<GenerationParameters>> {
        let key_length = self.key_length();
        Ok((key_length > 0)
            .then_some(GenerationParameters::Rsa(RsaGenerationParameters { key_length })))
    }

    fn to_record(&self) -> CredentialVersionRecord {
        CredentialVersionRecord {
            public_key: Some(self.public_key.clone()),
            ..self.core.record(CredentialType::Rsa)
        }
    }
}

/// SSH key pair with an OpenSSH formatted public key
#[derive(Debug, Clone)]
pub struct SshCredentialVersion {
    core: VersionCore,
    public_key: String,
}

impl SshCredentialVersion {
    pub(crate) fn new(core: VersionCore, public_key: String) -> Self {
        Self { core, public_key }
    }

    pub(crate) fn from_record(core: VersionCore, record: &CredentialVersionRecord) -> Self {
        Self::new(core, record.public_key.clone().unwrap_or_default())
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Parsed public key, `None` when it is not a readable OpenSSH key
    pub fn parsed_public_key(&self) -> Option<SshPublicKey> {
        SshPublicKey::parse(&self.public_key).ok()
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.parsed_public_key()
            .map(|key| key.fingerprint().to_string())
    }
}

impl CredentialBehavior for SshCredentialVersion {
    fn core(&self) -> &VersionCore {
        &self.core
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::Ssh
    }

    fn value(&self) -> Result<CredentialValue> {
        Ok(CredentialValue::Ssh(KeyPairCredentialValue {
            public_key: self.public_key.clone(),
            private_key: self.core.decrypt()?.unwrap_or_default(),
        }))
    }

    fn rotate(&mut self) -> Result<()> {
        self.core.rotate()
    }

    fn matches_generation_parameters(&self, parameters: &GenerationParameters) -> Result<bool> {
        let (GenerationParameters::Ssh(requested), Some(key)) =
            (parameters, self.parsed_public_key())
        else {
            return Ok(false);
        };
        Ok(requested.key_length == key.key_length() && requested.ssh_comment == key.comment())
    }

    fn generation_parameters(&self) -> Result<Option<GenerationParameters>> {
        Ok(self.parsed_public_key().map(|key| {
            GenerationParameters::Ssh(SshGenerationParameters {
                key_length: key.key_length(),
                ssh_comment: key.comment().to_string(),
            })
        }))
    }

    fn to_record(&self) -> CredentialVersionRecord {
        CredentialVersionRecord {
            public_key: Some(self.public_key.clone()),
            ..self.core.record(CredentialType::Ssh)
        }
    }
}
