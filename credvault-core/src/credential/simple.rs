//! Opaque value and JSON credentials. Neither is generable.

use crate::credential::{CredentialBehavior, CredentialValue, VersionCore};
use crate::error::{Result, ValidationError, VaultError};
use crate::store::CredentialVersionRecord;
use crate::types::CredentialType;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct ValueCredentialVersion {
    core: VersionCore,
}

impl ValueCredentialVersion {
    pub(crate) fn new(core: VersionCore) -> Self {
        Self { core }
    }
}

impl CredentialBehavior for ValueCredentialVersion {
    fn core(&self) -> &VersionCore {
        &self.core
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::Value
    }

    fn value(&self) -> Result<CredentialValue> {
        Ok(CredentialValue::Value(self.core.decrypt()?.unwrap_or_default()))
    }

    fn rotate(&mut self) -> Result<()> {
        self.core.rotate()
    }

    fn to_record(&self) -> CredentialVersionRecord {
        self.core.record(CredentialType::Value)
    }
}

/// JSON object credential, stored as its serialized text
#[derive(Debug, Clone)]
pub struct JsonCredentialVersion {
    core: VersionCore,
}

impl JsonCredentialVersion {
    pub(crate) fn new(core: VersionCore) -> Self {
        Self { core }
    }

    pub(crate) fn serialize(document: &Map<String, Value>) -> Result<String> {
        Ok(serde_json::to_string(document)?)
    }
}

impl CredentialBehavior for JsonCredentialVersion {
    fn core(&self) -> &VersionCore {
        &self.core
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::Json
    }

    fn value(&self) -> Result<CredentialValue> {
        let Some(text) = self.core.decrypt()? else {
            return Ok(CredentialValue::Json(Map::new()));
        };
        match serde_json::from_str(&text)? {
            Value::Object(document) => Ok(CredentialValue::Json(document)),
            _ => Err(VaultError::Validation(ValidationError::InvalidJsonValue)),
        }
    }

    fn rotate(&mut self) -> Result<()> {
        self.core.rotate()
    }

    fn to_record(&self) -> CredentialVersionRecord {
        self.core.record(CredentialType::Json)
    }
}
