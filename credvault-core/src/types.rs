//! Core identifiers shared across the engine.
//!
//! Strongly typed wrappers over key identifiers, credential names and type
//! tags, plus the time-source seam used by the factory and the certificate
//! engine.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const MAX_CREDENTIAL_NAME_LENGTH: usize = 1024;

/* ------------------------------ Key Id ----------------------------------- */

/// Identifier of the encryption key a blob was written under
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/* ---------------------------- Credential Type ---------------------------- */

/// The closed set of credential types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Value,
    Json,
    Password,
    User,
    Certificate,
    Rsa,
    Ssh,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Value => "value",
            CredentialType::Json => "json",
            CredentialType::Password => "password",
            CredentialType::User => "user",
            CredentialType::Certificate => "certificate",
            CredentialType::Rsa => "rsa",
            CredentialType::Ssh => "ssh",
        }
    }

    /// Parse a persisted type tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "value" => Some(CredentialType::Value),
            "json" => Some(CredentialType::Json),
            "password" => Some(CredentialType::Password),
            "user" => Some(CredentialType::User),
            "certificate" => Some(CredentialType::Certificate),
            "rsa" => Some(CredentialType::Rsa),
            "ssh" => Some(CredentialType::Ssh),
            _ => None,
        }
    }

    /// Whether the engine knows how to generate values of this type
    pub fn is_generable(&self) -> bool {
        !matches!(self, CredentialType::Value | CredentialType::Json)
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* ---------------------------- Credential Name ---------------------------- */

/// Prefix `name` with `/` unless it already starts with one
pub fn with_leading_slash(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// Normalize and validate a hierarchical credential path
pub fn normalize_credential_name(name: &str) -> Result<String, ValidationError> {
    let normalized = with_leading_slash(name);
    let invalid = normalized.len() <= 1
        || normalized.len() > MAX_CREDENTIAL_NAME_LENGTH
        || normalized.ends_with('/')
        || normalized.contains("//");
    if invalid {
        return Err(ValidationError::InvalidCredentialName(name.to_string()));
    }
    Ok(normalized)
}

/// The identity that owns a credential's version history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialName {
    pub uuid: Uuid,
    pub name: String,
}

impl CredentialName {
    /// A brand-new identity for a name never written before
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            uuid: Uuid::new_v4(),
            name: normalize_credential_name(name)?,
        })
    }

    pub fn from_parts(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
        }
    }
}

/* ------------------------------ Time Source ------------------------------ */

/// Clock seam so tests control version timestamps and validity windows
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
