use crate::error::ValidationError;
use crate::types::{with_leading_slash, CredentialType};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct UserCredentialValue {
    pub username: Option<String>,
    pub password: String,
    pub salt: String,
}

impl fmt::Debug for UserCredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentialValue")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Public/private key pair, PEM or OpenSSH encoded depending on the type
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPairCredentialValue {
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for KeyPairCredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairCredentialValue")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct CertificateCredentialValue {
    pub ca: Option<String>,
    pub certificate: Option<String>,
    pub private_key: Option<String>,
    pub ca_name: Option<String>,
    pub transitional: bool,
}

impl fmt::Debug for CertificateCredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateCredentialValue")
            .field("ca_name", &self.ca_name)
            .field("has_ca", &self.ca.is_some())
            .field("has_certificate", &self.certificate.is_some())
            .field("has_private_key", &self.private_key.is_some())
            .field("transitional", &self.transitional)
            .finish()
    }
}

impl CertificateCredentialValue {
    /// True when none of the three PEM fields carries content
    pub fn is_empty(&self) -> bool {
        [&self.ca, &self.certificate, &self.private_key]
            .iter()
            .all(|field| field.as_deref().map_or(true, str::is_empty))
    }
}

/// Decrypted credential content, one variant per credential type
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialValue {
    Value(String),
    Json(Map<String, Value>),
    Password(String),
    User(UserCredentialValue),
    Certificate(CertificateCredentialValue),
    Rsa(KeyPairCredentialValue),
    Ssh(KeyPairCredentialValue),
}

impl fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialValue::User(user) => f.debug_tuple("User").field(user).finish(),
            CredentialValue::Certificate(certificate) => {
                f.debug_tuple("Certificate").field(certificate).finish()
            }
            CredentialValue::Rsa(key_pair) => f.debug_tuple("Rsa").field(key_pair).finish(),
            CredentialValue::Ssh(key_pair) => f.debug_tuple("Ssh").field(key_pair).finish(),
            other => write!(f, "{}(..)", other.credential_type()),
        }
    }
}

impl CredentialValue {
    /// Wrap a JSON document; only objects are accepted
    pub fn json(document: Value) -> Result<Self, ValidationError> {
        match document {
            Value::Object(map) => Ok(CredentialValue::Json(map)),
            _ => Err(ValidationError::InvalidJsonValue),
        }
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialValue::Value(_) => CredentialType::Value,
            CredentialValue::Json(_) => CredentialType::Json,
            CredentialValue::Password(_) => CredentialType::Password,
            CredentialValue::User(_) => CredentialType::User,
            CredentialValue::Certificate(_) => CredentialType::Certificate,
            CredentialValue::Rsa(_) => CredentialType::Rsa,
            CredentialValue::Ssh(_) => CredentialType::Ssh,
        }
    }

    /// Whether writing `self` over `stored` would leave the credential
    /// unchanged. Fields the engine fills in on write (user salt, CA name
    /// prefix) are compared in their normalized form.
    pub fn is_equivalent_to(&self, stored: &CredentialValue) -> bool {
        match (self, stored) {
            (CredentialValue::User(requested), CredentialValue::User(stored)) => {
                requested.username == stored.username
                    && requested.password == stored.password
                    && (requested.salt.is_empty() || requested.salt == stored.salt)
            }
            (CredentialValue::Certificate(requested), CredentialValue::Certificate(stored)) => {
                requested.ca == stored.ca
                    && requested.certificate == stored.certificate
                    && requested.private_key == stored.private_key
                    && requested.ca_name.as_deref().map(with_leading_slash)
                        == stored.ca_name.as_deref().map(with_leading_slash)
            }
            (requested, stored) => requested == stored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_must_be_an_object() {
        assert!(CredentialValue::json(json!({"port": 5432})).is_ok());
        assert_eq!(
            CredentialValue::json(json!([1, 2, 3])),
            Err(ValidationError::InvalidJsonValue)
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let value = CredentialValue::Password("hunter2".to_string());
        assert_eq!(format!("{value:?}"), "password(..)");

        let user = CredentialValue::User(UserCredentialValue {
            username: Some("admin".to_string()),
            password: "hunter2".to_string(),
            salt: "abc".to_string(),
        });
        let rendered = format!("{user:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_equivalence_ignores_generated_salt() {
        let requested = CredentialValue::User(UserCredentialValue {
            username: Some("admin".to_string()),
            password: "hunter2".to_string(),
            salt: String::new(),
        });
        let stored = CredentialValue::User(UserCredentialValue {
            username: Some("admin".to_string()),
            password: "hunter2".to_string(),
            salt: "8hTgCiGbWkSqD1xA".to_string(),
        });
        assert!(requested.is_equivalent_to(&stored));
        assert!(!stored.is_equivalent_to(&CredentialValue::Password("hunter2".to_string())));
    }
}
