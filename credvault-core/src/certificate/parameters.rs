//! Certificate generation requests and their validated form.

use crate::certificate::reader::CertificateReader;
use crate::error::ValidationError;
use crate::generation::{validate_key_length, DEFAULT_KEY_LENGTH};
use crate::types::with_leading_slash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

pub const DEFAULT_DURATION_DAYS: i64 = 365;
pub const MAX_DURATION_DAYS: i64 = 3650;

pub const MAX_COMMON_NAME_LENGTH: usize = 64;
pub const MAX_ORGANIZATION_LENGTH: usize = 64;
pub const MAX_ORGANIZATION_UNIT_LENGTH: usize = 64;
pub const MAX_LOCALITY_LENGTH: usize = 128;
pub const MAX_STATE_LENGTH: usize = 128;
pub const MAX_COUNTRY_LENGTH: usize = 2;
pub const MAX_ALTERNATIVE_NAME_LENGTH: usize = 253;

/* ------------------------------ Usage flags ------------------------------ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyUsageFlag {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl KeyUsageFlag {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "digital_signature" => KeyUsageFlag::DigitalSignature,
            "non_repudiation" => KeyUsageFlag::NonRepudiation,
            "key_encipherment" => KeyUsageFlag::KeyEncipherment,
            "data_encipherment" => KeyUsageFlag::DataEncipherment,
            "key_agreement" => KeyUsageFlag::KeyAgreement,
            "key_cert_sign" => KeyUsageFlag::KeyCertSign,
            "crl_sign" => KeyUsageFlag::CrlSign,
            "encipher_only" => KeyUsageFlag::EncipherOnly,
            "decipher_only" => KeyUsageFlag::DecipherOnly,
            _ => return None,
        })
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            KeyUsageFlag::DigitalSignature => "digital_signature",
            KeyUsageFlag::NonRepudiation => "non_repudiation",
            KeyUsageFlag::KeyEncipherment => "key_encipherment",
            KeyUsageFlag::DataEncipherment => "data_encipherment",
            KeyUsageFlag::KeyAgreement => "key_agreement",
            KeyUsageFlag::KeyCertSign => "key_cert_sign",
            KeyUsageFlag::CrlSign => "crl_sign",
            KeyUsageFlag::EncipherOnly => "encipher_only",
            KeyUsageFlag::DecipherOnly => "decipher_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtendedKeyUsageFlag {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    Timestamping,
}

impl ExtendedKeyUsageFlag {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "server_auth" => ExtendedKeyUsageFlag::ServerAuth,
            "client_auth" => ExtendedKeyUsageFlag::ClientAuth,
            "code_signing" => ExtendedKeyUsageFlag::CodeSigning,
            "email_protection" => ExtendedKeyUsageFlag::EmailProtection,
            "timestamping" => ExtendedKeyUsageFlag::Timestamping,
            _ => return None,
        })
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            ExtendedKeyUsageFlag::ServerAuth => "server_auth",
            ExtendedKeyUsageFlag::ClientAuth => "client_auth",
            ExtendedKeyUsageFlag::CodeSigning => "code_signing",
            ExtendedKeyUsageFlag::EmailProtection => "email_protection",
            ExtendedKeyUsageFlag::Timestamping => "timestamping",
        }
    }
}

/* --------------------------- Alternative names --------------------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlternativeName {
    Dns(String),
    Ip(IpAddr),
}

impl AlternativeName {
    /// Classify `name` as an IP literal, a DNS name or a `*.` wildcard
    pub fn parse(name: &str) -> Option<Self> {
        if let Ok(ip) = name.parse::<IpAddr>() {
            return Some(AlternativeName::Ip(ip));
        }
        let hostname = name.strip_prefix("*.").unwrap_or(name);
        if is_hostname(hostname) {
            Some(AlternativeName::Dns(name.to_string()))
        } else {
            None
        }
    }
}

impl fmt::Display for AlternativeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlternativeName::Dns(name) => f.write_str(name),
            AlternativeName::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

fn is_dns_label(label: &str) -> bool {
    (1..=63).contains(&label.len())
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}

// Total length is checked separately so an overlong name reports field_too_long.
fn is_hostname(name: &str) -> bool {
    let labels: Vec<&str> = name.split('.').collect();
    labels.iter().all(|label| is_dns_label(label))
        && !labels
            .last()
            .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
}

/* ------------------------------ Subject name ----------------------------- */

/// The six relative distinguished names a generated certificate may carry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectName {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

fn escape_rdn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i == last && c == ' ';
        if leading || trailing || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl SubjectName {
    /// Present components in issuance order, paired with their attribute key
    pub fn components(&self) -> Vec<(&'static str, &str)> {
        [
            ("L", &self.locality),
            ("O", &self.organization),
            ("ST", &self.state),
            ("C", &self.country),
            ("OU", &self.organization_unit),
            ("CN", &self.common_name),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|value| (key, value)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.components().is_empty()
    }

    /// RFC 4514 style rendering, e.g. `O=foo,ST=bar,C=mars`
    pub fn to_dn_string(&self) -> String {
        self.components()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", escape_rdn_value(value)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/* -------------------------------- Request -------------------------------- */

/// Raw certificate generation request as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateGenerationRequest {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub alternative_names: Vec<String>,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub ca: Option<String>,
    pub self_sign: bool,
    pub is_ca: bool,
    pub duration: Option<i64>,
    pub key_length: Option<u32>,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn check_length(
    value: Option<&str>,
    field: &'static str,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(value) if value.chars().count() > max => {
            Err(ValidationError::FieldTooLong { field, max })
        }
        _ => Ok(()),
    }
}

/* ------------------------- Validated parameters -------------------------- */

/// Validated certificate parameters. Two values compare equal exactly when
/// generating from either would yield an equivalent certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateGenerationParameters {
    subject: SubjectName,
    alternative_names: Vec<AlternativeName>,
    key_usage: BTreeSet<KeyUsageFlag>,
    extended_key_usage: BTreeSet<ExtendedKeyUsageFlag>,
    ca_name: Option<String>,
    self_signed: bool,
    is_ca: bool,
    duration_days: u32,
    key_length: u32,
}

impl CertificateGenerationParameters {
    /// Validate `request`. Checks run in a fixed order and the first failure
    /// is reported.
    pub fn from_request(request: &CertificateGenerationRequest) -> Result<Self, ValidationError> {
        let subject = SubjectName {
            common_name: present(&request.common_name),
            organization: present(&request.organization),
            organization_unit: present(&request.organization_unit),
            locality: present(&request.locality),
            state: present(&request.state),
            country: present(&request.country),
        };
        let ca_name = present(&request.ca).map(|name| with_leading_slash(&name));

        if subject.is_empty() {
            return Err(ValidationError::MissingCertificateParameters);
        }
        if ca_name.is_none() && !request.self_sign && !request.is_ca {
            return Err(ValidationError::MissingSigningCa);
        }
        if ca_name.is_some() && request.self_sign {
            return Err(ValidationError::CaAndSelfSign);
        }

        let key_length = request.key_length.unwrap_or(DEFAULT_KEY_LENGTH);
        validate_key_length(key_length)?;

        let mut alternative_names = Vec::with_capacity(request.alternative_names.len());
        for name in &request.alternative_names {
            let parsed = AlternativeName::parse(name)
                .ok_or_else(|| ValidationError::InvalidAlternativeName(name.clone()))?;
            alternative_names.push(parsed);
        }

        let mut extended_key_usage = BTreeSet::new();
        for token in &request.extended_key_usage {
            let flag = ExtendedKeyUsageFlag::from_token(token)
                .ok_or_else(|| ValidationError::InvalidExtendedKeyUsage(token.clone()))?;
            extended_key_usage.insert(flag);
        }
        let mut key_usage = BTreeSet::new();
        for token in &request.key_usage {
            let flag = KeyUsageFlag::from_token(token)
                .ok_or_else(|| ValidationError::InvalidKeyUsage(token.clone()))?;
            key_usage.insert(flag);
        }

        let duration = request.duration.unwrap_or(DEFAULT_DURATION_DAYS);
        if !(1..=MAX_DURATION_DAYS).contains(&duration) {
            return Err(ValidationError::InvalidDuration(duration));
        }

        check_length(subject.common_name.as_deref(), "common_name", MAX_COMMON_NAME_LENGTH)?;
        check_length(subject.organization.as_deref(), "organization", MAX_ORGANIZATION_LENGTH)?;
        check_length(
            subject.organization_unit.as_deref(),
            "organization_unit",
            MAX_ORGANIZATION_UNIT_LENGTH,
        )?;
        check_length(subject.locality.as_deref(), "locality", MAX_LOCALITY_LENGTH)?;
        check_length(subject.state.as_deref(), "state", MAX_STATE_LENGTH)?;
        check_length(subject.country.as_deref(), "country", MAX_COUNTRY_LENGTH)?;
        for name in &request.alternative_names {
            check_length(Some(name), "alternative_name", MAX_ALTERNATIVE_NAME_LENGTH)?;
        }

        let self_signed = request.self_sign || (request.is_ca && ca_name.is_none());

        Ok(Self {
            subject,
            alternative_names,
            key_usage,
            extended_key_usage,
            ca_name,
            self_signed,
            is_ca: request.is_ca,
            duration_days: duration as u32,
            key_length,
        })
    }

    /// Reconstruct the parameters an existing certificate was generated from
    pub fn from_certificate(reader: &CertificateReader, ca_name: Option<&str>) -> Self {
        let self_signed = reader.is_self_signed();
        Self {
            subject: reader.subject().clone(),
            alternative_names: reader.alternative_names().to_vec(),
            key_usage: reader.key_usage().clone(),
            extended_key_usage: reader.extended_key_usage().clone(),
            ca_name: if self_signed {
                None
            } else {
                ca_name.filter(|name| !name.is_empty()).map(with_leading_slash)
            },
            self_signed,
            is_ca: reader.is_ca(),
            duration_days: reader.duration_days(),
            key_length: reader.key_length(),
        }
    }

    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    pub fn alternative_names(&self) -> &[AlternativeName] {
        &self.alternative_names
    }

    pub fn key_usage(&self) -> &BTreeSet<KeyUsageFlag> {
        &self.key_usage
    }

    pub fn extended_key_usage(&self) -> &BTreeSet<ExtendedKeyUsageFlag> {
        &self.extended_key_usage
    }

    /// Normalized signing CA name, absent for self-signed certificates
    pub fn ca_name(&self) -> Option<&str> {
        self.ca_name.as_deref()
    }

    pub fn is_self_signed(&self) -> bool {
        self.self_signed
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    pub fn key_length(&self) -> u32 {
        self.key_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CertificateGenerationRequest {
        CertificateGenerationRequest {
            common_name: Some("service.internal".to_string()),
            ca: Some("my-ca".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_dn_string_order() {
        let subject = SubjectName {
            organization: Some("foo".to_string()),
            state: Some("bar".to_string()),
            country: Some("mars".to_string()),
            ..Default::default()
        };
        assert_eq!(subject.to_dn_string(), "O=foo,ST=bar,C=mars");

        let full = SubjectName {
            common_name: Some("cn".to_string()),
            organization: Some("o".to_string()),
            organization_unit: Some("ou".to_string()),
            locality: Some("l".to_string()),
            state: Some("st".to_string()),
            country: Some("c".to_string()),
        };
        assert_eq!(full.to_dn_string(), "L=l,O=o,ST=st,C=c,OU=ou,CN=cn");
    }

    #[test]
    fn test_dn_values_are_escaped() {
        let subject = SubjectName {
            organization: Some("Acme, Inc.".to_string()),
            ..Default::default()
        };
        assert_eq!(subject.to_dn_string(), "O=Acme\\, Inc.");
    }

    #[test]
    fn test_defaults_and_ca_name_normalization() {
        let parameters = CertificateGenerationParameters::from_request(&request()).unwrap();
        assert_eq!(parameters.ca_name(), Some("/my-ca"));
        assert_eq!(parameters.duration_days(), 365);
        assert_eq!(parameters.key_length(), 2048);
        assert!(!parameters.is_self_signed());

        let slashed = CertificateGenerationRequest {
            ca: Some("/my-ca".to_string()),
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&slashed).unwrap(),
            parameters
        );
    }

    #[test]
    fn test_ca_without_signer_is_self_signed() {
        let request = CertificateGenerationRequest {
            common_name: Some("root".to_string()),
            is_ca: true,
            ..Default::default()
        };
        let parameters = CertificateGenerationParameters::from_request(&request).unwrap();
        assert!(parameters.is_self_signed());
        assert!(parameters.is_ca());
        assert_eq!(parameters.ca_name(), None);
    }

    #[test]
    fn test_validation_order() {
        let empty = CertificateGenerationRequest::default();
        assert_eq!(
            CertificateGenerationParameters::from_request(&empty),
            Err(ValidationError::MissingCertificateParameters)
        );

        let unsigned = CertificateGenerationRequest {
            common_name: Some("leaf".to_string()),
            ..Default::default()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&unsigned),
            Err(ValidationError::MissingSigningCa)
        );

        let conflicting = CertificateGenerationRequest {
            self_sign: true,
            key_length: Some(1024),
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&conflicting),
            Err(ValidationError::CaAndSelfSign)
        );

        let short_key = CertificateGenerationRequest {
            key_length: Some(1024),
            alternative_names: vec!["not a name".to_string()],
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&short_key),
            Err(ValidationError::InvalidKeyLength(1024))
        );

        let bad_usage = CertificateGenerationRequest {
            extended_key_usage: vec!["world_domination".to_string()],
            key_usage: vec!["sign_everything".to_string()],
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&bad_usage),
            Err(ValidationError::InvalidExtendedKeyUsage(
                "world_domination".to_string()
            ))
        );

        let long_duration = CertificateGenerationRequest {
            duration: Some(3651),
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&long_duration),
            Err(ValidationError::InvalidDuration(3651))
        );

        let long_country = CertificateGenerationRequest {
            country: Some("USA".to_string()),
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&long_country),
            Err(ValidationError::FieldTooLong {
                field: "country",
                max: 2
            })
        );
    }

    #[test]
    fn test_accepted_key_lengths() {
        for key_length in [2048, 3072, 4096] {
            let request = CertificateGenerationRequest {
                key_length: Some(key_length),
                ..request()
            };
            let parameters = CertificateGenerationParameters::from_request(&request).unwrap();
            assert_eq!(parameters.key_length(), key_length);
        }
    }

    #[test]
    fn test_alternative_names() {
        assert_eq!(
            AlternativeName::parse("10.0.0.1"),
            Some(AlternativeName::Ip("10.0.0.1".parse().unwrap()))
        );
        assert_eq!(
            AlternativeName::parse("::1"),
            Some(AlternativeName::Ip("::1".parse().unwrap()))
        );
        assert_eq!(
            AlternativeName::parse("*.apps.example.com"),
            Some(AlternativeName::Dns("*.apps.example.com".to_string()))
        );
        assert!(AlternativeName::parse("db-1.internal").is_some());
        for invalid in ["", "foo bar", "-leading.example", "*.", "a.*.example", "1.2.3.999"] {
            assert_eq!(AlternativeName::parse(invalid), None, "name: {invalid}");
        }

        let overlong = format!("{}.example", vec!["a".repeat(60); 5].join("."));
        let request = CertificateGenerationRequest {
            alternative_names: vec![overlong],
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&request),
            Err(ValidationError::FieldTooLong {
                field: "alternative_name",
                max: 253
            })
        );
    }

    #[test]
    fn test_usage_order_does_not_matter() {
        let first = CertificateGenerationRequest {
            key_usage: vec!["digital_signature".to_string(), "key_encipherment".to_string()],
            extended_key_usage: vec!["server_auth".to_string(), "client_auth".to_string()],
            ..request()
        };
        let second = CertificateGenerationRequest {
            key_usage: vec!["key_encipherment".to_string(), "digital_signature".to_string()],
            extended_key_usage: vec!["client_auth".to_string(), "server_auth".to_string()],
            ..request()
        };
        assert_eq!(
            CertificateGenerationParameters::from_request(&first).unwrap(),
            CertificateGenerationParameters::from_request(&second).unwrap()
        );
    }
}
