use crate::certificate::parameters::{
    AlternativeName, ExtendedKeyUsageFlag, KeyUsageFlag, SubjectName,
};
use crate::error::{Result, VaultError};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

const SECONDS_PER_DAY: i64 = 86_400;

/// Read-only view of a PEM certificate, extracted once at parse time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateReader {
    subject: SubjectName,
    subject_dn: String,
    issuer_dn: String,
    alternative_names: Vec<AlternativeName>,
    key_usage: BTreeSet<KeyUsageFlag>,
    extended_key_usage: BTreeSet<ExtendedKeyUsageFlag>,
    is_ca: bool,
    self_signed: bool,
    key_length: u32,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    has_subject_key_id: bool,
    has_authority_key_id: bool,
}

fn parse_error(context: &str, e: impl std::fmt::Display) -> VaultError {
    VaultError::CertificateError(format!("{context}: {e}"))
}

fn first_value<'a, 'b: 'a>(
    mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Option<String> {
    values
        .next()
        .and_then(|attribute| attribute.as_str().ok())
        .map(str::to_string)
}

fn to_utc(time: ASN1Time) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| VaultError::CertificateError("Certificate validity out of range".to_string()))
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

impl CertificateReader {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, pem) = parse_x509_pem(pem.as_bytes())
            .map_err(|e| parse_error("Failed to decode certificate PEM", e))?;
        let certificate = pem
            .parse_x509()
            .map_err(|e| parse_error("Failed to parse certificate", e))?;
        Self::from_certificate(&certificate)
    }

    fn from_certificate(certificate: &X509Certificate<'_>) -> Result<Self> {
        let name = certificate.subject();
        let subject = SubjectName {
            common_name: first_value(name.iter_common_name()),
            organization: first_value(name.iter_organization()),
            organization_unit: first_value(name.iter_organizational_unit()),
            locality: first_value(name.iter_locality()),
            state: first_value(name.iter_state_or_province()),
            country: first_value(name.iter_country()),
        };

        let is_ca = certificate
            .basic_constraints()
            .map_err(|e| parse_error("Invalid basic constraints", e))?
            .map(|extension| extension.value.ca)
            .unwrap_or(false);

        let mut key_usage = BTreeSet::new();
        if let Some(extension) = certificate
            .key_usage()
            .map_err(|e| parse_error("Invalid key usage", e))?
        {
            let usage = extension.value;
            let flags = [
                (usage.digital_signature(), KeyUsageFlag::DigitalSignature),
                (usage.non_repudiation(), KeyUsageFlag::NonRepudiation),
                (usage.key_encipherment(), KeyUsageFlag::KeyEncipherment),
                (usage.data_encipherment(), KeyUsageFlag::DataEncipherment),
                (usage.key_agreement(), KeyUsageFlag::KeyAgreement),
                (usage.key_cert_sign(), KeyUsageFlag::KeyCertSign),
                (usage.crl_sign(), KeyUsageFlag::CrlSign),
                (usage.encipher_only(), KeyUsageFlag::EncipherOnly),
                (usage.decipher_only(), KeyUsageFlag::DecipherOnly),
            ];
            key_usage.extend(flags.into_iter().filter(|(set, _)| *set).map(|(_, flag)| flag));
        }

        let mut extended_key_usage = BTreeSet::new();
        if let Some(extension) = certificate
            .extended_key_usage()
            .map_err(|e| parse_error("Invalid extended key usage", e))?
        {
            let usage = extension.value;
            let flags = [
                (usage.server_auth, ExtendedKeyUsageFlag::ServerAuth),
                (usage.client_auth, ExtendedKeyUsageFlag::ClientAuth),
                (usage.code_signing, ExtendedKeyUsageFlag::CodeSigning),
                (usage.email_protection, ExtendedKeyUsageFlag::EmailProtection),
                (usage.time_stamping, ExtendedKeyUsageFlag::Timestamping),
            ];
            extended_key_usage
                .extend(flags.into_iter().filter(|(set, _)| *set).map(|(_, flag)| flag));
        }

        let mut alternative_names = Vec::new();
        if let Some(extension) = certificate
            .subject_alternative_name()
            .map_err(|e| parse_error("Invalid subject alternative name", e))?
        {
            for name in &extension.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => {
                        alternative_names.push(AlternativeName::Dns(dns.to_string()))
                    }
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            alternative_names.push(AlternativeName::Ip(ip));
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut has_subject_key_id = false;
        let mut has_authority_key_id = false;
        for extension in certificate.extensions() {
            match extension.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(_) => has_subject_key_id = true,
                ParsedExtension::AuthorityKeyIdentifier(_) => has_authority_key_id = true,
                _ => {}
            }
        }

        let key_length = match certificate.public_key().parsed() {
            Ok(PublicKey::RSA(rsa)) => rsa.key_size() as u32,
            _ => 0,
        };

        let subject_dn = certificate.subject().to_string();
        let issuer_dn = certificate.issuer().to_string();
        let self_signed = subject_dn == issuer_dn && certificate.verify_signature(None).is_ok();

        let validity = certificate.validity();
        Ok(Self {
            subject,
            subject_dn,
            issuer_dn,
            alternative_names,
            key_usage,
            extended_key_usage,
            is_ca,
            self_signed,
            key_length,
            not_before: to_utc(validity.not_before)?,
            not_after: to_utc(validity.not_after)?,
            has_subject_key_id,
            has_authority_key_id,
        })
    }

    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    pub fn subject_dn(&self) -> &str {
        &self.subject_dn
    }

    pub fn issuer_dn(&self) -> &str {
        &self.issuer_dn
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

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Issuer equals subject and the signature verifies under the
    /// certificate's own key
    pub fn is_self_signed(&self) -> bool {
        self.self_signed
    }

    pub fn key_length(&self) -> u32 {
        self.key_length
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn expiry_date(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Validity window in whole days
    pub fn duration_days(&self) -> u32 {
        let seconds = (self.not_after - self.not_before).num_seconds().max(0);
        (seconds / SECONDS_PER_DAY) as u32
    }

    pub fn has_subject_key_id(&self) -> bool {
        self.has_subject_key_id
    }

    pub fn has_authority_key_id(&self) -> bool {
        self.has_authority_key_id
    }
}
