use crate::certificate::{CertificateGenerationParameters, CertificateReader};
use crate::credential::{
    CertificateCredentialValue, CredentialBehavior, CredentialValue, VersionCore,
};
use crate::error::Result;
use crate::generation::GenerationParameters;
use crate::store::CredentialVersionRecord;
use crate::types::CredentialType;
use chrono::{DateTime, Utc};
use std::sync::OnceLock;

/// X.509 certificate credential.
///
/// The private key is the encrypted primary value. The CA and leaf
/// certificates are public and stored in clear; the leaf is parsed on first
/// use.
#[derive(Debug, Clone)]
pub struct CertificateCredentialVersion {
    core: VersionCore,
    ca: Option<String>,
    certificate: Option<String>,
    ca_name: Option<String>,
    transitional: bool,
    reader: OnceLock<Option<CertificateReader>>,
}

impl CertificateCredentialVersion {
    pub(crate) fn new(
        core: VersionCore,
        ca: Option<String>,
        certificate: Option<String>,
        ca_name: Option<String>,
        transitional: bool,
    ) -> Self {
        Self {
            core,
            ca,
            certificate,
            ca_name,
            transitional,
            reader: OnceLock::new(),
        }
    }

    pub(crate) fn from_record(core: VersionCore, record: &CredentialVersionRecord) -> Self {
        Self::new(
            core,
            record.ca.clone(),
            record.certificate.clone(),
            record.ca_name.clone(),
            record.transitional,
        )
    }

    pub fn ca(&self) -> Option<&str> {
        self.ca.as_deref()
    }

    pub fn certificate(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    pub fn ca_name(&self) -> Option<&str> {
        self.ca_name.as_deref()
    }

    /// Transitional versions are kept for trust distribution and are never
    /// picked to sign
    pub fn is_transitional(&self) -> bool {
        self.transitional
    }

    pub fn reader(&self) -> Option<&CertificateReader> {
        self.reader
            .get_or_init(|| {
                self.certificate
                    .as_deref()
                    .filter(|pem| !pem.is_empty())
                    .and_then(|pem| CertificateReader::from_pem(pem).ok())
            })
            .as_ref()
    }

    pub fn is_certificate_authority(&self) -> bool {
        self.reader().is_some_and(CertificateReader::is_ca)
    }

    pub fn is_self_signed(&self) -> bool {
        self.reader().is_some_and(CertificateReader::is_self_signed)
    }

    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        self.reader().map(CertificateReader::expiry_date)
    }

    pub fn certificate_value(&self) -> Result<CertificateCredentialValue> {
        Ok(CertificateCredentialValue {
            ca: self.ca.clone(),
            certificate: self.certificate.clone(),
            private_key: self.core.decrypt()?,
            ca_name: self.ca_name.clone(),
            transitional: self.transitional,
        })
    }
}

impl CredentialBehavior for CertificateCredentialVersion {
    fn core(&self) -> &VersionCore {
        &self.core
    }

    fn credential_type(&self) -> CredentialType {
        CredentialType::Certificate
    }

    fn value(&self) -> Result<CredentialValue> {
        Ok(CredentialValue::Certificate(self.certificate_value()?))
    }

    fn rotate(&mut self) -> Result<()> {
        self.core.rotate()
    }

    fn matches_generation_parameters(&self, parameters: &GenerationParameters) -> Result<bool> {
        let GenerationParameters::Certificate(requested) = parameters else {
            return Ok(false);
        };
        Ok(self.reader().is_some_and(|reader| {
            CertificateGenerationParameters::from_certificate(reader, self.ca_name())
                == *requested
        }))
    }

    fn generation_parameters(&self) -> Result<Option<GenerationParameters>> {
        Ok(self.reader().map(|reader| {
            GenerationParameters::Certificate(CertificateGenerationParameters::from_certificate(
                reader,
                self.ca_name(),
            ))
        }))
    }

    fn to_record(&self) -> CredentialVersionRecord {
        CredentialVersionRecord {
            ca: self.ca.clone(),
            certificate: self.certificate.clone(),
            ca_name: self.ca_name.clone(),
            transitional: self.transitional,
            ..self.core.record(CredentialType::Certificate)
        }
    }
}
