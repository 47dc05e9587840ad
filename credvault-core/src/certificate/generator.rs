//! X.509 issuance.
//!
//! Resolves the signing authority, generates a fresh key pair, then builds
//! and signs the certificate with OpenSSL. Self-signed certificates are
//! signed with their own key.

use crate::certificate::authority::{CertificateAuthorityLookup, DEFAULT_CA_NAME};
use crate::certificate::parameters::{
    AlternativeName, CertificateGenerationParameters, ExtendedKeyUsageFlag, KeyUsageFlag,
    SubjectName,
};
use crate::certificate::reader::CertificateReader;
use crate::credential::CertificateCredentialValue;
use crate::error::{ResolutionError, Result, ValidationError, VaultError};
use crate::generation::key_pair::{private_key_pem, KeyPairGenerator};
use crate::types::TimeSource;
use chrono::Duration;
use credvault_common::logging::Logger;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509NameRef, X509Ref, X509};
use std::sync::Arc;

const SERIAL_NUMBER_BITS: i32 = 159;

/// Source of certificate serial numbers
pub trait SerialNumberSource: Send + Sync {
    fn next_serial(&self) -> Result<BigNum>;
}

/// Random positive serials below 2^159
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSerialNumberSource;

impl SerialNumberSource for RandomSerialNumberSource {
    fn next_serial(&self) -> Result<BigNum> {
        let mut serial = BigNum::new()?;
        serial.rand(SERIAL_NUMBER_BITS, MsbOption::MAYBE_ZERO, false)?;
        if serial.num_bits() == 0 {
            serial.add_word(1)?;
        }
        Ok(serial)
    }
}

/// The CA that will sign a new certificate
struct SigningAuthority {
    certificate: X509,
    certificate_pem: String,
    private_key: PKey<Private>,
}

fn certificate_error(context: &str) -> impl Fn(openssl::error::ErrorStack) -> VaultError + '_ {
    move |e| VaultError::CertificateError(format!("{context}: {e}"))
}

fn build_subject_name(subject: &SubjectName) -> Result<X509Name> {
    let mut builder = X509NameBuilder::new()?;
    for (key, value) in subject.components() {
        let nid = match key {
            "L" => Nid::LOCALITYNAME,
            "O" => Nid::ORGANIZATIONNAME,
            "ST" => Nid::STATEORPROVINCENAME,
            "C" => Nid::COUNTRYNAME,
            "OU" => Nid::ORGANIZATIONALUNITNAME,
            _ => Nid::COMMONNAME,
        };
        builder
            .append_entry_by_nid(nid, value)
            .map_err(certificate_error("Failed to set subject entry"))?;
    }
    Ok(builder.build())
}

fn key_usage_extension(flags: impl IntoIterator<Item = KeyUsageFlag>) -> KeyUsage {
    let mut usage = KeyUsage::new();
    for flag in flags {
        match flag {
            KeyUsageFlag::DigitalSignature => usage.digital_signature(),
            KeyUsageFlag::NonRepudiation => usage.non_repudiation(),
            KeyUsageFlag::KeyEncipherment => usage.key_encipherment(),
            KeyUsageFlag::DataEncipherment => usage.data_encipherment(),
            KeyUsageFlag::KeyAgreement => usage.key_agreement(),
            KeyUsageFlag::KeyCertSign => usage.key_cert_sign(),
            KeyUsageFlag::CrlSign => usage.crl_sign(),
            KeyUsageFlag::EncipherOnly => usage.encipher_only(),
            KeyUsageFlag::DecipherOnly => usage.decipher_only(),
        };
    }
    usage
}

fn extended_key_usage_extension(
    flags: impl IntoIterator<Item = ExtendedKeyUsageFlag>,
) -> ExtendedKeyUsage {
    let mut usage = ExtendedKeyUsage::new();
    for flag in flags {
        match flag {
            ExtendedKeyUsageFlag::ServerAuth => usage.server_auth(),
            ExtendedKeyUsageFlag::ClientAuth => usage.client_auth(),
            ExtendedKeyUsageFlag::CodeSigning => usage.code_signing(),
            ExtendedKeyUsageFlag::EmailProtection => usage.email_protection(),
            ExtendedKeyUsageFlag::Timestamping => usage.time_stamping(),
        };
    }
    usage
}

fn to_pem(certificate: &X509Ref) -> Result<String> {
    let pem = certificate
        .to_pem()
        .map_err(certificate_error("Failed to encode certificate"))?;
    String::from_utf8(pem).map_err(|e| VaultError::SerializationError(e.to_string()))
}

/// Certificate issuance engine
pub struct CertificateGenerator {
    authorities: Arc<dyn CertificateAuthorityLookup>,
    key_pairs: Arc<dyn KeyPairGenerator>,
    serial_numbers: Arc<dyn SerialNumberSource>,
    clock: Arc<dyn TimeSource>,
    logger: Arc<Logger>,
}

impl CertificateGenerator {
    pub fn new(
        authorities: Arc<dyn CertificateAuthorityLookup>,
        key_pairs: Arc<dyn KeyPairGenerator>,
        serial_numbers: Arc<dyn SerialNumberSource>,
        clock: Arc<dyn TimeSource>,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            authorities,
            key_pairs,
            serial_numbers,
            clock,
            logger,
        }
    }

    /// Issue a certificate for validated `parameters`
    pub fn generate(
        &self,
        parameters: &CertificateGenerationParameters,
    ) -> Result<CertificateCredentialValue> {
        let authority = self.resolve_authority(parameters)?;
        let key_pair = self.key_pairs.generate(parameters.key_length())?;
        let certificate = self.build_certificate(parameters, &key_pair, authority.as_ref())?;
        let certificate_pem = to_pem(&certificate)?;

        self.logger.info_args(format_args!(
            "Issued {}-bit certificate for '{}' signed by {}",
            parameters.key_length(),
            parameters.subject().to_dn_string(),
            parameters.ca_name().unwrap_or("itself")
        ));

        let ca = match authority {
            Some(authority) => authority.certificate_pem,
            None => certificate_pem.clone(),
        };
        Ok(CertificateCredentialValue {
            ca: Some(ca),
            certificate: Some(certificate_pem),
            private_key: Some(private_key_pem(&key_pair)?),
            ca_name: parameters.ca_name().map(str::to_string),
            transitional: false,
        })
    }

    fn resolve_authority(
        &self,
        parameters: &CertificateGenerationParameters,
    ) -> Result<Option<SigningAuthority>> {
        if parameters.is_self_signed() {
            return Ok(None);
        }
        let ca_name = parameters
            .ca_name()
            .ok_or(ValidationError::MissingSigningCa)?;

        let ca = self
            .authorities
            .find_active_version(ca_name)?
            .ok_or_else(|| {
                if ca_name == DEFAULT_CA_NAME {
                    ResolutionError::DefaultCaNotFound
                } else {
                    ResolutionError::CaNotFound(ca_name.to_string())
                }
            })?;

        let private_key_pem = ca
            .private_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ResolutionError::CaMissingPrivateKey(ca_name.to_string()))?;
        let certificate_pem = ca
            .certificate
            .filter(|certificate| !certificate.is_empty())
            .ok_or_else(|| ResolutionError::CertNotCa(ca_name.to_string()))?;
        if !CertificateReader::from_pem(&certificate_pem)?.is_ca() {
            return Err(ResolutionError::CertNotCa(ca_name.to_string()).into());
        }

        let certificate = X509::from_pem(certificate_pem.as_bytes())
            .map_err(certificate_error("Failed to load CA certificate"))?;
        let private_key = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(certificate_error("Failed to load CA private key"))?;

        Ok(Some(SigningAuthority {
            certificate,
            certificate_pem,
            private_key,
        }))
    }

    fn build_certificate(
        &self,
        parameters: &CertificateGenerationParameters,
        key_pair: &PKeyRef<Private>,
        authority: Option<&SigningAuthority>,
    ) -> Result<X509> {
        let mut builder = X509Builder::new()?;
        builder
            .set_version(2)
            .map_err(certificate_error("Failed to set version"))?;

        let serial = self.serial_numbers.next_serial()?.to_asn1_integer()?;
        builder
            .set_serial_number(&serial)
            .map_err(certificate_error("Failed to set serial number"))?;

        let subject = build_subject_name(parameters.subject())?;
        builder
            .set_subject_name(&subject)
            .map_err(certificate_error("Failed to set subject name"))?;
        let issuer_name: &X509NameRef = match authority {
            Some(authority) => authority.certificate.subject_name(),
            None => &subject,
        };
        builder
            .set_issuer_name(issuer_name)
            .map_err(certificate_error("Failed to set issuer name"))?;

        let now = self.clock.now();
        let expiry = now + Duration::days(i64::from(parameters.duration_days()));
        let not_before = Asn1Time::from_unix(now.timestamp() as _)?;
        let not_after = Asn1Time::from_unix(expiry.timestamp() as _)?;
        builder
            .set_not_before(&not_before)
            .map_err(certificate_error("Failed to set not_before"))?;
        builder
            .set_not_after(&not_after)
            .map_err(certificate_error("Failed to set not_after"))?;

        builder
            .set_pubkey(key_pair)
            .map_err(certificate_error("Failed to set public key"))?;

        let mut basic_constraints = BasicConstraints::new();
        basic_constraints.critical();
        if parameters.is_ca() {
            basic_constraints.ca();
        }
        builder.append_extension(basic_constraints.build()?)?;

        if !parameters.alternative_names().is_empty() {
            let mut names = SubjectAlternativeName::new();
            for name in parameters.alternative_names() {
                match name {
                    AlternativeName::Dns(dns) => names.dns(dns),
                    AlternativeName::Ip(ip) => names.ip(&ip.to_string()),
                };
            }
            let issuer = authority.map(|authority| &*authority.certificate);
            let extension = names.build(&builder.x509v3_context(issuer, None))?;
            builder.append_extension(extension)?;
        }

        if !parameters.key_usage().is_empty() {
            let usage = key_usage_extension(parameters.key_usage().iter().copied());
            builder.append_extension(usage.build()?)?;
        }
        if !parameters.extended_key_usage().is_empty() {
            let usage = extended_key_usage_extension(parameters.extended_key_usage().iter().copied());
            builder.append_extension(usage.build()?)?;
        }

        let subject_key_id =
            SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
        builder.append_extension(subject_key_id)?;

        // An authority key identifier can only reference an issuer that has a key id.
        if let Some(authority) = authority {
            if authority.certificate.subject_key_id().is_some() {
                let authority_key_id = AuthorityKeyIdentifier::new()
                    .keyid(true)
                    .build(&builder.x509v3_context(Some(&*authority.certificate), None))?;
                builder.append_extension(authority_key_id)?;
            }
        }

        let signing_key: &PKeyRef<Private> = match authority {
            Some(authority) => &authority.private_key,
            None => key_pair,
        };
        builder
            .sign(signing_key, MessageDigest::sha256())
            .map_err(certificate_error("Failed to sign certificate"))?;

        Ok(builder.build())
    }
}
