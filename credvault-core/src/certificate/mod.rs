//! X.509 certificate support: request validation, issuance, authority
//! resolution and read-back of existing certificates.

pub mod authority;
pub mod generator;
pub mod parameters;
pub mod reader;

pub use authority::{CertificateAuthorityLookup, StoreAuthorityLookup, DEFAULT_CA_NAME};
pub use generator::{CertificateGenerator, RandomSerialNumberSource, SerialNumberSource};
pub use parameters::{
    AlternativeName, CertificateGenerationParameters, CertificateGenerationRequest,
    ExtendedKeyUsageFlag, KeyUsageFlag, SubjectName,
};
pub use reader::CertificateReader;
