use crate::credential::{CertificateCredentialValue, CredentialFactory, CredentialVersion};
use crate::error::{ResolutionError, Result};
use crate::store::CredentialVersionStore;
use crate::types::with_leading_slash;
use std::sync::Arc;

/// Name used when a caller asks for "the" CA without naming one
pub const DEFAULT_CA_NAME: &str = "/default";

/// Resolves a CA name to the version that should sign new certificates
pub trait CertificateAuthorityLookup: Send + Sync {
    /// Newest non-transitional version of the named CA, `None` when the
    /// name is unknown
    fn find_active_version(&self, ca_name: &str) -> Result<Option<CertificateCredentialValue>>;
}

/// Lookup backed by the credential version store
pub struct StoreAuthorityLookup {
    store: Arc<dyn CredentialVersionStore>,
    factory: Arc<CredentialFactory>,
}

impl StoreAuthorityLookup {
    pub fn new(store: Arc<dyn CredentialVersionStore>, factory: Arc<CredentialFactory>) -> Self {
        Self { store, factory }
    }
}

impl CertificateAuthorityLookup for StoreAuthorityLookup {
    fn find_active_version(&self, ca_name: &str) -> Result<Option<CertificateCredentialValue>> {
        let ca_name = with_leading_slash(ca_name);
        for record in self.store.find_all(&ca_name)? {
            match self.factory.from_storage(record) {
                CredentialVersion::Certificate(version) if version.is_transitional() => continue,
                CredentialVersion::Certificate(version) => {
                    return version.certificate_value().map(Some)
                }
                _ => return Err(ResolutionError::CertNotCa(ca_name).into()),
            }
        }
        Ok(None)
    }
}
