// Test utilities for credvault crates
//
// In-memory stores, instrumented providers and fixed clocks. Nothing in this
// crate is meant for production use.

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use credvault_common::logging::{Component, Logger};
use credvault_core::certificate::SerialNumberSource;
use credvault_core::{
    AesGcmEncryptionProvider, CertificateGenerationParameters, CertificateGenerationRequest,
    CredentialVersionRecord, CredentialVersionStore, EncryptedValue, EncryptedValueStore,
    EncryptionProvider, Encryptor, KeyId, KeyPairGenerator, LocalEncryptionKey,
    OpenSslKeyPairGenerator, ProviderCiphertext, ProviderError, StoreError, TimeSource, Vault,
    VaultConfig,
};
use openssl::bn::BigNum;
use openssl::pkey::{PKey, Private};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub const TEST_INSTANCE_ID: &str = "test-vault";
pub const TEST_ACTIVE_SECRET: &str = "test-active-key-secret";

/* ---------------------------- Credential store --------------------------- */

/// In-memory implementation of both store traits.
///
/// Versions are kept per name in insertion order. The encrypted value view
/// spans every encrypted field of every stored version, so key rotation
/// updates what later reads decrypt.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    versions: RwLock<HashMap<String, Vec<CredentialVersionRecord>>>,
    injected_conflicts: AtomicUsize,
    save_attempts: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail with a unique constraint violation
    pub fn inject_unique_violations(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }

    pub fn version_count(&self, name: &str) -> usize {
        self.versions
            .read()
            .map(|versions| versions.get(name).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Key ids of every stored encrypted value, empty blobs excluded
    pub fn stored_key_ids(&self) -> Vec<KeyId> {
        let versions = match self.versions.read() {
            Ok(versions) => versions,
            Err(_) => return Vec::new(),
        };
        versions
            .values()
            .flatten()
            .flat_map(|record| record.encrypted_values())
            .filter_map(|value| value.key_id().cloned())
            .collect()
    }

    /// Insert `record` directly, bypassing every check
    pub fn insert_raw(&self, record: CredentialVersionRecord) {
        if let Ok(mut versions) = self.versions.write() {
            versions
                .entry(record.credential_name.name.clone())
                .or_default()
                .push(record);
        }
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("store lock poisoned".to_string())
}

impl CredentialVersionStore for InMemoryCredentialStore {
    fn find_latest(&self, name: &str) -> std::result::Result<Option<CredentialVersionRecord>, StoreError> {
        let versions = self.versions.read().map_err(|_| poisoned())?;
        Ok(versions.get(name).and_then(|history| history.last().cloned()))
    }

    fn find_all(&self, name: &str) -> std::result::Result<Vec<CredentialVersionRecord>, StoreError> {
        let versions = self.versions.read().map_err(|_| poisoned())?;
        Ok(versions
            .get(name)
            .map(|history| history.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn save(&self, record: &CredentialVersionRecord) -> std::result::Result<(), StoreError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_conflict() {
            return Err(StoreError::UniqueViolation(format!(
                "credential name {} already exists",
                record.credential_name.name
            )));
        }

        let mut versions = self.versions.write().map_err(|_| poisoned())?;
        let history = versions
            .entry(record.credential_name.name.clone())
            .or_default();
        if let Some(first) = history.first() {
            if first.credential_name.uuid != record.credential_name.uuid {
                return Err(StoreError::UniqueViolation(format!(
                    "credential name {} already exists",
                    record.credential_name.name
                )));
            }
        }
        history.push(record.clone());
        Ok(())
    }
}

impl EncryptedValueStore for InMemoryCredentialStore {
    fn count_by_key_id(&self) -> std::result::Result<HashMap<KeyId, u64>, StoreError> {
        let mut counts = HashMap::new();
        for key_id in self.stored_key_ids() {
            *counts.entry(key_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn find_page_by_key_ids(
        &self,
        key_ids: &[KeyId],
        limit: usize,
    ) -> std::result::Result<Vec<EncryptedValue>, StoreError> {
        let versions = self.versions.read().map_err(|_| poisoned())?;
        Ok(versions
            .values()
            .flatten()
            .flat_map(|record| record.encrypted_values())
            .filter(|value| value.key_id().is_some_and(|id| key_ids.contains(id)))
            .take(limit)
            .cloned()
            .collect())
    }

    fn update(&self, value: &EncryptedValue) -> std::result::Result<(), StoreError> {
        let mut versions = self.versions.write().map_err(|_| poisoned())?;
        for record in versions.values_mut().flatten() {
            if record.encrypted_value.uuid == value.uuid {
                record.encrypted_value = value.clone();
                return Ok(());
            }
            if let Some(parameters) = record.encrypted_generation_parameters.as_mut() {
                if parameters.uuid == value.uuid {
                    *parameters = value.clone();
                    return Ok(());
                }
            }
        }
        Err(StoreError::Backend(format!(
            "encrypted value {} not found",
            value.uuid
        )))
    }
}

/* ------------------------------- Providers ------------------------------- */

/// Wraps a provider and counts calls into it
pub struct CountingEncryptionProvider {
    inner: Arc<dyn EncryptionProvider>,
    encrypt_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
}

impl CountingEncryptionProvider {
    pub fn new(inner: Arc<dyn EncryptionProvider>) -> Self {
        Self {
            inner,
            encrypt_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
        }
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }
}

impl EncryptionProvider for CountingEncryptionProvider {
    fn encrypt(&self, plaintext: &str) -> std::result::Result<ProviderCiphertext, ProviderError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.encrypt(plaintext)
    }

    fn decrypt(
        &self,
        key_id: &KeyId,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> std::result::Result<String, ProviderError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(key_id, ciphertext, nonce)
    }
}

/// Provider whose backend is always down
#[derive(Debug, Default)]
pub struct FailingEncryptionProvider;

impl EncryptionProvider for FailingEncryptionProvider {
    fn encrypt(&self, _plaintext: &str) -> std::result::Result<ProviderCiphertext, ProviderError> {
        Err(ProviderError::Unavailable("hsm offline".to_string()))
    }

    fn decrypt(
        &self,
        _key_id: &KeyId,
        _ciphertext: &[u8],
        _nonce: &[u8],
    ) -> std::result::Result<String, ProviderError> {
        Err(ProviderError::Unavailable("hsm offline".to_string()))
    }
}

/* ------------------------------- Generators ------------------------------ */

/// Real OpenSSL key generation, counted
#[derive(Debug, Default)]
pub struct CountingKeyPairGenerator {
    calls: AtomicUsize,
}

impl CountingKeyPairGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeyPairGenerator for CountingKeyPairGenerator {
    fn generate(&self, key_length: u32) -> credvault_core::Result<PKey<Private>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        OpenSslKeyPairGenerator.generate(key_length)
    }
}

/// Always hands out the same serial number
#[derive(Debug, Clone, Copy)]
pub struct FixedSerialNumberSource(pub u32);

impl SerialNumberSource for FixedSerialNumberSource {
    fn next_serial(&self) -> credvault_core::Result<BigNum> {
        Ok(BigNum::from_u32(self.0)?)
    }
}

/// Clock that only moves when told to
pub struct FixedTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl FixedTimeSource {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 2024-01-01T00:00:00Z
    pub fn epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/* -------------------------------- Builders ------------------------------- */

pub fn create_test_logger(component: Component) -> Arc<Logger> {
    Arc::new(Logger::new_root(component, TEST_INSTANCE_ID))
}

/// Local AES-GCM provider keyed by `active`, able to decrypt under `inactive`
pub fn create_test_provider(active: &str, inactive: &[&str]) -> Result<AesGcmEncryptionProvider> {
    let active = LocalEncryptionKey::derive(active, None)?;
    let inactive = inactive
        .iter()
        .map(|secret| LocalEncryptionKey::derive(secret, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(AesGcmEncryptionProvider::new(active, inactive))
}

pub fn create_test_encryptor(provider: Arc<dyn EncryptionProvider>) -> Arc<Encryptor> {
    Arc::new(Encryptor::new(
        provider,
        create_test_logger(Component::Encryption),
    ))
}

/// Read-write configuration with a single active key
pub fn create_test_config() -> VaultConfig {
    VaultConfig::new(TEST_INSTANCE_ID).with_encryption_key(TEST_ACTIVE_SECRET, true)
}

/// Vault over a fresh in-memory store
pub fn create_test_vault(config: VaultConfig) -> Result<(Vault, Arc<InMemoryCredentialStore>)> {
    let store = Arc::new(InMemoryCredentialStore::new());
    let vault = Vault::builder(config, store.clone(), store.clone()).build()?;
    Ok((vault, store))
}

/// Validated parameters for a self-signed CA
pub fn root_ca_parameters(common_name: &str) -> Result<CertificateGenerationParameters> {
    let request = CertificateGenerationRequest {
        common_name: Some(common_name.to_string()),
        is_ca: true,
        key_usage: vec!["key_cert_sign".to_string(), "crl_sign".to_string()],
        ..Default::default()
    };
    Ok(CertificateGenerationParameters::from_request(&request)?)
}

/// Validated parameters for a leaf signed by `ca_name`
pub fn leaf_parameters(common_name: &str, ca_name: &str) -> Result<CertificateGenerationParameters> {
    let request = CertificateGenerationRequest {
        common_name: Some(common_name.to_string()),
        ca: Some(ca_name.to_string()),
        alternative_names: vec![common_name.to_string(), "10.0.0.1".to_string()],
        extended_key_usage: vec!["server_auth".to_string()],
        ..Default::default()
    };
    Ok(CertificateGenerationParameters::from_request(&request)?)
}

/// Self-signed CA certificate and PKCS#8 key, built without a subject key
/// identifier. Returns `(certificate_pem, private_key_pem)`.
pub fn create_test_ca_without_key_id(common_name: &str) -> Result<(String, String)> {
    use openssl::asn1::Asn1Time;
    use openssl::hash::MessageDigest;
    use openssl::rsa::Rsa;
    use openssl::x509::extension::BasicConstraints;
    use openssl::x509::{X509Builder, X509NameBuilder};

    let key = PKey::from_rsa(Rsa::generate(2048)?)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", common_name)?;
    let name = name.build();

    let serial = BigNum::from_u32(1)?.to_asn1_integer()?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(365)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.set_pubkey(&key)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.sign(&key, MessageDigest::sha256())?;

    let certificate = String::from_utf8(builder.build().to_pem()?)?;
    let private_key = String::from_utf8(key.private_key_to_pem_pkcs8()?)?;
    Ok((certificate, private_key))
}
