//! Top-level wiring.
//!
//! [`VaultBuilder`] turns a [`VaultConfig`] plus the two store
//! implementations into a ready [`Vault`]: encryptor, factory, certificate
//! engine, writer and key rotator all share one logger root and one clock.

use crate::certificate::{
    CertificateGenerator, RandomSerialNumberSource, SerialNumberSource, StoreAuthorityLookup,
};
use crate::config::VaultConfig;
use crate::credential::{CredentialFactory, CredentialVersion};
use crate::encryption::{EncryptionProvider, Encryptor};
use crate::error::Result;
use crate::generation::{CredentialGenerator, KeyPairGenerator, OpenSslKeyPairGenerator};
use crate::key_rotation::{KeyRotator, KeyUsageReport, RotationSummary};
use crate::store::{CredentialVersionStore, EncryptedValueStore};
use crate::types::{SystemTimeSource, TimeSource};
use crate::writer::CredentialWriter;
use credvault_common::logging::{Component, Logger};
use std::sync::Arc;

pub struct VaultBuilder {
    config: VaultConfig,
    credentials: Arc<dyn CredentialVersionStore>,
    values: Arc<dyn EncryptedValueStore>,
    provider: Option<Arc<dyn EncryptionProvider>>,
    clock: Arc<dyn TimeSource>,
    key_pairs: Arc<dyn KeyPairGenerator>,
    serial_numbers: Arc<dyn SerialNumberSource>,
}

impl VaultBuilder {
    pub fn new(
        config: VaultConfig,
        credentials: Arc<dyn CredentialVersionStore>,
        values: Arc<dyn EncryptedValueStore>,
    ) -> Self {
        Self {
            config,
            credentials,
            values,
            provider: None,
            clock: Arc::new(SystemTimeSource),
            key_pairs: Arc::new(OpenSslKeyPairGenerator),
            serial_numbers: Arc::new(RandomSerialNumberSource),
        }
    }

    /// Use `provider` instead of the local AES-GCM provider built from the
    /// configured keys
    pub fn with_provider(mut self, provider: Arc<dyn EncryptionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_pair_generator(mut self, key_pairs: Arc<dyn KeyPairGenerator>) -> Self {
        self.key_pairs = key_pairs;
        self
    }

    pub fn with_serial_number_source(mut self, serial_numbers: Arc<dyn SerialNumberSource>) -> Self {
        self.serial_numbers = serial_numbers;
        self
    }

    pub fn build(self) -> Result<Vault> {
        self.config.validate()?;
        self.config.logging.apply();
        let root = Logger::new_root(Component::Vault, &self.config.instance_id);

        let provider: Arc<dyn EncryptionProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(self.config.build_provider()?),
        };
        let encryptor = Arc::new(Encryptor::new(
            provider,
            Arc::new(root.with_component(Component::Encryption)),
        ));
        let factory = Arc::new(CredentialFactory::new(encryptor.clone(), self.clock.clone()));

        let authorities = Arc::new(StoreAuthorityLookup::new(
            self.credentials.clone(),
            factory.clone(),
        ));
        let certificates = Arc::new(CertificateGenerator::new(
            authorities,
            self.key_pairs.clone(),
            self.serial_numbers,
            self.clock,
            Arc::new(root.with_component(Component::Certificates)),
        ));
        let generator = Arc::new(CredentialGenerator::new(self.key_pairs, certificates));

        let writer = CredentialWriter::new(
            factory.clone(),
            generator,
            self.credentials,
            self.config.operating_mode,
            Arc::new(root.with_component(Component::Writer)),
        );
        let rotator = KeyRotator::new(
            encryptor.clone(),
            self.config.key_set()?,
            self.values,
            Arc::new(root.with_component(Component::KeyRotation)),
        );

        root.info_args(format_args!(
            "Vault ready in {:?} mode with active key {}",
            self.config.operating_mode,
            rotator.key_set().active()
        ));

        Ok(Vault {
            config: self.config,
            logger: Arc::new(root),
            encryptor,
            factory,
            writer,
            rotator,
        })
    }
}

/// A configured credential vault
pub struct Vault {
    config: VaultConfig,
    logger: Arc<Logger>,
    encryptor: Arc<Encryptor>,
    factory: Arc<CredentialFactory>,
    writer: CredentialWriter,
    rotator: KeyRotator,
}

impl Vault {
    pub fn builder(
        config: VaultConfig,
        credentials: Arc<dyn CredentialVersionStore>,
        values: Arc<dyn EncryptedValueStore>,
    ) -> VaultBuilder {
        VaultBuilder::new(config, credentials, values)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn encryptor(&self) -> &Arc<Encryptor> {
        &self.encryptor
    }

    pub fn factory(&self) -> &Arc<CredentialFactory> {
        &self.factory
    }

    pub fn writer(&self) -> &CredentialWriter {
        &self.writer
    }

    pub fn rotator(&self) -> &KeyRotator {
        &self.rotator
    }

    pub fn get(&self, name: &str) -> Result<Option<CredentialVersion>> {
        self.writer.find_latest(name)
    }

    /// Rotate every stored value onto the active key using the configured
    /// batch size
    pub fn rotate_keys(&self) -> Result<RotationSummary> {
        self.rotator.rotate_all(self.config.rotation_batch_size)
    }

    pub fn key_usage_report(&self) -> Result<KeyUsageReport> {
        self.rotator.stored_usage_report()
    }
}
