//! Credential write path.
//!
//! Set, generate and regenerate all end in the same place: resolve the
//! latest version, decide whether the write is a no-op under the requested
//! [`OverwriteMode`], build the new version through the factory and append it
//! to the store. A lost race on first creation is retried once.

use crate::config::OperatingMode;
use crate::credential::{CredentialFactory, CredentialValue, CredentialVersion};
use crate::error::{ResolutionError, Result, StoreError, ValidationError, VaultError};
use crate::generation::{CredentialGenerator, GenerationParameters};
use crate::store::CredentialVersionStore;
use crate::types::{normalize_credential_name, CredentialType};
use credvault_common::logging::Logger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to do when the credential already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteMode {
    /// Always write a new version
    Overwrite,
    /// Keep the existing version untouched
    NoOverwrite,
    /// Write only when the result would differ from the existing version
    #[default]
    Converge,
}

#[derive(Debug, Clone)]
pub struct SetRequest {
    pub name: String,
    pub value: CredentialValue,
    pub mode: OverwriteMode,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub name: String,
    pub parameters: GenerationParameters,
    pub mode: OverwriteMode,
}

pub struct CredentialWriter {
    factory: Arc<CredentialFactory>,
    generator: Arc<CredentialGenerator>,
    store: Arc<dyn CredentialVersionStore>,
    operating_mode: OperatingMode,
    logger: Arc<Logger>,
}

impl CredentialWriter {
    pub fn new(
        factory: Arc<CredentialFactory>,
        generator: Arc<CredentialGenerator>,
        store: Arc<dyn CredentialVersionStore>,
        operating_mode: OperatingMode,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            factory,
            generator,
            store,
            operating_mode,
            logger,
        }
    }

    /// Newest version of `name`, if any
    pub fn find_latest(&self, name: &str) -> Result<Option<CredentialVersion>> {
        let name = normalize_credential_name(name)?;
        self.latest(&name)
    }

    /// Full history of `name`, newest first
    pub fn find_all(&self, name: &str) -> Result<Vec<CredentialVersion>> {
        let name = normalize_credential_name(name)?;
        Ok(self
            .store
            .find_all(&name)?
            .into_iter()
            .map(|record| self.factory.from_storage(record))
            .collect())
    }

    pub fn set(&self, request: &SetRequest) -> Result<CredentialVersion> {
        self.ensure_writable()?;
        let name = normalize_credential_name(&request.name)?;
        self.with_conflict_retry(&name, || self.set_once(&name, request))
    }

    pub fn generate(&self, request: &GenerateRequest) -> Result<CredentialVersion> {
        self.ensure_writable()?;
        let name = normalize_credential_name(&request.name)?;
        self.with_conflict_retry(&name, || self.generate_once(&name, request))
    }

    /// Generate a new version of `name` from the parameters of its latest one
    pub fn regenerate(&self, name: &str) -> Result<CredentialVersion> {
        self.ensure_writable()?;
        let name = normalize_credential_name(name)?;
        self.with_conflict_retry(&name, || {
            let existing = self
                .latest(&name)?
                .ok_or_else(|| ResolutionError::CredentialNotFound(name.clone()))?;
            let parameters = existing
                .generation_parameters()?
                .ok_or(ValidationError::CannotRegenerate(existing.credential_type()))?;
            // A user keeps its username; only the password and salt rotate
            let value = match (&parameters, existing.as_user().and_then(|u| u.username())) {
                (GenerationParameters::User(stored), Some(username)) => self.generator.generate(
                    &GenerationParameters::User(stored.clone().with_username(username)),
                )?,
                _ => self.generator.generate(&parameters)?,
            };
            self.write_value(&name, &parameters, value, Some(&existing))
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.operating_mode {
            OperatingMode::ReadWrite => Ok(()),
            OperatingMode::ReadOnly => Err(VaultError::ReadOnlyMode),
        }
    }

    fn latest(&self, name: &str) -> Result<Option<CredentialVersion>> {
        Ok(self
            .store
            .find_latest(name)?
            .map(|record| self.factory.from_storage(record)))
    }

    fn check_type(existing: &CredentialVersion, requested: CredentialType) -> Result<()> {
        if existing.credential_type() != requested {
            return Err(ValidationError::TypeMismatch {
                existing: existing.credential_type(),
                requested,
            }
            .into());
        }
        Ok(())
    }

    fn set_once(&self, name: &str, request: &SetRequest) -> Result<CredentialVersion> {
        let credential_type = request.value.credential_type();
        let existing = self.latest(name)?;
        if let Some(existing) = existing.as_ref() {
            Self::check_type(existing, credential_type)?;
            let keep = match request.mode {
                OverwriteMode::Overwrite => false,
                OverwriteMode::NoOverwrite => true,
                OverwriteMode::Converge => request.value.is_equivalent_to(&existing.value()?),
            };
            if keep {
                self.logger
                    .debug_args(format_args!("Keeping existing version of {name}"));
                return Ok(existing.clone());
            }
        }

        let version = self.factory.new_version(
            credential_type,
            name,
            request.value.clone(),
            existing.as_ref(),
            None,
        )?;
        self.save(version)
    }

    fn generate_once(&self, name: &str, request: &GenerateRequest) -> Result<CredentialVersion> {
        let existing = self.latest(name)?;
        if let Some(existing) = existing.as_ref() {
            Self::check_type(existing, request.parameters.credential_type())?;
            let keep = match request.mode {
                OverwriteMode::Overwrite => false,
                OverwriteMode::NoOverwrite => true,
                OverwriteMode::Converge => {
                    existing.matches_generation_parameters(&request.parameters)?
                }
            };
            if keep {
                self.logger
                    .debug_args(format_args!("Existing version of {name} already satisfies the request"));
                return Ok(existing.clone());
            }
        }
        self.write_generated(name, &request.parameters, existing.as_ref())
    }

    fn write_generated(
        &self,
        name: &str,
        parameters: &GenerationParameters,
        existing: Option<&CredentialVersion>,
    ) -> Result<CredentialVersion> {
        let value = self.generator.generate(parameters)?;
        self.write_value(name, parameters, value, existing)
    }

    fn write_value(
        &self,
        name: &str,
        parameters: &GenerationParameters,
        value: CredentialValue,
        existing: Option<&CredentialVersion>,
    ) -> Result<CredentialVersion> {
        let version = self.factory.new_version(
            parameters.credential_type(),
            name,
            value,
            existing,
            Some(parameters),
        )?;
        self.save(version)
    }

    fn save(&self, version: CredentialVersion) -> Result<CredentialVersion> {
        self.store.save(&version.to_record())?;
        self.logger
            .with_credential_path(version.name())
            .info_args(format_args!(
                "Wrote {} version {}",
                version.credential_type(),
                version.uuid()
            ));
        Ok(version)
    }

    /// Run `attempt`, retrying exactly once when a concurrent writer created
    /// the credential first
    fn with_conflict_retry<T>(&self, name: &str, attempt: impl Fn() -> Result<T>) -> Result<T> {
        match attempt() {
            Err(VaultError::Store(StoreError::UniqueViolation(detail))) => {
                self.logger.warn_args(format_args!(
                    "Concurrent write to {name} ({detail}), retrying once"
                ));
                attempt()
            }
            other => other,
        }
    }
}
