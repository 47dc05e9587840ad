//! Vault configuration
//!
//! Loaded from and saved to `config.json` in a configuration directory.

use crate::encryption::{AesGcmEncryptionProvider, LocalEncryptionKey};
use crate::error::{Result, VaultError};
use crate::key_rotation::KeySet;
use crate::types::KeyId;
use credvault_common::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_ROTATION_BATCH_SIZE: usize = 1000;

fn default_rotation_batch_size() -> usize {
    DEFAULT_ROTATION_BATCH_SIZE
}

/// Whether writes are accepted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// One configured encryption key
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptionKeyConfig {
    /// Explicit key id; derived from the key material when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    pub secret: String,

    #[serde(default)]
    pub active: bool,
}

impl fmt::Debug for EncryptionKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyConfig")
            .field("key_id", &self.key_id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Vault configuration stored in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Identifier of this vault instance, used as the log prefix
    pub instance_id: String,

    #[serde(default)]
    pub operating_mode: OperatingMode,

    /// Exactly one key must be active
    pub encryption_keys: Vec<EncryptionKeyConfig>,

    /// Values re-encrypted per key rotation batch
    #[serde(default = "default_rotation_batch_size")]
    pub rotation_batch_size: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VaultConfig {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            operating_mode: OperatingMode::ReadWrite,
            encryption_keys: Vec::new(),
            rotation_batch_size: DEFAULT_ROTATION_BATCH_SIZE,
            logging: LoggingConfig::default(),
        }
    }

    pub fn with_operating_mode(mut self, mode: OperatingMode) -> Self {
        self.operating_mode = mode;
        self
    }

    pub fn with_encryption_key(mut self, secret: impl Into<String>, active: bool) -> Self {
        self.encryption_keys.push(EncryptionKeyConfig {
            key_id: None,
            secret: secret.into(),
            active,
        });
        self
    }

    pub fn with_named_encryption_key(
        mut self,
        key_id: impl Into<String>,
        secret: impl Into<String>,
        active: bool,
    ) -> Self {
        self.encryption_keys.push(EncryptionKeyConfig {
            key_id: Some(key_id.into()),
            secret: secret.into(),
            active,
        });
        self
    }

    pub fn with_rotation_batch_size(mut self, batch_size: usize) -> Self {
        self.rotation_batch_size = batch_size;
        self
    }

    pub fn with_logging_config(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Load and validate configuration from `config_dir`
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join(CONFIG_FILE_NAME);
        if !config_file.exists() {
            return Err(VaultError::ConfigError(format!(
                "Configuration file not found: {config_file:?}"
            )));
        }

        let content = std::fs::read_to_string(&config_file).map_err(|e| {
            VaultError::ConfigError(format!("Failed to read config file {config_file:?}: {e}"))
        })?;
        let config: VaultConfig = from_str(&content).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse config file {config_file:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `config_dir`
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let config_file = config_dir.join(CONFIG_FILE_NAME);
        let content = to_string_pretty(self)?;
        std::fs::write(&config_file, content).map_err(|e| {
            VaultError::ConfigError(format!("Failed to write config file {config_file:?}: {e}"))
        })?;
        Ok(())
    }

    pub fn exists(config_dir: &Path) -> bool {
        config_dir.join(CONFIG_FILE_NAME).exists()
    }

    pub fn validate(&self) -> Result<()> {
        if self.instance_id.is_empty() {
            return Err(VaultError::ConfigError("instance_id must not be empty".to_string()));
        }
        if self.rotation_batch_size == 0 {
            return Err(VaultError::ConfigError(
                "rotation_batch_size must be positive".to_string(),
            ));
        }
        let active = self.encryption_keys.iter().filter(|key| key.active).count();
        if active != 1 {
            return Err(VaultError::ConfigError(format!(
                "exactly one encryption key must be active, found {active}"
            )));
        }
        if self.encryption_keys.iter().any(|key| key.secret.is_empty()) {
            return Err(VaultError::ConfigError(
                "encryption key secrets must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for key in self.encryption_keys.iter().filter_map(|key| key.key_id.as_deref()) {
            if !seen.insert(key) {
                return Err(VaultError::ConfigError(format!(
                    "duplicate encryption key id '{key}'"
                )));
            }
        }
        Ok(())
    }

    /// Derive the configured keys, active one first
    fn local_keys(&self) -> Result<(LocalEncryptionKey, Vec<LocalEncryptionKey>)> {
        self.validate()?;
        let mut active = None;
        let mut inactive = Vec::new();
        for key in &self.encryption_keys {
            let derived = LocalEncryptionKey::derive(&key.secret, key.key_id.clone().map(KeyId::new))
                .map_err(|e| VaultError::ConfigError(format!("Invalid encryption key: {e}")))?;
            if key.active {
                active = Some(derived);
            } else {
                inactive.push(derived);
            }
        }
        let active = active
            .ok_or_else(|| VaultError::ConfigError("no active encryption key".to_string()))?;
        Ok((active, inactive))
    }

    pub fn key_set(&self) -> Result<KeySet> {
        let (active, inactive) = self.local_keys()?;
        Ok(KeySet::new(
            active.id().clone(),
            inactive.iter().map(|key| key.id().clone()),
        ))
    }

    pub fn build_provider(&self) -> Result<AesGcmEncryptionProvider> {
        let (active, inactive) = self.local_keys()?;
        Ok(AesGcmEncryptionProvider::new(active, inactive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_active_key() {
        let none = VaultConfig::new("vault").with_encryption_key("a", false);
        assert!(none.validate().is_err());

        let two = VaultConfig::new("vault")
            .with_encryption_key("a", true)
            .with_encryption_key("b", true);
        assert!(two.validate().is_err());

        let one = VaultConfig::new("vault")
            .with_encryption_key("a", true)
            .with_encryption_key("b", false);
        assert!(one.validate().is_ok());
        assert_eq!(one.key_set().unwrap().inactive().len(), 1);
    }

    #[test]
    fn test_duplicate_key_ids_rejected() {
        let config = VaultConfig::new("vault")
            .with_named_encryption_key("k1", "a", true)
            .with_named_encryption_key("k1", "b", false);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_defaults_when_parsing() {
        let config: VaultConfig = serde_json::from_str(
            r#"{"instance_id":"vault-1","encryption_keys":[{"secret":"s","active":true}]}"#,
        )
        .unwrap();
        assert_eq!(config.operating_mode, OperatingMode::ReadWrite);
        assert_eq!(config.rotation_batch_size, DEFAULT_ROTATION_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = VaultConfig::new("vault").with_encryption_key("super-secret", true);
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
