use credvault_common::logging::{LogLevel, LoggingConfig};
use credvault_core::config::CONFIG_FILE_NAME;
use credvault_core::{
    CredentialValue, OperatingMode, OverwriteMode, SetRequest, Vault, VaultConfig, VaultError,
};
use credvault_test_utils::InMemoryCredentialStore;
use std::sync::Arc;

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(!VaultConfig::exists(dir.path()));

    let config = VaultConfig::new("vault-a")
        .with_named_encryption_key("2024-q1", "old-secret", false)
        .with_named_encryption_key("2024-q2", "new-secret", true)
        .with_operating_mode(OperatingMode::ReadOnly)
        .with_rotation_batch_size(50)
        .with_logging_config(LoggingConfig {
            level: LogLevel::Debug,
            timestamps: false,
        });
    config.save(dir.path()).expect("save");
    assert!(VaultConfig::exists(dir.path()));

    let loaded = VaultConfig::load(dir.path()).expect("load");
    assert_eq!(loaded.instance_id, "vault-a");
    assert_eq!(loaded.operating_mode, OperatingMode::ReadOnly);
    assert_eq!(loaded.rotation_batch_size, 50);
    assert_eq!(loaded.encryption_keys.len(), 2);
    assert!(!loaded.logging.timestamps);

    let key_set = loaded.key_set().expect("key set");
    assert_eq!(key_set.active().as_str(), "2024-q2");
    assert_eq!(key_set.inactive().len(), 1);
}

#[test]
fn test_load_missing_or_invalid() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        VaultConfig::load(dir.path()),
        Err(VaultError::ConfigError(_))
    ));

    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").expect("write");
    assert!(matches!(
        VaultConfig::load(dir.path()),
        Err(VaultError::ConfigError(_))
    ));

    // Parses, but no key is active
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"{"instance_id":"v","encryption_keys":[{"secret":"s"}]}"#,
    )
    .expect("write");
    assert!(matches!(
        VaultConfig::load(dir.path()),
        Err(VaultError::ConfigError(_))
    ));
}

#[test]
fn test_vault_from_loaded_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    VaultConfig::new("vault-b")
        .with_encryption_key("only-secret", true)
        .save(dir.path())
        .expect("save");

    let store = Arc::new(InMemoryCredentialStore::new());
    let config = VaultConfig::load(dir.path()).expect("load");
    let vault = Vault::builder(config, store.clone(), store)
        .build()
        .expect("build");
    vault
        .writer()
        .set(&SetRequest {
            name: "/from-file".to_string(),
            value: CredentialValue::Value("v".to_string()),
            mode: OverwriteMode::Converge,
        })
        .expect("set");
    assert_eq!(vault.key_usage_report().expect("report").active, 1);
}

#[test]
fn test_builder_rejects_invalid_config() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let result = Vault::builder(VaultConfig::new("no-keys"), store.clone(), store).build();
    assert!(matches!(result, Err(VaultError::ConfigError(_))));
}
