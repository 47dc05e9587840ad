use credvault_core::{
    CredentialValue, CredentialVersionStore, GenerateRequest, GenerationParameters,
    KeyUsageReport, OverwriteMode, ProviderError, SetRequest, StringGenerationParameters, Vault,
    VaultConfig, VaultError,
};
use credvault_test_utils::{InMemoryCredentialStore, TEST_INSTANCE_ID};
use std::sync::Arc;

const OLD_SECRET: &str = "rotation-old-secret";
const NEW_SECRET: &str = "rotation-new-secret";
const STRAY_SECRET: &str = "rotation-stray-secret";

fn vault_over(store: &Arc<InMemoryCredentialStore>, config: VaultConfig) -> Vault {
    Vault::builder(config, store.clone(), store.clone())
        .build()
        .expect("vault")
}

fn latest_value_uuid(store: &InMemoryCredentialStore, name: &str) -> uuid::Uuid {
    store
        .find_latest(name)
        .expect("find")
        .expect("present")
        .encrypted_value
        .uuid
}

fn old_key_config() -> VaultConfig {
    VaultConfig::new(TEST_INSTANCE_ID).with_encryption_key(OLD_SECRET, true)
}

fn rotated_config() -> VaultConfig {
    VaultConfig::new(TEST_INSTANCE_ID)
        .with_encryption_key(NEW_SECRET, true)
        .with_encryption_key(OLD_SECRET, false)
        .with_rotation_batch_size(2)
}

fn write_fixture(vault: &Vault) {
    for i in 0..3 {
        vault
            .writer()
            .set(&SetRequest {
                name: format!("/value-{i}"),
                value: CredentialValue::Value(format!("secret-{i}")),
                mode: OverwriteMode::Overwrite,
            })
            .expect("set");
    }
    // Password carries a second encrypted field for its generation parameters
    vault
        .writer()
        .generate(&GenerateRequest {
            name: "/generated".to_string(),
            parameters: GenerationParameters::Password(StringGenerationParameters::default()),
            mode: OverwriteMode::Overwrite,
        })
        .expect("generate");
}

#[test]
fn test_rotation_moves_every_value_to_active_key() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let old = vault_over(&store, old_key_config());
    write_fixture(&old);
    let generated_before = old
        .get("/generated")
        .expect("get")
        .expect("present")
        .value()
        .expect("value");

    let vault = vault_over(&store, rotated_config());
    assert_eq!(
        vault.key_usage_report().expect("report"),
        KeyUsageReport {
            active: 0,
            inactive: 5,
            unknown: 0
        }
    );

    let summary = vault.rotate_keys().expect("rotate");
    assert_eq!(summary.reencrypted, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.batches, 3);

    let active = vault.rotator().key_set().active().clone();
    assert!(store.stored_key_ids().iter().all(|key_id| *key_id == active));
    assert_eq!(vault.key_usage_report().expect("report").active, 5);

    for i in 0..3 {
        let value = vault
            .get(&format!("/value-{i}"))
            .expect("get")
            .expect("present")
            .value()
            .expect("decrypt after rotation");
        assert_eq!(value, CredentialValue::Value(format!("secret-{i}")));
    }
    let generated = vault.get("/generated").expect("get").expect("present");
    assert_eq!(generated.value().expect("value"), generated_before);
    assert!(generated
        .generation_parameters()
        .expect("parameters")
        .is_some());
}

#[test]
fn test_rotation_keeps_value_uuids() {
    let store = Arc::new(InMemoryCredentialStore::new());
    write_fixture(&vault_over(&store, old_key_config()));
    let before = latest_value_uuid(&store, "/value-0");

    let vault = vault_over(&store, rotated_config());
    vault.rotate_keys().expect("rotate");

    assert_eq!(latest_value_uuid(&store, "/value-0"), before);
    assert_eq!(store.version_count("/value-0"), 1);
}

#[test]
fn test_usage_report_partitions_all_values() {
    let store = Arc::new(InMemoryCredentialStore::new());
    write_fixture(&vault_over(&store, old_key_config()));

    let stray = vault_over(
        &store,
        VaultConfig::new(TEST_INSTANCE_ID).with_encryption_key(STRAY_SECRET, true),
    );
    stray
        .writer()
        .set(&SetRequest {
            name: "/stray".to_string(),
            value: CredentialValue::Value("unreadable".to_string()),
            mode: OverwriteMode::Overwrite,
        })
        .expect("set stray");

    let vault = vault_over(&store, rotated_config());
    let report = vault.key_usage_report().expect("report");
    assert_eq!(report.inactive, 5);
    assert_eq!(report.unknown, 1);
    assert_eq!(report.total(), store.stored_key_ids().len() as u64);

    // Unknown-keyed values are never selected for re-encryption
    let summary = vault.rotate_keys().expect("rotate");
    assert_eq!(summary.reencrypted, 5);
    let report = vault.key_usage_report().expect("report");
    assert_eq!(
        report,
        KeyUsageReport {
            active: 5,
            inactive: 0,
            unknown: 1
        }
    );
}

#[test]
fn test_reencrypting_unknown_key_is_refused() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let stray = vault_over(
        &store,
        VaultConfig::new(TEST_INSTANCE_ID).with_encryption_key(STRAY_SECRET, true),
    );
    let version = stray
        .writer()
        .set(&SetRequest {
            name: "/stray".to_string(),
            value: CredentialValue::Value("unreadable".to_string()),
            mode: OverwriteMode::Overwrite,
        })
        .expect("set");

    let vault = vault_over(&store, rotated_config());
    let record = version.to_record();
    let err = vault
        .rotator()
        .reencrypt(&record.encrypted_value)
        .unwrap_err();
    match err {
        VaultError::Encryption(e) => {
            assert!(matches!(e.provider_error(), ProviderError::UnknownKey(_)))
        }
        other => panic!("expected encryption error, got {other:?}"),
    }
}

#[test]
fn test_rotation_with_nothing_to_do() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let vault = vault_over(&store, rotated_config());
    let summary = vault.rotate_keys().expect("rotate");
    assert_eq!(summary.batches, 0);
    assert_eq!(summary.reencrypted, 0);

    assert!(matches!(
        vault.rotator().rotate_all(0),
        Err(VaultError::ConfigError(_))
    ));
}

fn named_key_config(keys: &[(&str, &str, bool)]) -> VaultConfig {
    keys.iter()
        .fold(VaultConfig::new(TEST_INSTANCE_ID), |config, (key_id, secret, active)| {
            config.with_named_encryption_key(*key_id, *secret, *active)
        })
}

fn set_values(vault: &Vault, prefix: &str, count: usize) {
    for i in 0..count {
        vault
            .writer()
            .set(&SetRequest {
                name: format!("/{prefix}-{i}"),
                value: CredentialValue::Value(format!("{prefix}-secret-{i}")),
                mode: OverwriteMode::Overwrite,
            })
            .expect("set");
    }
}

#[test]
fn test_rotation_skips_values_it_cannot_decrypt() {
    let store = Arc::new(InMemoryCredentialStore::new());
    write_fixture(&vault_over(
        &store,
        named_key_config(&[("2024-q1", OLD_SECRET, true)]),
    ));

    // The inactive key id now points at the wrong secret
    let vault = vault_over(
        &store,
        named_key_config(&[("2024-q2", NEW_SECRET, true), ("2024-q1", STRAY_SECRET, false)])
            .with_rotation_batch_size(2),
    );
    let summary = vault.rotate_keys().expect("rotate terminates");
    assert_eq!(summary.reencrypted, 0);
    assert_eq!(summary.failed, 5);
    assert_eq!(summary.batches, 3);

    assert!(store
        .stored_key_ids()
        .iter()
        .all(|key_id| key_id.as_str() == "2024-q1"));
    assert_eq!(vault.key_usage_report().expect("report").inactive, 5);

    // Nothing was rewritten: the original key still reads every value
    let original = vault_over(&store, named_key_config(&[("2024-q1", OLD_SECRET, true)]));
    for i in 0..3 {
        let value = original
            .get(&format!("/value-{i}"))
            .expect("get")
            .expect("present")
            .value()
            .expect("decrypt with original key");
        assert_eq!(value, CredentialValue::Value(format!("secret-{i}")));
    }
}

#[test]
fn test_rotation_continues_past_failing_values() {
    let store = Arc::new(InMemoryCredentialStore::new());
    set_values(
        &vault_over(&store, named_key_config(&[("2024-q0", STRAY_SECRET, true)])),
        "readable",
        2,
    );
    set_values(
        &vault_over(&store, named_key_config(&[("2024-q1", OLD_SECRET, true)])),
        "broken",
        3,
    );

    let vault = vault_over(
        &store,
        named_key_config(&[
            ("2024-q2", NEW_SECRET, true),
            ("2024-q1", "not-the-q1-secret", false),
            ("2024-q0", STRAY_SECRET, false),
        ])
        .with_rotation_batch_size(1),
    );
    let summary = vault.rotate_keys().expect("rotate");
    assert_eq!(summary.reencrypted, 2);
    assert_eq!(summary.failed, 3);
    assert_eq!(
        vault.key_usage_report().expect("report"),
        KeyUsageReport {
            active: 2,
            inactive: 3,
            unknown: 0
        }
    );

    for i in 0..2 {
        let value = vault
            .get(&format!("/readable-{i}"))
            .expect("get")
            .expect("present")
            .value()
            .expect("decrypt after rotation");
        assert_eq!(value, CredentialValue::Value(format!("readable-secret-{i}")));
    }
}

#[test]
fn test_version_rotate_reencrypts_every_field() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let old = vault_over(&store, old_key_config());
    old.writer()
        .generate(&GenerateRequest {
            name: "/user".to_string(),
            parameters: GenerationParameters::User(StringGenerationParameters::default()),
            mode: OverwriteMode::Overwrite,
        })
        .expect("generate");

    let vault = vault_over(&store, rotated_config());
    let mut version = vault.get("/user").expect("get").expect("present");
    let before = version.value().expect("value");
    let parameters_before = version.generation_parameters().expect("parameters");

    version.rotate().expect("rotate");

    let active = vault.rotator().key_set().active().clone();
    let record = version.to_record();
    let values = record.encrypted_values();
    assert_eq!(values.len(), 2);
    assert!(values.iter().all(|value| value.key_id() == Some(&active)));
    assert_eq!(version.value().expect("value"), before);
    assert_eq!(
        version.generation_parameters().expect("parameters"),
        parameters_before
    );
    assert_eq!(version.version_created_at(), record.version_created_at);
}
