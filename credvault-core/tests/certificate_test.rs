use credvault_core::{
    CertificateCredentialValue, CertificateGenerationParameters, CertificateGenerationRequest,
    CertificateReader, CredentialValue, CredentialVersion, GenerateRequest, GenerationParameters,
    OverwriteMode, ResolutionError, SetRequest, Vault, ValidationError, VaultError,
};
use credvault_test_utils::{
    create_test_ca_without_key_id, create_test_config, create_test_vault, leaf_parameters,
    root_ca_parameters, CountingKeyPairGenerator, InMemoryCredentialStore,
};
use std::sync::Arc;

fn generate(
    vault: &Vault,
    name: &str,
    parameters: CertificateGenerationParameters,
    mode: OverwriteMode,
) -> Result<CredentialVersion, VaultError> {
    vault.writer().generate(&GenerateRequest {
        name: name.to_string(),
        parameters: GenerationParameters::Certificate(parameters),
        mode,
    })
}

fn reader_of(version: &CredentialVersion) -> CertificateReader {
    let pem = version
        .as_certificate()
        .and_then(|certificate| certificate.certificate())
        .expect("certificate pem");
    CertificateReader::from_pem(pem).expect("parse")
}

fn certificate_value(version: &CredentialVersion) -> CertificateCredentialValue {
    match version.value().expect("value") {
        CredentialValue::Certificate(value) => value,
        other => panic!("expected certificate value, got {other:?}"),
    }
}

#[test]
fn test_root_ca_is_self_signed() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    let root = generate(
        &vault,
        "/root-ca",
        root_ca_parameters("Credvault Root").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("root");

    let value = certificate_value(&root);
    assert_eq!(value.ca, value.certificate);
    assert!(value.private_key.is_some());
    assert_eq!(value.ca_name, None);

    let reader = reader_of(&root);
    assert!(reader.is_ca());
    assert!(reader.is_self_signed());
    assert!(reader.has_subject_key_id());
    assert!(!reader.has_authority_key_id());
    assert_eq!(reader.key_length(), 2048);
    assert_eq!(reader.duration_days(), 365);
}

#[test]
fn test_leaf_signed_by_named_ca() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    let root = generate(
        &vault,
        "/root-ca",
        root_ca_parameters("Credvault Root").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("root");

    // CA name without leading slash is normalized
    let leaf = generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "root-ca").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("leaf");

    let value = certificate_value(&leaf);
    assert_eq!(value.ca_name.as_deref(), Some("/root-ca"));
    assert_eq!(value.ca, certificate_value(&root).certificate);

    let reader = reader_of(&leaf);
    assert!(!reader.is_ca());
    assert!(!reader.is_self_signed());
    assert_eq!(reader.issuer_dn(), reader_of(&root).subject_dn());
    assert!(reader.has_authority_key_id());
    assert_eq!(reader.alternative_names().len(), 2);
}

#[test]
fn test_converge_keeps_equivalent_certificate() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    generate(
        &vault,
        "/root-ca",
        root_ca_parameters("Credvault Root").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("root");
    let first = generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "/root-ca").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("leaf");

    let read_back = vault.get("/leaf").expect("get").expect("present");
    let parameters = GenerationParameters::Certificate(
        leaf_parameters("leaf.example.com", "/root-ca").expect("params"),
    );
    assert!(read_back
        .matches_generation_parameters(&parameters)
        .expect("match"));

    let again = generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "/root-ca").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("converge");
    assert_eq!(again.uuid(), first.uuid());

    let changed = generate(
        &vault,
        "/leaf",
        leaf_parameters("other.example.com", "/root-ca").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("changed");
    assert_ne!(changed.uuid(), first.uuid());
    assert_eq!(vault.writer().find_all("/leaf").expect("history").len(), 2);
}

#[test]
fn test_regenerate_reuses_certificate_parameters() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    let root = generate(
        &vault,
        "/root-ca",
        root_ca_parameters("Credvault Root").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("root");

    let regenerated = vault.writer().regenerate("/root-ca").expect("regenerate");
    assert_ne!(regenerated.uuid(), root.uuid());
    assert_eq!(
        regenerated.credential_name().uuid,
        root.credential_name().uuid
    );
    assert_ne!(
        certificate_value(&regenerated).certificate,
        certificate_value(&root).certificate
    );
    assert_eq!(
        reader_of(&regenerated).subject_dn(),
        reader_of(&root).subject_dn()
    );
}

#[test]
fn test_missing_ca_reported_before_key_generation() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let key_pairs = Arc::new(CountingKeyPairGenerator::default());
    let vault = Vault::builder(create_test_config(), store.clone(), store)
        .with_key_pair_generator(key_pairs.clone())
        .build()
        .expect("vault");

    let err = generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "/missing").expect("params"),
        OverwriteMode::Converge,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Resolution(ResolutionError::CaNotFound(ref name)) if name == "/missing"
    ));

    let err = generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "default").expect("params"),
        OverwriteMode::Converge,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Resolution(ResolutionError::DefaultCaNotFound)
    ));

    assert_eq!(key_pairs.calls(), 0);
}

#[test]
fn test_no_authority_key_id_when_issuer_lacks_key_id() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    let (certificate, private_key) =
        create_test_ca_without_key_id("Legacy Root").expect("legacy ca");
    vault
        .writer()
        .set(&SetRequest {
            name: "/legacy-ca".to_string(),
            value: CredentialValue::Certificate(CertificateCredentialValue {
                ca: Some(certificate.clone()),
                certificate: Some(certificate),
                private_key: Some(private_key),
                ..Default::default()
            }),
            mode: OverwriteMode::Overwrite,
        })
        .expect("import legacy ca");

    let leaf = generate(
        &vault,
        "/legacy-leaf",
        leaf_parameters("legacy.example.com", "/legacy-ca").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("leaf");

    let reader = reader_of(&leaf);
    assert!(reader.has_subject_key_id());
    assert!(!reader.has_authority_key_id());
}

#[test]
fn test_ca_without_private_key_cannot_sign() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    let (certificate, _private_key) =
        create_test_ca_without_key_id("Public Only").expect("ca");
    vault
        .writer()
        .set(&SetRequest {
            name: "/public-only".to_string(),
            value: CredentialValue::Certificate(CertificateCredentialValue {
                certificate: Some(certificate),
                ..Default::default()
            }),
            mode: OverwriteMode::Overwrite,
        })
        .expect("import");

    let err = generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "/public-only").expect("params"),
        OverwriteMode::Converge,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Resolution(ResolutionError::CaMissingPrivateKey(_))
    ));
}

#[test]
fn test_leaf_cannot_act_as_ca() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    generate(
        &vault,
        "/root-ca",
        root_ca_parameters("Credvault Root").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("root");
    generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "/root-ca").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("leaf");

    let err = generate(
        &vault,
        "/grandchild",
        leaf_parameters("grandchild.example.com", "/leaf").expect("params"),
        OverwriteMode::Converge,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        VaultError::Resolution(ResolutionError::CertNotCa(_))
    ));
}

#[test]
fn test_transitional_ca_version_is_skipped() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    let root = generate(
        &vault,
        "/root-ca",
        root_ca_parameters("Credvault Root").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("root");

    let (certificate, private_key) =
        create_test_ca_without_key_id("Next Root").expect("next ca");
    vault
        .writer()
        .set(&SetRequest {
            name: "/root-ca".to_string(),
            value: CredentialValue::Certificate(CertificateCredentialValue {
                ca: Some(certificate.clone()),
                certificate: Some(certificate),
                private_key: Some(private_key),
                transitional: true,
                ..Default::default()
            }),
            mode: OverwriteMode::Overwrite,
        })
        .expect("transitional version");

    let leaf = generate(
        &vault,
        "/leaf",
        leaf_parameters("leaf.example.com", "/root-ca").expect("params"),
        OverwriteMode::Converge,
    )
    .expect("leaf");
    assert_eq!(reader_of(&leaf).issuer_dn(), reader_of(&root).subject_dn());
}

#[test]
fn test_request_validation_order_and_codes() {
    let request = CertificateGenerationRequest {
        common_name: Some("example.com".to_string()),
        ca: Some("/root-ca".to_string()),
        self_sign: true,
        key_length: Some(1024),
        ..Default::default()
    };
    let err = CertificateGenerationParameters::from_request(&request).unwrap_err();
    assert_eq!(err, ValidationError::CaAndSelfSign);
    assert_eq!(err.code(), "ca_and_self_sign");

    let request = CertificateGenerationRequest {
        self_sign: false,
        ..request
    };
    let err = CertificateGenerationParameters::from_request(&request).unwrap_err();
    assert_eq!(err, ValidationError::InvalidKeyLength(1024));

    for key_length in [2048, 3072, 4096] {
        let request = CertificateGenerationRequest {
            key_length: Some(key_length),
            ..request.clone()
        };
        let parameters =
            CertificateGenerationParameters::from_request(&request).expect("valid length");
        assert_eq!(parameters.key_length(), key_length);
    }
}

#[test]
fn test_ca_name_with_and_without_slash_are_equal() {
    assert_eq!(
        leaf_parameters("leaf.example.com", "ca-name").expect("params"),
        leaf_parameters("leaf.example.com", "/ca-name").expect("params")
    );
}

#[test]
fn test_issued_subject_matches_request() {
    let (vault, _store) = create_test_vault(create_test_config()).expect("vault");
    let request = CertificateGenerationRequest {
        common_name: Some("Credvault, Inc Root".to_string()),
        organization: Some("Credvault".to_string()),
        country: Some("US".to_string()),
        self_sign: true,
        key_length: Some(3072),
        duration: Some(30),
        ..Default::default()
    };
    let parameters = CertificateGenerationParameters::from_request(&request).expect("params");
    let expected_dn = parameters.subject().to_dn_string();

    let version = generate(&vault, "/self-signed", parameters, OverwriteMode::Converge)
        .expect("generate");
    let reader = reader_of(&version);
    assert_eq!(reader.subject().to_dn_string(), expected_dn);
    assert!(expected_dn.contains("CN=Credvault\\, Inc Root"));
    assert_eq!(reader.key_length(), 3072);
    assert_eq!(reader.duration_days(), 30);
    assert!(reader.is_self_signed());
    assert!(!reader.is_ca());
}
