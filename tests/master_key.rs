//! Master key encrypt/decrypt tests against a mock Key Vault.

mod support;
use support::*;

use azkv::error::{Error, RemoteError};
use azkv::{KeySource, MasterKey};
use proptest::prelude::*;
use serde_json::Value;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let vault = MockVault::with_key_operations();
    let mut key = vault.key("k1", "v1");

    key.encrypt(DATA_KEY).unwrap();
    assert!(!key.encrypted_data_key().is_empty());
    assert_ne!(key.encrypted_data_key().as_bytes(), DATA_KEY);

    let decrypted = key.decrypt().unwrap();
    assert_eq!(decrypted.as_slice(), DATA_KEY);
}

#[test]
fn test_encrypted_key_is_text_safe() {
    let vault = MockVault::with_key_operations();
    let mut key = vault.key("k1", "v1");

    key.encrypt(&[0u8, 0xff, 0x80, 0x7f]).unwrap();
    assert!(key
        .encrypted_data_key()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

#[test]
fn test_roundtrip_through_persisted_map() {
    let vault = MockVault::with_key_operations();
    let mut key = vault.key("k1", "v1");
    key.encrypt(DATA_KEY).unwrap();

    let restored = MasterKey::from_map(&key.to_map())
        .unwrap()
        .with_credential(static_token());
    assert_eq!(restored.decrypt().unwrap().as_slice(), DATA_KEY);
}

#[test]
fn test_encrypt_request_shape() {
    let vault = MockVault::with_key_operations();
    let mut key = vault.key("sops-key", "0123abcd");
    key.encrypt(DATA_KEY).unwrap();

    let requests = vault.received_matching("/encrypt");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(request.url.path(), "/keys/sops-key/0123abcd/encrypt");
    assert_eq!(
        request.url.query_pairs().find(|(k, _)| k == "api-version").map(|(_, v)| v.into_owned()),
        Some("7.4".to_string())
    );
    assert_eq!(
        request.headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer test-token"
    );
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["alg"], "RSA-OAEP-256");
}

#[test]
fn test_encrypt_if_needed_is_idempotent() {
    let vault = MockVault::with_key_operations();
    let mut key = vault.key("k1", "v1");

    key.encrypt_if_needed(DATA_KEY).unwrap();
    let first = key.encrypted_data_key().to_string();

    key.encrypt_if_needed(b"a different data key").unwrap();
    assert_eq!(key.encrypted_data_key(), first);
    assert_eq!(vault.received_matching("/encrypt").len(), 1);
}

#[test]
fn test_encrypt_replaces_existing_payload() {
    let vault = MockVault::with_key_operations();
    let mut key = vault.key("k1", "v1");

    key.encrypt(b"first").unwrap();
    let first = key.encrypted_data_key().to_string();
    key.encrypt(b"second").unwrap();

    assert_ne!(key.encrypted_data_key(), first);
    assert_eq!(key.decrypt().unwrap().as_slice(), b"second");
}

#[test]
fn test_no_credential_makes_no_request() {
    let vault = MockVault::with_key_operations();
    let mut key = MasterKey::new(vault.uri(), "k1", "v1");

    assert!(matches!(key.encrypt(DATA_KEY), Err(Error::NoCredential(_))));
    assert!(matches!(key.decrypt(), Err(Error::NoCredential(_))));
    assert!(vault.received().is_empty());
}

#[test]
fn test_service_error() {
    let vault = MockVault::start();
    vault.mount(
        Mock::given(method("POST"))
            .and(path("/keys/k1/v1/encrypt"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {
                    "code": "Forbidden",
                    "message": "The user does not have keys encrypt permission"
                }
            }))),
    );
    let mut key = vault.key("k1", "v1");

    let err = key.encrypt(DATA_KEY).unwrap_err();
    match err {
        Error::Remote(RemoteError::Service {
            operation,
            status,
            code,
            ..
        }) => {
            assert_eq!(operation, "encrypt");
            assert_eq!(status, 403);
            assert_eq!(code, "Forbidden");
        }
        other => panic!("expected service error, got {:?}", other),
    }
    assert!(key.encrypted_data_key().is_empty());
}

#[test]
fn test_decrypt_foreign_ciphertext() {
    let vault = MockVault::with_key_operations();
    let key = MasterKey::restore(
        vault.uri(),
        "k1",
        "v1",
        "bm90LW91cnM",
        chrono::Utc::now(),
    )
    .with_credential(static_token());

    let err = key.decrypt().unwrap_err();
    assert!(err.to_string().starts_with("failed to decrypt data"));
    assert!(matches!(
        err,
        Error::Remote(RemoteError::Service { status: 400, .. })
    ));
}

#[test]
fn test_malformed_response() {
    let vault = MockVault::start();
    vault.mount(
        Mock::given(method("POST"))
            .and(path("/keys/k1/v1/encrypt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>")),
    );
    let mut key = vault.key("k1", "v1");

    assert!(matches!(
        key.encrypt(DATA_KEY),
        Err(Error::Remote(RemoteError::InvalidResponse { .. }))
    ));
}

#[test]
fn test_authentication_failure() {
    let vault = MockVault::with_key_operations();
    let mut key = MasterKey::new(vault.uri(), "k1", "v1").with_credential(Arc::new(RejectedToken));

    let err = key.encrypt(DATA_KEY).unwrap_err();
    assert!(matches!(err, Error::Remote(RemoteError::Authentication(_))));
    assert!(vault.received().is_empty());
}

#[test]
fn test_wrong_token_rejected() {
    let vault = MockVault::start();
    vault.mount_key_operations("someone-else");
    let mut key = vault.key("k1", "v1");

    assert!(matches!(
        key.encrypt(DATA_KEY),
        Err(Error::Remote(RemoteError::Service { status: 404, .. }))
    ));
}

#[test]
fn test_transport_failure() {
    // Nothing listens on port 1.
    let mut key = MasterKey::new("http://127.0.0.1:1", "k1", "v1").with_credential(static_token());

    assert!(matches!(
        key.encrypt(DATA_KEY),
        Err(Error::Remote(RemoteError::Transport { .. }))
    ));
}

#[test]
fn test_unusable_vault_url() {
    let mut key = MasterKey::new("", "k1", "v1").with_credential(static_token());

    assert!(matches!(
        key.encrypt(DATA_KEY),
        Err(Error::Remote(RemoteError::Client { .. }))
    ));
}

#[test]
fn test_independent_keys() {
    let vault = MockVault::with_key_operations();
    let mut a = vault.key("a", "1");
    let mut b = vault.key("b", "2");

    a.encrypt(b"key-a").unwrap();
    b.encrypt(b"key-b").unwrap();

    assert_eq!(a.decrypt().unwrap().as_slice(), b"key-a");
    assert_eq!(b.decrypt().unwrap().as_slice(), b"key-b");
}

#[test]
fn test_keys_on_separate_threads() {
    let vault = MockVault::with_key_operations();
    let keys: Vec<MasterKey> = (0..4).map(|i| vault.key(&format!("k{}", i), "v1")).collect();

    let handles: Vec<_> = keys
        .into_iter()
        .enumerate()
        .map(|(i, mut key)| {
            std::thread::spawn(move || {
                let data_key = format!("data-key-{}", i).into_bytes();
                key.encrypt(&data_key).unwrap();
                assert_eq!(key.decrypt().unwrap().as_slice(), data_key.as_slice());
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_decrypt_recovers_data_key(data_key in proptest::collection::vec(any::<u8>(), 1..128)) {
        let vault = MockVault::with_key_operations();
        let mut key = vault.key("k1", "v1");

        key.encrypt(&data_key).unwrap();
        let decrypted = key.decrypt().unwrap();
        prop_assert_eq!(decrypted.as_slice(), data_key.as_slice());
    }
}
