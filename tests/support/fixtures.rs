//! Test fixtures and constants.

use std::sync::Arc;

use async_trait::async_trait;
use azkv::error::{RemoteError, Result};
use azkv::{AccessToken, TokenCredential};
use chrono::{Duration, Utc};

/// Bearer token handed out by the mock identity provider.
pub const TEST_TOKEN: &str = "test-token";

/// A 32-byte data key.
pub const DATA_KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

/// Self-signed certificate and unencrypted PKCS#8 key.
pub const CLIENT_PEM: &str = include_str!("../fixtures/client.pem");

/// Same certificate with the key encrypted under `CLIENT_PEM_PASSWORD`.
pub const CLIENT_ENCRYPTED_PEM: &str = include_str!("../fixtures/client-encrypted.pem");

pub const CLIENT_PEM_PASSWORD: &str = "hunter2";

/// Credential that always returns the same token.
#[derive(Debug)]
pub struct StaticToken(pub &'static str);

#[async_trait]
impl TokenCredential for StaticToken {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        Ok(AccessToken::new(self.0, Utc::now() + Duration::hours(1)))
    }
}

/// Credential that always fails to authenticate.
#[derive(Debug)]
pub struct RejectedToken;

#[async_trait]
impl TokenCredential for RejectedToken {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
        Err(RemoteError::Authentication("AADSTS700016: application not found".to_string()).into())
    }
}

pub fn static_token() -> Arc<dyn TokenCredential> {
    Arc::new(StaticToken(TEST_TOKEN))
}

/// Indent a PEM document for embedding as a YAML block scalar.
pub fn yaml_block(pem: &str) -> String {
    pem.lines()
        .map(|l| format!("  {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}
