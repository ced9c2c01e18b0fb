//! Key Vault key operations client.
//!
//! A `CryptoClient` is bound to one fully-qualified key reference and is
//! built fresh for every operation; it holds no state worth reusing.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;
use zeroize::Zeroizing;

use crate::core::constants;
use crate::core::credential::TokenCredential;
use crate::core::http;
use crate::error::{RemoteError, Result};

/// base64url as Key Vault speaks it: unpadded out, padding tolerated in.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Key wrapping algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,
}

impl EncryptionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsaOaep256 => constants::KEY_ALGORITHM,
        }
    }
}

#[derive(Serialize)]
struct KeyOperationRequest<'a> {
    alg: EncryptionAlgorithm,
    value: &'a str,
}

#[derive(Deserialize)]
struct KeyOperationResponse {
    #[serde(default)]
    kid: Option<String>,
    value: String,
}

/// Client for the `encrypt` and `decrypt` operations of one key.
pub struct CryptoClient<'a> {
    key_id: Url,
    credential: &'a dyn TokenCredential,
    http: reqwest::Client,
    operation: &'static str,
}

impl<'a> CryptoClient<'a> {
    /// Create a client for `key_id` (`{vault}/keys/{name}/{version}`).
    ///
    /// `operation` names the caller's intent for error messages.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Client` if the key identifier is not an
    /// absolute HTTP(S) URL.
    pub fn new(
        key_id: &str,
        credential: &'a dyn TokenCredential,
        operation: &'static str,
    ) -> Result<Self> {
        let invalid = |reason: String| RemoteError::Client { operation, reason };

        let url = Url::parse(key_id)
            .map_err(|e| invalid(format!("invalid key identifier '{}': {}", key_id, e)))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid(format!(
                "invalid key identifier '{}': unsupported scheme",
                key_id
            ))
            .into());
        }

        Ok(Self {
            key_id: url,
            credential,
            http: http::client(operation)?,
            operation,
        })
    }

    /// The key this client is bound to.
    pub fn key_id(&self) -> &str {
        self.key_id.as_str()
    }

    /// Token scope for the vault hosting this key.
    ///
    /// `myvault.vault.azure.net` → `https://vault.azure.net/.default`.
    pub fn scope(&self) -> String {
        scope_for(&self.key_id)
    }

    /// Encrypt `plaintext`, returning the base64url ciphertext.
    pub async fn encrypt(&self, algorithm: EncryptionAlgorithm, plaintext: &[u8]) -> Result<String> {
        let value = Zeroizing::new(BASE64URL.encode(plaintext));
        self.key_operation("encrypt", algorithm, &value).await
    }

    /// Decrypt base64url `ciphertext`, returning the plaintext bytes.
    pub async fn decrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        ciphertext: &str,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let value = Zeroizing::new(self.key_operation("decrypt", algorithm, ciphertext).await?);
        BASE64URL
            .decode(value.as_bytes())
            .map(Zeroizing::new)
            .map_err(|e| {
                RemoteError::InvalidResponse {
                    operation: self.operation,
                    reason: format!("result is not base64url: {}", e),
                }
                .into()
            })
    }

    async fn key_operation(
        &self,
        path: &str,
        algorithm: EncryptionAlgorithm,
        value: &str,
    ) -> Result<String> {
        let token = self.credential.get_token(&self.scope()).await?;

        let mut url = self.key_id.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Client {
                operation: self.operation,
                reason: format!("key identifier '{}' cannot have a path", self.key_id),
            })?
            .pop_if_empty()
            .push(path);
        url.query_pairs_mut()
            .append_pair("api-version", constants::KEY_VAULT_API_VERSION);

        debug!(key = %self.key_id, operation = path, alg = algorithm.as_str(), "calling Key Vault");

        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&KeyOperationRequest {
                alg: algorithm,
                value,
            })
            .send()
            .await
            .map_err(|e| RemoteError::Transport {
                operation: self.operation,
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RemoteError::Transport {
            operation: self.operation,
            reason: format!("failed to read response: {}", e),
        })?;

        if !status.is_success() {
            let detail = http::error_detail(&body);
            return Err(RemoteError::Service {
                operation: self.operation,
                status: status.as_u16(),
                code: detail.code,
                message: detail.message,
            }
            .into());
        }

        let result: KeyOperationResponse =
            serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse {
                operation: self.operation,
                reason: e.to_string(),
            })?;

        trace!(kid = ?result.kid, len = result.value.len(), "Key Vault operation complete");
        Ok(result.value)
    }
}

/// Token scope derived from the vault host.
///
/// Hosts with fewer than three labels (local test servers, bare IPs)
/// fall back to the public cloud scope.
pub fn scope_for(key_id: &Url) -> String {
    let default = || format!("{}/.default", constants::KEY_VAULT_RESOURCE);

    let Some(url::Host::Domain(host)) = key_id.host() else {
        return default();
    };
    match host.split_once('.') {
        Some((_, suffix)) if suffix.contains('.') => format!("https://{}/.default", suffix),
        _ => default(),
    }
}
