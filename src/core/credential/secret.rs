//! Client secret credential.

use async_trait::async_trait;
use tracing::trace;
use url::Url;
use zeroize::Zeroizing;

use super::{oauth, AccessToken, TokenCache, TokenCredential};
use crate::error::Result;

/// Authenticates a service principal with a client secret.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    secret: Zeroizing<String>,
    token_endpoint: Url,
    cache: TokenCache,
}

impl ClientSecretCredential {
    /// Create a credential for `client_id` in `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError` if the tenant ID or authority host is
    /// invalid.
    pub fn new(
        tenant_id: &str,
        client_id: &str,
        secret: &str,
        authority_host: &str,
    ) -> Result<Self> {
        let token_endpoint = oauth::token_endpoint(authority_host, tenant_id)?;
        Ok(Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            secret: Zeroizing::new(secret.to_string()),
            token_endpoint,
            cache: TokenCache::default(),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(token) = self.cache.get(scope) {
            trace!(scope, "using cached token");
            return Ok(token);
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.secret.as_str()),
            ("scope", scope),
        ];
        let token = oauth::request_token(&self.token_endpoint, &form).await?;
        self.cache.insert(scope, token.clone());
        Ok(token)
    }
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("token_endpoint", &self.token_endpoint.as_str())
            .finish_non_exhaustive()
    }
}
