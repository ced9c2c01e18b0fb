//! Managed identity credential.
//!
//! Uses the App Service identity endpoint when `IDENTITY_ENDPOINT` and
//! `IDENTITY_HEADER` are set, and the Instance Metadata Service otherwise.

use async_trait::async_trait;
use tracing::{debug, trace};
use url::Url;
use zeroize::Zeroizing;

use super::oauth::TokenResponse;
use super::{AccessToken, TokenCache, TokenCredential};
use crate::core::constants;
use crate::core::http;
use crate::error::{RemoteError, Result};

/// Where managed identity tokens come from.
#[derive(Clone)]
enum Source {
    Imds {
        endpoint: String,
    },
    AppService {
        endpoint: String,
        header: Zeroizing<String>,
    },
}

/// Authenticates as a user-assigned managed identity.
pub struct ManagedIdentityCredential {
    client_id: String,
    source: Source,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    /// Create a credential for the identity with `client_id`, detecting
    /// the token source from the environment.
    pub fn new(client_id: &str) -> Self {
        let endpoint = std::env::var(constants::IDENTITY_ENDPOINT_VAR).ok();
        let header = std::env::var(constants::IDENTITY_HEADER_VAR).ok();

        let source = match (endpoint, header) {
            (Some(endpoint), Some(header)) if !endpoint.is_empty() && !header.is_empty() => {
                Source::AppService {
                    endpoint,
                    header: Zeroizing::new(header),
                }
            }
            _ => Source::Imds {
                endpoint: constants::IMDS_ENDPOINT.to_string(),
            },
        };

        Self {
            client_id: client_id.to_string(),
            source,
            cache: TokenCache::default(),
        }
    }

    /// Use an explicit IMDS-compatible endpoint.
    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.source = Source::Imds {
            endpoint: endpoint.into(),
        };
        self
    }

    /// Use an explicit App Service identity endpoint and header secret.
    pub fn with_app_service(
        mut self,
        endpoint: impl Into<String>,
        header: impl Into<String>,
    ) -> Self {
        self.source = Source::AppService {
            endpoint: endpoint.into(),
            header: Zeroizing::new(header.into()),
        };
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Token source name, for logging
    pub fn source(&self) -> &'static str {
        match self.source {
            Source::Imds { .. } => "imds",
            Source::AppService { .. } => "app-service",
        }
    }

    fn request_url(&self, resource: &str) -> Result<Url> {
        let (endpoint, api_version) = match &self.source {
            Source::Imds { endpoint } => (endpoint, constants::IMDS_API_VERSION),
            Source::AppService { endpoint, .. } => (endpoint, constants::APP_SERVICE_API_VERSION),
        };
        Url::parse_with_params(
            endpoint,
            &[
                ("api-version", api_version),
                ("resource", resource),
                ("client_id", self.client_id.as_str()),
            ],
        )
        .map_err(|e| {
            RemoteError::Authentication(format!(
                "invalid managed identity endpoint '{}': {}",
                endpoint, e
            ))
            .into()
        })
    }
}

/// Managed identity endpoints take a resource, not a `.default` scope.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(token) = self.cache.get(scope) {
            trace!(scope, "using cached token");
            return Ok(token);
        }

        let url = self.request_url(scope_to_resource(scope))?;
        debug!(source = self.source(), "requesting managed identity token");

        let client = http::client("authenticate")?;
        let request = match &self.source {
            Source::Imds { .. } => client.get(url).header("Metadata", "true"),
            Source::AppService { header, .. } => {
                client.get(url).header("X-IDENTITY-HEADER", header.as_str())
            }
        };

        let response = request.send().await.map_err(|e| {
            RemoteError::Authentication(format!("managed identity request failed: {}", e))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RemoteError::Authentication(format!("failed to read managed identity response: {}", e))
        })?;

        if !status.is_success() {
            let detail = http::error_detail(&body);
            return Err(RemoteError::Authentication(format!(
                "managed identity endpoint returned {}: {}: {}",
                status.as_u16(),
                detail.code,
                detail.message
            ))
            .into());
        }

        let response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            RemoteError::Authentication(format!("malformed managed identity response: {}", e))
        })?;
        let token = response.into_access_token();
        self.cache.insert(scope, token.clone());
        Ok(token)
    }
}

impl std::fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedIdentityCredential")
            .field("client_id", &self.client_id)
            .field("source", &self.source())
            .finish_non_exhaustive()
    }
}
