//! Azure Active Directory credentials.
//!
//! Resolves an [`AuthConfig`] into exactly one authentication strategy and
//! acquires access tokens for Key Vault with it.
//!
//! ## Strategies
//!
//! Evaluated in order, the first match wins:
//!
//! 1. `tenantId`, `clientId`, `clientSecret` → client secret
//! 2. `tenantId`, `clientId`, `clientCertificate` → client certificate
//! 3. `tenant`, `appId`, `password` (`az` service principal) → client secret
//! 4. `clientId` without `tenantId` → user-assigned managed identity

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::config::AuthConfig;
use crate::core::constants;
use crate::error::{ConfigError, Result};

mod certificate;
mod managed;
mod oauth;
mod secret;

pub use certificate::ClientCertificateCredential;
pub use managed::ManagedIdentityCredential;
pub use secret::ClientSecretCredential;

/// A bearer token for one scope.
#[derive(Clone)]
pub struct AccessToken {
    secret: Zeroizing<String>,
    expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            expires_on,
        }
    }

    /// Raw token value for the `Authorization` header
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    /// Whether the token is still usable at `now`, leaving a refresh margin.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(constants::TOKEN_REFRESH_MARGIN_SECS) < self.expires_on
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// An identity that can obtain tokens for Key Vault.
///
/// Implemented by the strategies in this module; tests and embedders can
/// supply their own.
#[async_trait]
pub trait TokenCredential: Send + Sync + std::fmt::Debug {
    /// Get a token valid for `scope`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if the identity provider cannot be reached or
    /// rejects the request.
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

/// Per-credential token cache, keyed by scope.
#[derive(Default)]
pub(crate) struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    pub fn get(&self, scope: &str) -> Option<AccessToken> {
        let tokens = self.tokens.lock();
        tokens
            .get(scope)
            .filter(|t| t.is_fresh(Utc::now()))
            .cloned()
    }

    pub fn insert(&self, scope: &str, token: AccessToken) {
        self.tokens.lock().insert(scope.to_string(), token);
    }
}

/// Which strategy a [`Credential`] was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ClientSecret,
    ClientCertificate,
    /// Client secret from an `az` service principal file
    ServicePrincipal,
    ManagedIdentity,
}

impl CredentialKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientSecret => "client-secret",
            Self::ClientCertificate => "client-certificate",
            Self::ServicePrincipal => "service-principal",
            Self::ManagedIdentity => "managed-identity",
        }
    }
}

/// A resolved credential, one variant per strategy.
#[derive(Debug)]
pub enum Credential {
    ClientSecret(ClientSecretCredential),
    ClientCertificate(ClientCertificateCredential),
    /// Legacy `az` service principal, authenticated with its password
    ServicePrincipal(ClientSecretCredential),
    ManagedIdentity(ManagedIdentityCredential),
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Self::ClientSecret(_) => CredentialKind::ClientSecret,
            Self::ClientCertificate(_) => CredentialKind::ClientCertificate,
            Self::ServicePrincipal(_) => CredentialKind::ServicePrincipal,
            Self::ManagedIdentity(_) => CredentialKind::ManagedIdentity,
        }
    }
}

#[async_trait]
impl TokenCredential for Credential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        match self {
            Self::ClientSecret(c) | Self::ServicePrincipal(c) => c.get_token(scope).await,
            Self::ClientCertificate(c) => c.get_token(scope).await,
            Self::ManagedIdentity(c) => c.get_token(scope).await,
        }
    }
}

type Predicate = fn(&AuthConfig) -> bool;
type Constructor = fn(&AuthConfig) -> Result<Credential>;

/// Strategies in precedence order.
const STRATEGIES: &[(CredentialKind, Predicate, Constructor)] = &[
    (CredentialKind::ClientSecret, has_client_secret, build_client_secret),
    (
        CredentialKind::ClientCertificate,
        has_client_certificate,
        build_client_certificate,
    ),
    (
        CredentialKind::ServicePrincipal,
        has_service_principal,
        build_service_principal,
    ),
    (
        CredentialKind::ManagedIdentity,
        has_managed_identity,
        build_managed_identity,
    ),
];

/// Select and build the credential described by `config`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidCredentialConfig` when no strategy
/// matches, or a `CredentialError` when the matching strategy cannot be
/// built (malformed certificate, wrong password, bad tenant).
pub fn resolve(config: &AuthConfig) -> Result<Credential> {
    let (kind, _, build) = STRATEGIES
        .iter()
        .find(|(_, matches, _)| matches(config))
        .ok_or(ConfigError::InvalidCredentialConfig)?;

    debug!(strategy = kind.name(), "resolving Azure credential");
    build(config)
}

fn has_client_secret(c: &AuthConfig) -> bool {
    c.tenant_id().is_some() && c.client_id().is_some() && c.client_secret().is_some()
}

fn has_client_certificate(c: &AuthConfig) -> bool {
    c.tenant_id().is_some() && c.client_id().is_some() && c.client_certificate().is_some()
}

fn has_service_principal(c: &AuthConfig) -> bool {
    c.tenant().is_some() && c.app_id().is_some() && c.password().is_some()
}

fn has_managed_identity(c: &AuthConfig) -> bool {
    c.client_id().is_some() && c.tenant_id().is_none()
}

fn build_client_secret(c: &AuthConfig) -> Result<Credential> {
    ClientSecretCredential::new(
        c.tenant_id().unwrap_or_default(),
        c.client_id().unwrap_or_default(),
        c.client_secret().unwrap_or_default(),
        c.authority_host(),
    )
    .map(Credential::ClientSecret)
}

fn build_client_certificate(c: &AuthConfig) -> Result<Credential> {
    ClientCertificateCredential::from_pem(
        c.tenant_id().unwrap_or_default(),
        c.client_id().unwrap_or_default(),
        c.client_certificate().unwrap_or_default().as_bytes(),
        c.client_certificate_password(),
        c.client_certificate_send_chain,
        c.authority_host(),
    )
    .map(Credential::ClientCertificate)
}

fn build_service_principal(c: &AuthConfig) -> Result<Credential> {
    ClientSecretCredential::new(
        c.tenant().unwrap_or_default(),
        c.app_id().unwrap_or_default(),
        c.password().unwrap_or_default(),
        c.authority_host(),
    )
    .map(Credential::ServicePrincipal)
}

fn build_managed_identity(c: &AuthConfig) -> Result<Credential> {
    Ok(Credential::ManagedIdentity(ManagedIdentityCredential::new(
        c.client_id().unwrap_or_default(),
    )))
}
