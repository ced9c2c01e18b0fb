//! Azure authentication file.
//!
//! Handles loading the credential configuration that selects how azkv
//! authenticates against Key Vault. Files may be YAML or JSON, including
//! the service principal files written by `az ad sp create-for-rbac`.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::core::{constants, encoding};
use crate::error::{ConfigError, Result};

/// Fields of an Azure authentication file used for Active Directory
/// authentication.
///
/// Every field is optional. Empty strings count as absent.
#[derive(Default, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// PEM-encoded certificate chain and private key
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_certificate_password: Option<String>,
    /// Send the full certificate chain with each token request (`x5c`)
    #[serde(default)]
    pub client_certificate_send_chain: bool,
    #[serde(default)]
    pub authority_host: Option<String>,

    /// Service principal fields as generated by `az`
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthConfig {
    /// Parse authentication file bytes.
    ///
    /// The bytes are transcoded to UTF-8 first (see [`encoding::decode`]),
    /// then parsed as YAML, which also accepts JSON.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Decode` if the bytes cannot be transcoded, or
    /// `ConfigError::Parse` if the text is not a valid mapping.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = encoding::decode(bytes)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        // A null document (`~`, `null`) is an empty config.
        let config = serde_yaml::from_str::<Option<Self>>(&text)
            .map_err(ConfigError::Parse)?
            .unwrap_or_default();
        debug!(fields = ?config.present_fields(), "authentication file parsed");
        Ok(config)
    }

    /// Load and parse an authentication file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading authentication file");
        let bytes = std::fs::read(path).map_err(ConfigError::ReadFile)?;
        Self::from_bytes(&bytes)
    }

    /// Authority host to authenticate against.
    ///
    /// The configured `authorityHost`, or the Azure public cloud default.
    pub fn authority_host(&self) -> &str {
        authority_host_or_default(self.authority_host.as_deref())
    }

    pub(crate) fn tenant_id(&self) -> Option<&str> {
        present(&self.tenant_id)
    }

    pub(crate) fn client_id(&self) -> Option<&str> {
        present(&self.client_id)
    }

    pub(crate) fn client_secret(&self) -> Option<&str> {
        present(&self.client_secret)
    }

    pub(crate) fn client_certificate(&self) -> Option<&str> {
        present(&self.client_certificate)
    }

    pub(crate) fn client_certificate_password(&self) -> Option<&str> {
        present(&self.client_certificate_password)
    }

    pub(crate) fn app_id(&self) -> Option<&str> {
        present(&self.app_id)
    }

    pub(crate) fn tenant(&self) -> Option<&str> {
        present(&self.tenant)
    }

    pub(crate) fn password(&self) -> Option<&str> {
        present(&self.password)
    }

    /// Names of the fields that carry a value, for logging.
    fn present_fields(&self) -> Vec<&'static str> {
        [
            ("tenantId", self.tenant_id().is_some()),
            ("clientId", self.client_id().is_some()),
            ("clientSecret", self.client_secret().is_some()),
            ("clientCertificate", self.client_certificate().is_some()),
            ("authorityHost", present(&self.authority_host).is_some()),
            ("appId", self.app_id().is_some()),
            ("tenant", self.tenant().is_some()),
            ("password", self.password().is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

// Secrets never reach logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("fields", &self.present_fields())
            .field("authority_host", &self.authority_host())
            .finish()
    }
}

/// Resolve an authority host, falling back to the Azure public cloud.
pub fn authority_host_or_default(configured: Option<&str>) -> &str {
    match configured {
        Some(host) if !host.is_empty() => host,
        _ => constants::AZURE_PUBLIC_CLOUD,
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}
