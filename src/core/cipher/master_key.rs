//! Azure Key Vault master key.
//!
//! A `MasterKey` names one version of a Key Vault key and carries the
//! data key it encrypted. The persisted form is a flat mapping with the
//! fields `vaultUrl`, `key`, `version`, `created_at` and `enc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use super::client::{CryptoClient, EncryptionAlgorithm};
use super::KeySource;
use crate::core::config::AuthConfig;
use crate::core::constants;
use crate::core::credential::{self, TokenCredential};
use crate::core::http;
use crate::error::{Error, Result};

/// An Azure Key Vault key used to encrypt and decrypt a data key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Persisted", into = "Persisted")]
pub struct MasterKey {
    vault_url: String,
    name: String,
    version: String,
    /// base64url ciphertext from Key Vault; empty until encrypted
    encrypted_key: String,
    creation_date: DateTime<Utc>,
    credential: Option<Arc<dyn TokenCredential>>,
}

impl MasterKey {
    /// Create a key reference with no encrypted data key, created now.
    pub fn new(
        vault_url: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            vault_url: vault_url.into(),
            name: name.into(),
            version: version.into(),
            encrypted_key: String::new(),
            creation_date: Utc::now(),
            credential: None,
        }
    }

    /// Rebuild a key from persisted state.
    pub fn restore(
        vault_url: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        encrypted_key: impl Into<String>,
        creation_date: DateTime<Utc>,
    ) -> Self {
        Self {
            encrypted_key: encrypted_key.into(),
            creation_date,
            ..Self::new(vault_url, name, version)
        }
    }

    /// Parse a fully-qualified key URL, `https://{vault}/keys/{name}/{version}`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKeyReference` if the URL is not HTTPS or does
    /// not have exactly the `keys/{name}/{version}` path.
    pub fn from_url(key_url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidKeyReference(format!("{}: {}", key_url, reason));

        let url = Url::parse(key_url.trim()).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "https" {
            return Err(invalid("vault URL must use https"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("unexpected query or fragment"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing vault host"))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.collect())
            .unwrap_or_default();
        match segments.as_slice() {
            ["keys", name, version] if !name.is_empty() && !version.is_empty() => {
                let vault_url = match url.port() {
                    Some(port) => format!("https://{}:{}", host, port),
                    None => format!("https://{}", host),
                };
                Ok(Self::new(vault_url, *name, *version))
            }
            _ => Err(invalid("expected path /keys/{name}/{version}")),
        }
    }

    /// Parse a comma-separated list of key URLs.
    pub fn from_urls(key_urls: &str) -> Result<Vec<Self>> {
        key_urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(Self::from_url)
            .collect()
    }

    /// Rebuild a key from its [`to_map`](KeySource::to_map) form.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let field = |name: &str| {
            map.get(name)
                .cloned()
                .ok_or_else(|| Error::InvalidRecord(format!("missing field '{}'", name)))
        };
        Persisted {
            vault_url: field("vaultUrl")?,
            key: field("key")?,
            version: field("version")?,
            created_at: field("created_at")?,
            enc: map.get("enc").cloned().unwrap_or_default(),
        }
        .try_into()
    }

    /// Resolve a credential from `config` and attach it.
    ///
    /// # Errors
    ///
    /// Propagates the resolution error; the key is left unchanged.
    pub fn set_token(&mut self, config: &AuthConfig) -> Result<()> {
        let credential = credential::resolve(config)?;
        if self.credential.is_some() {
            debug!(key = %self, "replacing credential");
        }
        debug!(key = %self, strategy = credential.kind().name(), "credential attached");
        self.credential = Some(Arc::new(credential));
        Ok(())
    }

    /// Attach an existing credential.
    pub fn with_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        if self.credential.is_some() {
            debug!(key = %self, "replacing credential");
        }
        self.credential = Some(credential);
        self
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    /// Whether the key is older than the rotation period at `now`.
    pub fn needs_rotation_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.creation_date) > constants::rotation_period()
    }

    fn credential(&self) -> Result<&dyn TokenCredential> {
        self.credential
            .as_deref()
            .ok_or_else(|| Error::NoCredential(self.to_string()))
    }
}

impl KeySource for MasterKey {
    fn encrypt(&mut self, data_key: &[u8]) -> Result<()> {
        let credential = self.credential()?;
        let key_id = self.to_string();
        debug!(key = %key_id, "encrypting data key with Azure Key Vault");

        let encrypted = http::block_on("encrypt", async {
            let client = CryptoClient::new(&key_id, credential, "encrypt")?;
            client.encrypt(EncryptionAlgorithm::RsaOaep256, data_key).await
        })?;

        debug!(key = %key_id, "data key encrypted");
        self.encrypted_key = encrypted;
        Ok(())
    }

    fn encrypt_if_needed(&mut self, data_key: &[u8]) -> Result<()> {
        if self.encrypted_key.is_empty() {
            return self.encrypt(data_key);
        }
        Ok(())
    }

    fn decrypt(&self) -> Result<Zeroizing<Vec<u8>>> {
        let credential = self.credential()?;
        let key_id = self.to_string();
        debug!(key = %key_id, "decrypting data key with Azure Key Vault");

        let data_key = http::block_on("decrypt", async {
            let client = CryptoClient::new(&key_id, credential, "decrypt")?;
            client
                .decrypt(EncryptionAlgorithm::RsaOaep256, &self.encrypted_key)
                .await
        })?;

        debug!(key = %key_id, "data key decrypted");
        Ok(data_key)
    }

    fn needs_rotation(&self) -> bool {
        self.needs_rotation_at(Utc::now())
    }

    fn encrypted_data_key(&self) -> &str {
        &self.encrypted_key
    }

    fn set_encrypted_data_key(&mut self, encrypted: String) {
        self.encrypted_key = encrypted;
    }

    fn to_map(&self) -> BTreeMap<String, String> {
        let persisted = Persisted::from(self.clone());
        BTreeMap::from([
            ("vaultUrl".to_string(), persisted.vault_url),
            ("key".to_string(), persisted.key),
            ("version".to_string(), persisted.version),
            ("created_at".to_string(), persisted.created_at),
            ("enc".to_string(), persisted.enc),
        ])
    }

    fn key_type(&self) -> &'static str {
        constants::KEY_TYPE_IDENTIFIER
    }
}

impl fmt::Display for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/keys/{}/{}", self.vault_url, self.name, self.version)
    }
}

/// On-disk field layout.
#[derive(Debug, Serialize, Deserialize)]
struct Persisted {
    #[serde(rename = "vaultUrl")]
    vault_url: String,
    key: String,
    version: String,
    created_at: String,
    #[serde(default)]
    enc: String,
}

impl From<MasterKey> for Persisted {
    fn from(key: MasterKey) -> Self {
        Self {
            vault_url: key.vault_url,
            key: key.name,
            version: key.version,
            created_at: key
                .creation_date
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            enc: key.encrypted_key,
        }
    }
}

impl TryFrom<Persisted> for MasterKey {
    type Error = Error;

    fn try_from(p: Persisted) -> Result<Self> {
        let creation_date = DateTime::parse_from_rfc3339(&p.created_at)
            .map_err(|e| {
                Error::InvalidRecord(format!("invalid created_at '{}': {}", p.created_at, e))
            })?
            .with_timezone(&Utc);
        Ok(Self::restore(p.vault_url, p.key, p.version, p.enc, creation_date))
    }
}
