//! Client certificate credential.
//!
//! Authenticates with a signed JWT client assertion. The certificate is
//! given as PEM text holding one or more `CERTIFICATE` blocks (leaf first)
//! and an RSA private key as `PRIVATE KEY`, `RSA PRIVATE KEY` or
//! password-protected `ENCRYPTED PRIVATE KEY`.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pkcs8::EncryptedPrivateKeyInfo;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use url::Url;
use zeroize::Zeroizing;

use super::{oauth, AccessToken, TokenCache, TokenCredential};
use crate::core::constants;
use crate::error::{CredentialError, Result};

const PEM_LINE_WIDTH: usize = 64;

/// Authenticates a service principal with a certificate.
pub struct ClientCertificateCredential {
    tenant_id: String,
    client_id: String,
    key: EncodingKey,
    /// base64url SHA-256 of the leaf certificate
    thumbprint: String,
    /// base64 DER certificates, leaf first
    chain: Vec<String>,
    send_chain: bool,
    token_endpoint: Url,
    cache: TokenCache,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

impl ClientCertificateCredential {
    /// Create a credential from PEM certificate and key material.
    ///
    /// `password` decrypts an `ENCRYPTED PRIVATE KEY` block and is ignored
    /// for unencrypted keys.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Certificate` if no certificate can be read,
    /// `CredentialError::PrivateKey` if the key is missing, unsupported,
    /// or cannot be decrypted, and the tenant/authority errors of
    /// [`ClientSecretCredential::new`](super::ClientSecretCredential::new).
    pub fn from_pem(
        tenant_id: &str,
        client_id: &str,
        pem: &[u8],
        password: Option<&str>,
        send_chain: bool,
        authority_host: &str,
    ) -> Result<Self> {
        let token_endpoint = oauth::token_endpoint(authority_host, tenant_id)?;
        let blocks = parse_pem(pem)?;

        let certificates: Vec<&PemBlock> =
            blocks.iter().filter(|b| b.label == "CERTIFICATE").collect();
        let leaf = certificates.first().ok_or_else(|| {
            CredentialError::Certificate("no CERTIFICATE block found".to_string())
        })?;
        for cert in &certificates {
            // Every X.509 certificate is a DER SEQUENCE.
            if cert.der.first() != Some(&0x30) {
                return Err(CredentialError::Certificate(
                    "certificate block is not DER encoded".to_string(),
                )
                .into());
            }
        }

        let key = load_private_key(&blocks, password)?;
        let thumbprint = URL_SAFE_NO_PAD.encode(Sha256::digest(leaf.der.as_slice()));
        let chain = certificates.iter().map(|c| STANDARD.encode(&*c.der)).collect();

        debug!(
            client_id,
            certificates = certificates.len(),
            send_chain,
            "client certificate loaded"
        );

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            key,
            thumbprint,
            chain,
            send_chain,
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

    /// SHA-256 thumbprint of the leaf certificate (base64url)
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Number of certificates in the chain
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn sends_chain(&self) -> bool {
        self.send_chain
    }

    /// Sign a fresh client assertion for the token endpoint.
    pub fn assertion(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let audience = self.token_endpoint.as_str();
        let claims = AssertionClaims {
            aud: audience,
            iss: &self.client_id,
            sub: &self.client_id,
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            iat: now,
            exp: now + constants::ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::PS256);
        header.x5t_s256 = Some(self.thumbprint.clone());
        if self.send_chain {
            header.x5c = Some(self.chain.clone());
        }

        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| CredentialError::Assertion(e.to_string()).into())
    }
}

#[async_trait]
impl TokenCredential for ClientCertificateCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        if let Some(token) = self.cache.get(scope) {
            trace!(scope, "using cached token");
            return Ok(token);
        }

        let assertion = self.assertion()?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_assertion_type", constants::JWT_BEARER_ASSERTION),
            ("client_assertion", assertion.as_str()),
            ("scope", scope),
        ];
        let token = oauth::request_token(&self.token_endpoint, &form).await?;
        self.cache.insert(scope, token.clone());
        Ok(token)
    }
}

impl std::fmt::Debug for ClientCertificateCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificateCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("thumbprint", &self.thumbprint)
            .field("send_chain", &self.send_chain)
            .finish_non_exhaustive()
    }
}

struct PemBlock {
    label: String,
    der: Zeroizing<Vec<u8>>,
    encrypted_header: bool,
}

fn parse_pem(input: &[u8]) -> Result<Vec<PemBlock>> {
    let text = std::str::from_utf8(input).map_err(|_| {
        CredentialError::Certificate(
            "certificate is not PEM text (PKCS#12 bundles are not supported)".to_string(),
        )
    })?;

    let mut blocks = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(label) = line
            .trim()
            .strip_prefix("-----BEGIN ")
            .and_then(|l| l.strip_suffix("-----"))
        else {
            continue;
        };

        let end = format!("-----END {}-----", label);
        let mut body = Zeroizing::new(String::new());
        let mut encrypted_header = false;
        let mut closed = false;
        for line in lines.by_ref() {
            let line = line.trim();
            if line == end {
                closed = true;
                break;
            }
            // RFC 1421 headers (Proc-Type, DEK-Info)
            if line.contains(':') {
                encrypted_header |= line.contains("ENCRYPTED");
                continue;
            }
            body.push_str(line);
        }
        if !closed {
            return Err(CredentialError::Certificate(format!("unterminated {} block", label)).into());
        }

        let der = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| CredentialError::Certificate(format!("invalid {} block: {}", label, e)))?;
        blocks.push(PemBlock {
            label: label.to_string(),
            der: Zeroizing::new(der),
            encrypted_header,
        });
    }

    if blocks.is_empty() {
        return Err(CredentialError::Certificate("no PEM blocks found".to_string()).into());
    }
    Ok(blocks)
}

fn load_private_key(blocks: &[PemBlock], password: Option<&str>) -> Result<EncodingKey> {
    let block = blocks
        .iter()
        .find(|b| b.label.ends_with("PRIVATE KEY"))
        .ok_or_else(|| CredentialError::PrivateKey("no private key found".to_string()))?;

    let pem = match block.label.as_str() {
        "ENCRYPTED PRIVATE KEY" => {
            let password = password.ok_or_else(|| {
                CredentialError::PrivateKey(
                    "private key is encrypted but no clientCertificatePassword was given"
                        .to_string(),
                )
            })?;
            let info = EncryptedPrivateKeyInfo::try_from(block.der.as_slice())
                .map_err(|e| CredentialError::PrivateKey(e.to_string()))?;
            let document = info.decrypt(password).map_err(|e| {
                CredentialError::PrivateKey(format!("failed to decrypt private key: {}", e))
            })?;
            to_pem("PRIVATE KEY", document.as_bytes())
        }
        "RSA PRIVATE KEY" if block.encrypted_header => {
            return Err(CredentialError::PrivateKey(
                "legacy encrypted PEM keys are not supported, convert to PKCS#8".to_string(),
            )
            .into());
        }
        "PRIVATE KEY" | "RSA PRIVATE KEY" => to_pem(&block.label, &block.der),
        other => {
            return Err(CredentialError::PrivateKey(format!(
                "unsupported key type '{}', only RSA keys can sign client assertions",
                other
            ))
            .into());
        }
    };

    let key = EncodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|e| CredentialError::PrivateKey(e.to_string()))?;

    // Parsing is lazy; signing once surfaces malformed keys now.
    jsonwebtoken::encode(
        &Header::new(Algorithm::PS256),
        &serde_json::json!({ "probe": true }),
        &key,
    )
    .map_err(|e| CredentialError::PrivateKey(e.to_string()))?;

    Ok(key)
}

fn to_pem(label: &str, der: &[u8]) -> Zeroizing<String> {
    let encoded = Zeroizing::new(STANDARD.encode(der));
    let mut pem = Zeroizing::new(format!("-----BEGIN {}-----\n", label));
    for chunk in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}
