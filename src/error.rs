//! Error types.
//!
//! Errors are grouped by the stage that produced them: reading the
//! authentication file, building a credential, or talking to Key Vault
//! and the identity provider. Everything converts into [`Error`].

use thiserror::Error;

/// Top-level error for all azkv operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Encrypt or decrypt was attempted before a credential was attached.
    #[error("no credential set for key {0}: resolve one with set_token first")]
    NoCredential(String),

    #[error("invalid key reference: {0}")]
    InvalidKeyReference(String),

    #[error("invalid key record: {0}")]
    InvalidRecord(String),
}

/// Failures loading the Azure authentication file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read Azure authentication file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to decode Azure authentication file bytes: {0}")]
    Decode(String),

    #[error("failed to unmarshal Azure authentication file: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error(
        "invalid data: requires a 'clientId' field, a combination of 'tenantId', 'clientId' \
         and 'clientSecret', or 'tenantId', 'clientId' and 'clientCertificate'"
    )]
    InvalidCredentialConfig,
}

/// Failures constructing a credential from otherwise valid config.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("failed to parse client certificate: {0}")]
    Certificate(String),

    #[error("failed to load client certificate private key: {0}")]
    PrivateKey(String),

    #[error("invalid tenant ID '{0}': only alphanumeric characters, '.' and '-' are allowed")]
    InvalidTenant(String),

    #[error("invalid authority host '{host}': {reason}")]
    AuthorityHost { host: String, reason: String },

    #[error("failed to build client assertion: {0}")]
    Assertion(String),
}

/// Failures talking to Key Vault or the identity provider.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("failed to construct client to {operation} data: {reason}")]
    Client {
        operation: &'static str,
        reason: String,
    },

    #[error("failed to acquire access token: {0}")]
    Authentication(String),

    #[error("failed to {operation} data: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
    },

    #[error("failed to {operation} data: service returned {status}: {code}: {message}")]
    Service {
        operation: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    #[error("failed to {operation} data: malformed response: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
