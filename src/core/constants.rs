//! Constants used throughout azkv.
//!
//! Centralizes endpoints, protocol versions and policy values.

use chrono::Duration;

/// Key type identifier used by the surrounding key group format.
pub const KEY_TYPE_IDENTIFIER: &str = "azure_kv";

/// Azure public cloud authority, used when `authorityHost` is not set.
pub const AZURE_PUBLIC_CLOUD: &str = "https://login.microsoftonline.com/";

/// Key Vault resource for the public cloud.
pub const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";

/// Key Vault REST API version for key operations.
pub const KEY_VAULT_API_VERSION: &str = "7.4";

/// Key wrapping algorithm sent with every encrypt/decrypt call.
pub const KEY_ALGORITHM: &str = "RSA-OAEP-256";

/// Azure Instance Metadata Service token endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// IMDS API version.
pub const IMDS_API_VERSION: &str = "2018-02-01";

/// App Service / Functions managed identity API version.
pub const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Managed identity endpoint variable set by App Service.
pub const IDENTITY_ENDPOINT_VAR: &str = "IDENTITY_ENDPOINT";

/// Managed identity header secret variable set by App Service.
pub const IDENTITY_HEADER_VAR: &str = "IDENTITY_HEADER";

/// OAuth2 assertion type for certificate credentials.
pub const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a signed client assertion, in seconds.
pub const ASSERTION_LIFETIME_SECS: i64 = 600;

/// Tokens are refreshed this long before they expire.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Environment variable holding the log filter.
pub const LOG_ENV_VAR: &str = "AZKV_LOG";

/// Data keys older than this should be rotated (6 × 30 days).
pub fn rotation_period() -> Duration {
    Duration::days(30 * 6)
}
