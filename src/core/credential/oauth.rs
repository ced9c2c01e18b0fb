//! Microsoft identity platform client-credentials flow.

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

use super::AccessToken;
use crate::core::http::{self, NumberOrString};
use crate::error::{CredentialError, RemoteError, Result};

/// Default token lifetime when the response carries none.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<NumberOrString>,
    #[serde(default)]
    expires_on: Option<NumberOrString>,
}

impl TokenResponse {
    pub fn into_access_token(self) -> AccessToken {
        let now = Utc::now();
        let expires_on = self
            .expires_on
            .and_then(|v| v.as_i64())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| {
                let secs = self
                    .expires_in
                    .and_then(|v| v.as_i64())
                    .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
                now + Duration::seconds(secs)
            });
        AccessToken::new(self.access_token, expires_on)
    }
}

/// Check a tenant ID before it is spliced into a URL.
pub(crate) fn validate_tenant(tenant_id: &str) -> Result<()> {
    let valid = !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(CredentialError::InvalidTenant(tenant_id.to_string()).into())
    }
}

/// Token endpoint for `tenant_id` under `authority_host`.
pub(crate) fn token_endpoint(authority_host: &str, tenant_id: &str) -> Result<Url> {
    validate_tenant(tenant_id)?;

    let invalid = |reason: String| CredentialError::AuthorityHost {
        host: authority_host.to_string(),
        reason,
    };

    let mut base = Url::parse(authority_host).map_err(|e| invalid(e.to_string()))?;
    if base.scheme() != "https" && base.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme '{}'", base.scheme())).into());
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join(&format!("{}/oauth2/v2.0/token", tenant_id))
        .map_err(|e| invalid(e.to_string()).into())
}

/// Post a client-credentials form and parse the token response.
pub(crate) async fn request_token(endpoint: &Url, form: &[(&str, &str)]) -> Result<AccessToken> {
    debug!(endpoint = %endpoint, "requesting access token");

    let client = http::client("authenticate")?;
    let response = client
        .post(endpoint.clone())
        .form(form)
        .send()
        .await
        .map_err(|e| RemoteError::Authentication(format!("token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RemoteError::Authentication(format!("failed to read token response: {}", e)))?;

    if !status.is_success() {
        let detail = http::error_detail(&body);
        return Err(RemoteError::Authentication(format!(
            "identity provider returned {}: {}: {}",
            status.as_u16(),
            detail.code,
            detail.message
        ))
        .into());
    }

    let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        RemoteError::Authentication(format!("malformed token response: {}", e))
    })?;

    trace!("access token acquired");
    Ok(token.into_access_token())
}
