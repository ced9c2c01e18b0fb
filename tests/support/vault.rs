//! Mock Key Vault and identity provider.
//!
//! The mock server runs on its own multi-thread runtime so that the
//! blocking azkv API can be driven from the test thread.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use super::fixtures::{static_token, TEST_TOKEN};
use azkv::MasterKey;

const WRAP_PREFIX: &[u8] = b"kv1:";
const WRAP_MASK: u8 = 0xA5;

/// Reversible stand-in for RSA-OAEP-256: prefix and XOR mask.
pub struct FakeKeyOperations;

impl FakeKeyOperations {
    fn wrap(plaintext: &[u8]) -> Vec<u8> {
        let mut out = WRAP_PREFIX.to_vec();
        out.extend(plaintext.iter().map(|b| b ^ WRAP_MASK));
        out
    }

    fn unwrap(ciphertext: &[u8]) -> Option<Vec<u8>> {
        let body = ciphertext.strip_prefix(WRAP_PREFIX)?;
        Some(body.iter().map(|b| b ^ WRAP_MASK).collect())
    }
}

fn bad_parameter(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": { "code": "BadParameter", "message": message }
    }))
}

impl Respond for FakeKeyOperations {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(v) => v,
            Err(_) => return bad_parameter("body is not JSON"),
        };
        if body["alg"] != "RSA-OAEP-256" {
            return bad_parameter("unsupported algorithm");
        }
        let Some(input) = body["value"]
            .as_str()
            .and_then(|v| URL_SAFE_NO_PAD.decode(v).ok())
        else {
            return bad_parameter("value is not base64url");
        };

        let url_path = request.url.path();
        let output = if url_path.ends_with("/encrypt") {
            Self::wrap(&input)
        } else {
            match Self::unwrap(&input) {
                Some(plaintext) => plaintext,
                None => return bad_parameter("ciphertext was not produced by this key"),
            }
        };
        let kid = url_path.rsplit_once('/').map(|(k, _)| k).unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "kid": format!("{}{}", request.url.origin().ascii_serialization(), kid),
            "value": URL_SAFE_NO_PAD.encode(output),
        }))
    }
}

/// A mock server playing Key Vault and the identity endpoints.
pub struct MockVault {
    server: Option<MockServer>,
    rt: tokio::runtime::Runtime,
}

impl MockVault {
    /// Start an empty mock server.
    pub fn start() -> Self {
        let rt = tokio::runtime::Runtime::new().expect("failed to create runtime");
        let server = rt.block_on(MockServer::start());
        Self {
            server: Some(server),
            rt,
        }
    }

    /// Start a mock server answering key operations for `TEST_TOKEN`.
    pub fn with_key_operations() -> Self {
        let vault = Self::start();
        vault.mount_key_operations(TEST_TOKEN);
        vault
    }

    fn server(&self) -> &MockServer {
        self.server.as_ref().expect("mock server already stopped")
    }

    pub fn uri(&self) -> String {
        self.server().uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(self.server()));
    }

    /// Answer encrypt/decrypt on any key for callers presenting `token`.
    pub fn mount_key_operations(&self, token: &str) {
        self.mount(
            Mock::given(method("POST"))
                .and(path_regex(r"^/keys/[^/]+/[^/]+/(encrypt|decrypt)$"))
                .and(query_param("api-version", "7.4"))
                .and(header("authorization", format!("Bearer {}", token).as_str()))
                .respond_with(FakeKeyOperations),
        );
    }

    /// Answer the client-credentials token endpoint for `tenant`.
    pub fn mount_token_endpoint(&self, tenant: &str, token: &str) {
        self.mount(
            Mock::given(method("POST"))
                .and(path(format!("/{}/oauth2/v2.0/token", tenant)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "access_token": token,
                }))),
        );
    }

    /// Requests received so far.
    pub fn received(&self) -> Vec<Request> {
        self.rt
            .block_on(self.server().received_requests())
            .unwrap_or_default()
    }

    /// Requests received whose path ends with `suffix`.
    pub fn received_matching(&self, suffix: &str) -> Vec<Request> {
        self.received()
            .into_iter()
            .filter(|r| r.url.path().ends_with(suffix))
            .collect()
    }

    /// A key on this vault authenticated with `TEST_TOKEN`.
    pub fn key(&self, name: &str, version: &str) -> MasterKey {
        MasterKey::new(self.uri(), name, version).with_credential(static_token())
    }
}

impl Drop for MockVault {
    fn drop(&mut self) {
        let _guard = self.rt.enter();
        self.server.take();
    }
}

/// Request body decoded as a form.
pub fn form(request: &Request) -> Vec<(String, String)> {
    url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect()
}

/// Value of `name` in a form body.
pub fn form_value(request: &Request, name: &str) -> Option<String> {
    form(request)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}
