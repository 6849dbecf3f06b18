//! HTTP client for a single vault node.
//!
//! `NodeClient` speaks the two DID auth endpoints used by the login
//! protocol, and carries authenticated JSON requests for everything built on
//! top of the session.

use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::{DidDocument, Token};
use crate::config::VaultConfig;

use super::VaultError;

// ============================================================================
// Constants
// ============================================================================

const SIGN_IN_PATH: &str = "/api/v1/did/sign_in";

const AUTH_PATH: &str = "/api/v1/did/auth";

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    document: &'a Value,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    challenge: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    jwt: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
}

/// Error envelope some nodes return with a 2xx status.
#[derive(Debug, Deserialize)]
struct NodeErrorEnvelope {
    #[serde(rename = "_status")]
    status: String,
    #[serde(rename = "_error")]
    error: Option<NodeErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct NodeErrorDetail {
    code: u16,
    #[serde(default)]
    message: String,
}

/// API client for one vault node.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: Client,
    base_url: String,
}

impl NodeClient {
    pub fn new(config: &VaultConfig) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VaultError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Present the DID document and receive a challenge JWT.
    pub async fn sign_in(&self, document: &DidDocument) -> Result<String, VaultError> {
        let response = self
            .client
            .post(self.url(SIGN_IN_PATH))
            .json(&SignInRequest { document: document.as_value() })
            .send()
            .await?;

        let response = Self::check_auth_response("sign_in", response).await?;
        let body: SignInResponse = Self::parse_auth_body("sign_in", response).await?;

        body.challenge
            .filter(|c| !c.is_empty())
            .ok_or_else(|| VaultError::Protocol("sign_in response has no challenge".to_string()))
    }

    /// Exchange a signed assertion for an access token JWT.
    pub async fn auth(&self, assertion: &str) -> Result<String, VaultError> {
        let response = self
            .client
            .post(self.url(AUTH_PATH))
            .json(&AuthRequest { jwt: assertion })
            .send()
            .await?;

        let response = Self::check_auth_response("auth", response).await?;
        let body: AuthResponse = Self::parse_auth_body("auth", response).await?;

        body.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VaultError::Protocol("auth response has no access_token".to_string()))
    }

    async fn check_auth_response(endpoint: &str, response: Response) -> Result<Response, VaultError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(VaultError::from_auth_status(endpoint, status, &body))
        }
    }

    /// Read an auth endpoint body. Transport failures and timeouts while
    /// reading are `Network`; only a body that arrived but does not parse
    /// is `Protocol`.
    async fn parse_auth_body<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, VaultError> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| VaultError::Protocol(format!("Failed to parse {} response: {}", endpoint, e)))
    }

    fn auth_headers(token: &Token) -> Result<header::HeaderMap, VaultError> {
        let mut headers = header::HeaderMap::new();
        let value = header::HeaderValue::from_str(&token.authorization())
            .map_err(|_| VaultError::Protocol("access token is not a valid header value".to_string()))?;
        headers.insert(header::AUTHORIZATION, value);
        Ok(headers)
    }

    /// Check a domain response, classifying both HTTP errors and error
    /// envelopes delivered with a success status.
    async fn check_response<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, VaultError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(url = url, status = status.as_u16(), "Node returned error status");
            return Err(VaultError::from_status(status.as_u16(), &body));
        }

        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| {
                VaultError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
            })?
        };

        if let Ok(envelope) = serde_json::from_value::<NodeErrorEnvelope>(value.clone()) {
            if envelope.status.eq_ignore_ascii_case("ERR") {
                let (code, message) = envelope
                    .error
                    .map(|e| (e.code, e.message))
                    .unwrap_or((500, "unspecified node error".to_string()));
                debug!(url = url, code = code, "Node returned error envelope");
                return Err(VaultError::from_status(code, &message));
            }
        }

        serde_json::from_value(value).map_err(|e| {
            VaultError::InvalidResponse(format!("Unexpected response shape from {}: {}", url, e))
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &Token) -> Result<T, VaultError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .headers(Self::auth_headers(token)?)
            .send()
            .await?;
        Self::check_response(&url, response).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: &Token,
        body: &B,
    ) -> Result<T, VaultError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .headers(Self::auth_headers(token)?)
            .json(body)
            .send()
            .await?;
        Self::check_response(&url, response).await
    }
}
