//! Request/response functions for the session backend.
//!
//! Each method is a single round trip with no retry. Failures come back as
//! [`ApiError`] and the caller decides what they mean for the session.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ApiError;
use crate::models::Collection;

/// Header carrying the session token on protected routes
pub const SESSION_HEADER: &str = "X-Session-Key";

/// Fallback message when the backend rejects a login without saying why
const LOGIN_FAILED: &str = "Login failed";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    username: Option<String>,
    email: Option<String>,
    token: Option<String>,
    error: Option<String>,
}

/// Credentials issued by a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub username: String,
    pub email: Option<String>,
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub valid: bool,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Stateless HTTP access to the backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
}

impl Gateway {
    /// `base_url` must end with `/`. No timeout is applied unless one is given;
    /// otherwise the transport's own behavior applies.
    pub fn new(base_url: String, timeout: Option<Duration>, user_agent: &str) -> Result<Self, ApiError> {
        let mut builder = Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read the body and fail with a status-mapped error on non-2xx
    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e)))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginGrant, ApiError> {
        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "Login response received");

        if !status.is_success() {
            let message = ApiError::error_field(&body).unwrap_or_else(|| LOGIN_FAILED.to_string());
            return Err(ApiError::Rejected(message));
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;

        if !parsed.success {
            let message = parsed
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| LOGIN_FAILED.to_string());
            return Err(ApiError::Rejected(message));
        }

        match (parsed.token, parsed.username) {
            (Some(token), Some(username)) if !token.is_empty() && !username.is_empty() => {
                Ok(LoginGrant {
                    username,
                    email: parsed.email.filter(|e| !e.is_empty()),
                    token,
                })
            }
            _ => Err(ApiError::InvalidResponse(
                "Login response is missing token or username".to_string(),
            )),
        }
    }

    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("auth/logout"))
            .header(SESSION_HEADER, token)
            .json(&TokenRequest { token })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    pub async fn verify(&self, token: &str) -> Result<VerifyResponse, ApiError> {
        let response = self
            .client
            .post(self.url("auth/verify"))
            .header(SESSION_HEADER, token)
            .json(&TokenRequest { token })
            .send()
            .await?;
        Self::read_json(response, "verify").await
    }

    pub async fn fetch_user(&self, token: &str) -> Result<UserPayload, ApiError> {
        let response = self
            .client
            .get(self.url("auth/user"))
            .header(SESSION_HEADER, token)
            .send()
            .await?;
        Self::read_json(response, "user").await
    }

    /// Read the backend's cached copy of a collection
    pub async fn fetch_collection(&self, kind: Collection, token: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("auth/{}", kind)))
            .header(SESSION_HEADER, token)
            .send()
            .await?;
        Self::read_json(response, kind.as_str()).await
    }

    /// Ask the backend to rebuild a collection from upstream
    pub async fn refresh_collection(&self, kind: Collection, token: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("auth/refresh/{}", kind)))
            .header(SESSION_HEADER, token)
            .send()
            .await?;
        Self::read_json(response, kind.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> Gateway {
        Gateway::new(format!("{}/", server.uri()), None, "gamerlink-test").unwrap()
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "a@b.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "username": "Jackie", "email": "a@b.com", "token": "T1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = gateway(&server).login("a@b.com", "pw").await.unwrap();
        assert_eq!(
            grant,
            LoginGrant {
                username: "Jackie".to_string(),
                email: Some("a@b.com".to_string()),
                token: "T1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_login_rejected_uses_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "error": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        match gateway(&server).login("a@b.com", "bad").await {
            Err(ApiError::Rejected(message)) => assert_eq!(message, "Invalid credentials"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_non_2xx_falls_back_to_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        match gateway(&server).login("a@b.com", "pw").await {
            Err(ApiError::Rejected(message)) => assert_eq!(message, "Login failed"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_without_token_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "username": "J"})))
            .mount(&server)
            .await;

        let err = gateway(&server).login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_protected_routes_send_session_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/friends"))
            .and(header(SESSION_HEADER, "T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"friends": [], "count": 0})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh/games"))
            .and(header(SESSION_HEADER, "T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"games": []})))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let friends = gw.fetch_collection(Collection::Friends, "T1").await.unwrap();
        assert_eq!(friends["count"], 0);
        gw.refresh_collection(Collection::Games, "T1").await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_collection_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/games"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "Upstream busy"})))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        assert!(gw.fetch_collection(Collection::Games, "T1").await.unwrap_err().is_unauthorized());

        let err = gw.fetch_collection(Collection::Profile, "T1").await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
        assert_eq!(err.server_message(), Some("Upstream busy"));
    }

    #[tokio::test]
    async fn test_verify_sends_token_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/verify"))
            .and(body_json(json!({"token": "T1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"valid": true, "email": "a@b.com"})))
            .mount(&server)
            .await;

        let verified = gateway(&server).verify("T1").await.unwrap();
        assert!(verified.valid);
        assert_eq!(verified.username, None);
        assert_eq!(verified.email.as_deref(), Some("a@b.com"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let gw = Gateway::new("http://127.0.0.1:9/".to_string(), None, "gamerlink-test").unwrap();
        let err = gw.verify("T1").await.unwrap_err();
        assert!(err.is_transport());
    }
}
