//! HTTP client for the keeper-api server.

use std::time::Duration;

use keeper_core::models::{
    ApiResponse, AuthResponse, LoginRequest, RegisterRequest, SyncRequest, SyncResponse,
};
use keeper_core::sync::SyncTransport;
use keeper_core::{Error, Record, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Talks to `/api/v1`. Every failure surfaces as [`Error::Transport`],
/// except a rejected credential, which is [`Error::Unauthorized`].
#[derive(Clone)]
pub struct HttpClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            base_url,
            token: None,
            client,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let builder = self.client.post(self.url("/register")).json(request);
        self.send(builder).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let builder = self.client.post(self.url("/login")).json(request);
        self.send(builder).await
    }

    /// Every live record the server holds for the caller, payloads as the
    /// client encrypted them.
    pub async fn list_records(&self) -> Result<Vec<Record>> {
        let builder = self.authorized(self.client.get(self.url("/data")))?;
        self.send(builder).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::unauthorized("no session token"))?;
        Ok(builder.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);
            return Err(if status == StatusCode::UNAUTHORIZED {
                Error::Unauthorized(message)
            } else {
                Error::Transport(message)
            });
        }

        let envelope: ApiResponse<T> = response.json().await.map_err(|error| {
            Error::Transport(format!("invalid response payload: {error}"))
        })?;
        if !envelope.success {
            return Err(Error::Transport(
                envelope
                    .error
                    .unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| Error::Transport("response carried no data".to_string()))
    }
}

impl SyncTransport for HttpClient {
    async fn exchange(&self, request: &SyncRequest) -> Result<SyncResponse> {
        let builder = self.authorized(self.client.post(self.url("/sync")).json(request))?;
        self.send(builder).await
    }
}

fn transport(error: reqwest::Error) -> Error {
    Error::Transport(error.to_string())
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = keeper_core::util::compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_prefers_envelope_message() {
        let body = r#"{"success":false,"error":"invalid username or password","code":401}"#;
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, body),
            "invalid username or password (401)"
        );
    }

    #[test]
    fn api_error_falls_back_to_body_or_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn urls_are_rooted_at_api_v1() {
        let client = HttpClient::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/sync"), "http://localhost:8080/api/v1/sync");
    }

    #[tokio::test]
    async fn protected_calls_need_a_token() {
        let client = HttpClient::new("http://localhost:9", Duration::from_secs(1)).unwrap();
        let err = client.list_records().await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let client = HttpClient::new("http://localhost:8080", Duration::from_secs(5))
            .unwrap()
            .with_token("secret-token");
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
    }
}
