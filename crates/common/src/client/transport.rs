use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

/// A JSON request handed to a [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
    /// Login token sent as `Authorization: Bearer <token>`
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            bearer: None,
        }
    }

    pub fn post(url: Url, body: Value) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(body),
            bearer: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// What came back from the server
///
/// `json` is `Value::Null` when the body was empty or not JSON.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub json: Value,
    pub headers: HeaderMap,
}

impl HttpResponse {
    pub fn new(status: StatusCode, json: Value) -> Self {
        Self {
            status,
            json,
            headers: HeaderMap::new(),
        }
    }

    /// Token from an `Authorization: Bearer <token>` response header, if any
    pub fn bearer_token(&self) -> Option<String> {
        let value = self.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
            return None;
        }
        Some(token.trim().to_string())
    }

    /// The server's error message, if it sent one
    pub fn message(&self) -> String {
        self.json
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.json.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("connection failed: {0}")]
    Connection(String),
}

/// The one network primitive the core needs: send a JSON request, get a JSON
/// response back with its status and headers.
///
/// Non-2xx statuses are not errors at this layer; callers decide what a
/// status means.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
mod test {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_bearer_token_from_header() {
        let mut response = HttpResponse::new(StatusCode::OK, Value::Null);
        assert_eq!(response.bearer_token(), None);

        response
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(response.bearer_token().as_deref(), Some("abc.def"));

        response
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(response.bearer_token(), None);
    }

    #[test]
    fn test_message_falls_back_to_body() {
        let response = HttpResponse::new(
            StatusCode::CONFLICT,
            serde_json::json!({"result": "error", "message": "revision mismatch"}),
        );
        assert_eq!(response.message(), "revision mismatch");

        let response = HttpResponse::new(StatusCode::BAD_GATEWAY, Value::Null);
        assert_eq!(response.message(), "null");
    }
}
