//! HTTP transport abstraction, request/response values and failure classes.

pub mod retry_policy;
#[cfg(test)]
pub mod scripted_transport;
pub mod ureq_transport;

use std::fmt;
use std::time::Duration;

use serde_json::Value;

/// HTTP verbs used by the resolvers and the downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Put,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
        }
    }
}

/// One outbound request. Owned so transports can log or record it.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub json_body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    fn new(method: HttpMethod, url: &str, timeout: Duration) -> Self {
        Self {
            method,
            url: url.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            json_body: None,
            timeout,
        }
    }

    pub fn get(url: &str, timeout: Duration) -> Self {
        Self::new(HttpMethod::Get, url, timeout)
    }

    pub fn head(url: &str, timeout: Duration) -> Self {
        Self::new(HttpMethod::Head, url, timeout)
    }

    pub fn put_json(url: &str, body: Value, timeout: Duration) -> Self {
        let mut request = Self::new(HttpMethod::Put, url, timeout);
        request.json_body = Some(body);
        request
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: &[(String, String)]) -> Self {
        self.headers.extend(headers.iter().cloned());
        self
    }

    /// URL including the percent-encoded query string, for logs and error messages.
    pub fn display_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url)
    }
}

/// A response with any status code. Transports only fail when no response arrived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<Value, RequestFailure> {
        serde_json::from_slice(&self.body).map_err(|error| {
            RequestFailure::new(
                HttpFailureKind::Hard,
                format!("Invalid JSON response: {error}"),
            )
        })
    }

    /// Converts a non-2xx status into a classified failure.
    pub fn error_for_status(self, url: &str) -> Result<Self, RequestFailure> {
        if self.is_success() {
            return Ok(self);
        }
        Err(RequestFailure::from_status(self.status, url))
    }
}

/// Failure classes that drive the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFailureKind {
    Timeout,
    Connection,
    RateLimited,
    ServerError,
    ClientError,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub kind: HttpFailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl RequestFailure {
    pub fn new(kind: HttpFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, url: &str) -> Self {
        let kind = match status {
            408 => HttpFailureKind::Timeout,
            429 => HttpFailureKind::RateLimited,
            400..=499 => HttpFailureKind::ClientError,
            500..=599 => HttpFailureKind::ServerError,
            _ => HttpFailureKind::Hard,
        };
        Self {
            kind,
            status: Some(status),
            message: format!("{url} returned HTTP {status}"),
        }
    }

    /// Timeouts, dropped connections, throttling and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            HttpFailureKind::Timeout
                | HttpFailureKind::Connection
                | HttpFailureKind::RateLimited
                | HttpFailureKind::ServerError
        )
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RequestFailure {}

/// Interface implemented by concrete HTTP clients.
pub trait HttpTransport: Send + Sync {
    /// Sends one request. Non-2xx statuses are returned as `Ok`.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, RequestFailure>;
}
