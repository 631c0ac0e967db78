//! Blocking `ureq` implementation of [`HttpTransport`].

use std::io::Read;
use std::time::Duration;

use crate::http::{
    HttpFailureKind, HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestFailure,
};

pub const USER_AGENT: &str = "uniassets/0.1.0 (university asset resolver)";
const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

/// Transport backed by a shared `ureq::Agent` (connection pool included).
pub struct UreqTransport {
    http_client: ureq::Agent,
}

impl UreqTransport {
    /// Creates a transport whose socket timeouts match the request timeout.
    pub fn new(request_timeout: Duration) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5).min(request_timeout))
            .timeout_read(request_timeout)
            .timeout_write(request_timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { http_client }
    }

    fn classify_transport_failure(transport: &ureq::Transport) -> HttpFailureKind {
        let lowered = transport.to_string().to_ascii_lowercase();
        if lowered.contains("timed out") || lowered.contains("timeout") {
            return HttpFailureKind::Timeout;
        }
        match transport.kind() {
            ureq::ErrorKind::Dns
            | ureq::ErrorKind::ConnectionFailed
            | ureq::ErrorKind::Io
            | ureq::ErrorKind::ProxyConnect => HttpFailureKind::Connection,
            _ => HttpFailureKind::Hard,
        }
    }

    fn classify_io_failure(error: &std::io::Error) -> HttpFailureKind {
        let timed_out = matches!(
            error.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        ) || error.to_string().to_ascii_lowercase().contains("timed out");
        if timed_out {
            HttpFailureKind::Timeout
        } else {
            HttpFailureKind::Connection
        }
    }

    /// Reads at most `limit` bytes. A body longer than that is a failure, not a truncation.
    fn read_capped_body<R: Read>(
        reader: R,
        limit: u64,
        url: &str,
    ) -> Result<Vec<u8>, RequestFailure> {
        let mut body = Vec::new();
        reader
            .take(limit.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|error| {
                RequestFailure::new(
                    Self::classify_io_failure(&error),
                    format!("Failed to read response from {url}: {error}"),
                )
            })?;
        if body.len() as u64 > limit {
            return Err(RequestFailure::new(
                HttpFailureKind::Hard,
                format!("Response from {url} exceeds {limit} bytes"),
            ));
        }
        Ok(body)
    }

    fn header_value(response: &ureq::Response, name: &str) -> Option<String> {
        response
            .header(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, RequestFailure> {
        let mut pending = self
            .http_client
            .request(request.method.as_str(), &request.url)
            .timeout(request.timeout);
        for (key, value) in &request.query {
            pending = pending.query(key, value);
        }
        for (key, value) in &request.headers {
            pending = pending.set(key, value);
        }

        let outcome = match &request.json_body {
            Some(body) => pending.send_json(body),
            None => pending.call(),
        };
        let response = match outcome {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(transport)) => {
                return Err(RequestFailure::new(
                    Self::classify_transport_failure(&transport),
                    format!(
                        "{} {} failed: {transport}",
                        request.method.as_str(),
                        request.display_url()
                    ),
                ));
            }
        };

        let status = response.status();
        let content_type = Self::header_value(&response, "Content-Type");
        let content_length =
            Self::header_value(&response, "Content-Length").and_then(|value| value.parse().ok());

        let body = if request.method == HttpMethod::Head {
            Vec::new()
        } else {
            Self::read_capped_body(response.into_reader(), MAX_BODY_BYTES, &request.url)?
        };

        Ok(HttpResponse {
            status,
            content_type,
            content_length,
            body,
        })
    }
}
