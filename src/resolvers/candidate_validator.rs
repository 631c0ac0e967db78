//! HEAD-probe validation of image candidate URLs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::http::{HttpRequest, HttpTransport};
use crate::protocol::ImageCandidate;

/// Accepts a URL only when a metadata probe reports a 2xx status, an
/// `image/*` content type and a positive content length.
pub struct CandidateValidator {
    transport: Arc<dyn HttpTransport>,
    probe_timeout: Duration,
}

impl CandidateValidator {
    pub fn new(transport: Arc<dyn HttpTransport>, probe_timeout: Duration) -> Self {
        Self {
            transport,
            probe_timeout,
        }
    }

    fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }

    /// Probes one URL. Every failure mode is a rejection, never an error.
    pub fn validate(&self, url: &str) -> Option<ImageCandidate> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            debug!("Rejecting non-http candidate '{}'", url);
            return None;
        }

        let response = match self.transport.send(&HttpRequest::head(url, self.probe_timeout)) {
            Ok(response) => response,
            Err(failure) => {
                debug!("Probe failed for '{}': {}", url, failure);
                return None;
            }
        };
        if !response.is_success() {
            debug!("Probe of '{}' returned HTTP {}", url, response.status);
            return None;
        }
        let is_image = response
            .content_type
            .as_deref()
            .is_some_and(Self::is_image_content_type);
        if !is_image {
            debug!(
                "Probe of '{}' is not an image ({})",
                url,
                response.content_type.as_deref().unwrap_or("no content type")
            );
            return None;
        }
        match response.content_length {
            Some(size_bytes) if size_bytes > 0 => Some(ImageCandidate {
                url: url.to_string(),
                size_bytes,
            }),
            _ => {
                debug!("Probe of '{}' reported no content length", url);
                None
            }
        }
    }

    /// Probes candidates in discovery order, skipping repeated URLs.
    pub fn validate_all<S: AsRef<str>>(&self, urls: &[S]) -> Vec<ImageCandidate> {
        let mut seen = HashSet::new();
        urls.iter()
            .map(|url| url.as_ref().trim())
            .filter(|url| !url.is_empty() && seen.insert(url.to_string()))
            .filter_map(|url| self.validate(url))
            .collect()
    }
}
