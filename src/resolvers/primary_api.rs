//! Structured lookup against the program search and college detail APIs.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde_json::{json, Value};

use crate::config::Config;
use crate::http::retry_policy::RetryPolicy;
use crate::http::{HttpRequest, HttpTransport, RequestFailure};

/// Entity metadata returned by the detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDetail {
    pub display_name: Option<String>,
    pub logo_path: Option<String>,
    pub gallery_urls: Vec<String>,
}

pub struct PrimaryApiResolver {
    transport: Arc<dyn HttpTransport>,
    retry_policy: RetryPolicy,
    search_url: String,
    detail_url: String,
    media_base_url: String,
    course_type: String,
    headers: Vec<(String, String)>,
    request_timeout: Duration,
}

impl PrimaryApiResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            transport,
            retry_policy: config.retry_policy(),
            search_url: config.source.search_url.clone(),
            detail_url: config.source.detail_url.clone(),
            media_base_url: config.source.media_base_url.clone(),
            course_type: config.source.course_type.clone(),
            headers: config.auth_headers(),
            request_timeout: config.request_timeout(),
        }
    }

    fn request_json(&self, label: &str, request: &HttpRequest) -> Result<Value, RequestFailure> {
        let url = request.display_url();
        self.retry_policy.run(label, || {
            self.transport
                .send(request)?
                .error_for_status(&url)?
                .json()
        })
    }

    fn id_to_string(value: &Value) -> Option<String> {
        match value {
            Value::String(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    fn non_empty_str(value: Option<&Value>) -> Option<String> {
        value
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToOwned::to_owned)
    }

    /// Pulls the identifier of the first search result, if any.
    pub fn parse_search_match(payload: &Value) -> Option<String> {
        payload
            .get("data")
            .and_then(|data| data.get("results"))
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(|first| first.get("id"))
            .and_then(Self::id_to_string)
    }

    pub fn parse_detail(payload: &Value) -> EntityDetail {
        let Some(university) = payload
            .get("data")
            .and_then(|data| data.get("university"))
        else {
            return EntityDetail::default();
        };
        let gallery_urls = university
            .get("galleryImages")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| Self::non_empty_str(Some(item)))
                    .collect()
            })
            .unwrap_or_default();
        EntityDetail {
            display_name: Self::non_empty_str(university.get("name")),
            logo_path: Self::non_empty_str(university.get("logo")),
            gallery_urls,
        }
    }

    /// Search for the single best match of the configured program level.
    pub fn search(&self, name: &str) -> Result<Option<String>, RequestFailure> {
        let request = HttpRequest::get(&self.search_url, self.request_timeout)
            .with_query("offset", "0")
            .with_query("limit", "1")
            .with_query("university", name)
            .with_query("courseType", self.course_type.as_str())
            .with_headers(&self.headers);
        let payload = self.request_json("Program search", &request)?;
        Ok(Self::parse_search_match(&payload))
    }

    pub fn fetch_detail(&self, id: &str) -> Result<EntityDetail, RequestFailure> {
        let request =
            HttpRequest::put_json(&self.detail_url, json!({ "id": id }), self.request_timeout)
                .with_headers(&self.headers);
        let payload = self.request_json("College detail", &request)?;
        let detail = Self::parse_detail(&payload);
        debug!(
            "Detail {} has logo={:?} and {} gallery image(s)",
            id,
            detail.logo_path,
            detail.gallery_urls.len()
        );
        Ok(detail)
    }

    /// Absolute logo URL for a detail payload; relative paths live under the media bucket.
    pub fn logo_url(&self, detail: &EntityDetail) -> Option<String> {
        let path = detail.logo_path.as_deref()?;
        if path.starts_with("http") {
            return Some(path.to_string());
        }
        Some(format!(
            "{}/{}",
            self.media_base_url,
            path.trim_start_matches('/')
        ))
    }
}
