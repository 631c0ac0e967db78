//! Last-resort gallery discovery from the public college page.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use scraper::{Html, Selector};

use crate::config::Config;
use crate::http::{HttpRequest, HttpTransport, RequestFailure};
use crate::protocol::ImageCandidate;
use crate::resolvers::candidate_validator::CandidateValidator;
use crate::resolvers::crawl_policy::CrawlPermission;

const IMAGE_SOURCE_ATTRIBUTES: [&str; 2] = ["src", "data-src"];

pub struct PageScrapeResolver {
    transport: Arc<dyn HttpTransport>,
    site_root: String,
    headers: Vec<(String, String)>,
    request_timeout: Duration,
    gallery_markers: Vec<String>,
}

impl PageScrapeResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            transport,
            site_root: config.source.site_root.clone(),
            headers: config.auth_headers(),
            request_timeout: config.request_timeout(),
            gallery_markers: config.scrape.gallery_markers.clone(),
        }
    }

    pub fn page_url(&self, slug: &str) -> String {
        format!("{}/college/{slug}", self.site_root)
    }

    /// Resolves protocol-relative and root-relative references against the site root.
    pub fn absolutize(src: &str, site_root: &str) -> Option<String> {
        let src = src.trim();
        if src.starts_with("http://") || src.starts_with("https://") {
            return Some(src.to_string());
        }
        if let Some(rest) = src.strip_prefix("//") {
            return (!rest.is_empty()).then(|| format!("https://{rest}"));
        }
        if src.starts_with('/') {
            return Some(format!("{site_root}{src}"));
        }
        None
    }

    /// Image references in `html` whose path carries one of `markers`, absolutized, in page order.
    pub fn extract_gallery_references(
        html: &str,
        markers: &[String],
        site_root: &str,
    ) -> Vec<String> {
        let Ok(selector) = Selector::parse("img") else {
            return Vec::new();
        };
        let document = Html::parse_document(html);
        let mut references = Vec::new();
        for element in document.select(&selector) {
            for attribute in IMAGE_SOURCE_ATTRIBUTES {
                let Some(src) = element.value().attr(attribute) else {
                    continue;
                };
                if !markers.iter().any(|marker| src.contains(marker.as_str())) {
                    continue;
                }
                if let Some(url) = Self::absolutize(src, site_root) {
                    references.push(url);
                }
            }
        }
        references
    }

    /// Fetches and mines the college page. Returns no candidates without issuing
    /// any request when the crawl policy forbids it.
    pub fn scrape(
        &self,
        slug: &str,
        permission: CrawlPermission,
        validator: &CandidateValidator,
    ) -> Result<Vec<ImageCandidate>, RequestFailure> {
        if !permission.permits_requests() {
            debug!("Skipping page scrape for {}: crawling disallowed", slug);
            return Ok(Vec::new());
        }

        let page_url = self.page_url(slug);
        let request =
            HttpRequest::get(&page_url, self.request_timeout).with_headers(&self.headers);
        let response = self.transport.send(&request)?;
        if !response.is_success() {
            warn!("{} returned HTTP {}", page_url, response.status);
            return Ok(Vec::new());
        }

        let references = Self::extract_gallery_references(
            &response.text(),
            &self.gallery_markers,
            &self.site_root,
        );
        debug!(
            "{} lists {} gallery reference(s)",
            page_url,
            references.len()
        );
        Ok(validator.validate_all(&references))
    }
}
