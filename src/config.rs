//! Resolver configuration model, defaults and loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::http::retry_policy::RetryPolicy;

pub const CONFIG_DIR_NAME: &str = "uniassets";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Root configuration read from `config.toml`. Built once at startup and
/// shared read-only by every resolver.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Remote API and storage locations.
    pub source: SourceConfig,
    #[serde(default)]
    /// Gallery selection and crawl policy.
    pub scrape: ScrapeConfig,
    #[serde(default)]
    /// Timeouts and retry schedule.
    pub network: NetworkConfig,
    #[serde(default)]
    /// Worker pool sizing and pacing.
    pub batch: BatchConfig,
}

/// Endpoints of the structured sources and the public site.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default = "default_detail_url")]
    pub detail_url: String,
    /// Storage bucket that relative logo paths and fallback logos live under.
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,
    /// Public site root used for robots.txt and college pages.
    #[serde(default = "default_site_root")]
    pub site_root: String,
    /// Program level used to narrow the search to one match.
    #[serde(default = "default_course_type")]
    pub course_type: String,
    #[serde(default)]
    pub bearer_token: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_max_gallery_images")]
    pub max_gallery_images: usize,
    #[serde(default)]
    pub ignore_robots: bool,
    /// Substrings an `<img>` path must contain to count as a gallery image.
    #[serde(default = "default_gallery_markers")]
    pub gallery_markers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for HEAD probes and the robots.txt fetch.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_initial_backoff_secs")]
    pub retry_initial_backoff_secs: u64,
    #[serde(default = "default_retry_max_backoff_secs")]
    pub retry_max_backoff_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Pause a worker takes after each entity before starting the next one.
    #[serde(default = "default_polite_delay_ms")]
    pub polite_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            search_url: default_search_url(),
            detail_url: default_detail_url(),
            media_base_url: default_media_base_url(),
            site_root: default_site_root(),
            course_type: default_course_type(),
            bearer_token: String::new(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_gallery_images: default_max_gallery_images(),
            ignore_robots: false,
            gallery_markers: default_gallery_markers(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_backoff_secs: default_retry_initial_backoff_secs(),
            retry_max_backoff_secs: default_retry_max_backoff_secs(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            polite_delay_ms: default_polite_delay_ms(),
        }
    }
}

impl Config {
    /// `<config dir>/uniassets/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Reads a config file. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|err| format!("Failed to read config {}: {err}", path.display()))?;
        toml::from_str::<Self>(&contents)
            .map_err(|err| format!("Failed to parse config {}: {err}", path.display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.network.probe_timeout_secs)
    }

    pub fn polite_delay(&self) -> Duration {
        Duration::from_millis(self.batch.polite_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.network.retry_max_attempts,
            initial_backoff: Duration::from_secs(self.network.retry_initial_backoff_secs),
            max_backoff: Duration::from_secs(self.network.retry_max_backoff_secs),
        }
    }

    /// Headers sent to the search/detail APIs and the college page.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        let token = self.source.bearer_token.trim();
        if !token.is_empty() {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }
}

/// Clamps values that would stall or break the pipeline.
pub fn sanitize_config(mut config: Config) -> Config {
    for url in [
        &mut config.source.search_url,
        &mut config.source.detail_url,
        &mut config.source.media_base_url,
        &mut config.source.site_root,
    ] {
        *url = url.trim().trim_end_matches('/').to_string();
    }
    config.source.course_type = config.source.course_type.trim().to_string();
    config
        .scrape
        .gallery_markers
        .retain(|marker| !marker.trim().is_empty());
    config.network.request_timeout_secs = config.network.request_timeout_secs.max(1);
    config.network.probe_timeout_secs = config.network.probe_timeout_secs.max(1);
    config.network.retry_max_attempts = config.network.retry_max_attempts.max(1);
    config.network.retry_max_backoff_secs = config
        .network
        .retry_max_backoff_secs
        .max(config.network.retry_initial_backoff_secs);
    config.batch.concurrency = config.batch.concurrency.clamp(1, 64);
    config
}

fn default_search_url() -> String {
    "https://apis.ambitio.in/api/programs/explore".to_string()
}

fn default_detail_url() -> String {
    "https://dashboard.ambitio.club/api/programs/college".to_string()
}

fn default_media_base_url() -> String {
    "https://ambitio-django-backend-media.s3.amazonaws.com".to_string()
}

fn default_site_root() -> String {
    "https://ambitio.club".to_string()
}

fn default_course_type() -> String {
    "Master".to_string()
}

fn default_max_gallery_images() -> usize {
    8
}

fn default_gallery_markers() -> Vec<String> {
    vec!["gallery-images".to_string(), "university/gallery".to_string()]
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_backoff_secs() -> u64 {
    4
}

fn default_retry_max_backoff_secs() -> u64 {
    10
}

fn default_concurrency() -> usize {
    4
}

fn default_polite_delay_ms() -> u64 {
    1_000
}
