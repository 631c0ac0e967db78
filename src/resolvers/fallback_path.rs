//! Deterministic logo location derived from the entity slug.

use crate::config::Config;
use crate::protocol::ImageCandidate;
use crate::resolvers::candidate_validator::CandidateValidator;

const FALLBACK_LOGO_PATH: &str = "programs/university/logo";

pub struct FallbackPathResolver {
    media_base_url: String,
}

impl FallbackPathResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            media_base_url: config.source.media_base_url.clone(),
        }
    }

    pub fn logo_url(&self, slug: &str) -> String {
        format!("{}/{FALLBACK_LOGO_PATH}/{slug}.jpg", self.media_base_url)
    }

    /// Builds the fallback URL and validates it; no other requests are made.
    pub fn resolve(&self, slug: &str, validator: &CandidateValidator) -> Option<ImageCandidate> {
        if slug.is_empty() {
            return None;
        }
        validator.validate(&self.logo_url(slug))
    }
}
