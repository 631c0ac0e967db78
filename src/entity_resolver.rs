//! Per-entity resolution: crawl policy, primary lookup, logo and gallery selection.
//!
//! Each entity walks `RobotsCheck → PrimaryLookup → DetailFetch → LogoResolve →
//! GalleryResolve` strictly in order. Empty outcomes (no match, no logo, no
//! gallery, crawling disallowed) finish normally with empty fields; request
//! failures stop the walk, get logged, and still yield a record built from
//! whatever was resolved before the failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::http::{HttpTransport, RequestFailure};
use crate::protocol::{EntityTask, ResolvedAsset};
use crate::resolvers::candidate_validator::CandidateValidator;
use crate::resolvers::crawl_policy::CrawlPolicy;
use crate::resolvers::fallback_path::FallbackPathResolver;
use crate::resolvers::page_scrape::PageScrapeResolver;
use crate::resolvers::primary_api::{EntityDetail, PrimaryApiResolver};
use crate::resolvers::rank_candidates;

/// Interface the batch scheduler drives; one call per entity.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, task: &EntityTask) -> ResolvedAsset;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStage {
    RobotsCheck,
    PrimaryLookup,
    DetailFetch,
    LogoResolve,
    GalleryResolve,
    Done,
}

#[derive(Debug, Clone)]
struct StageFailure {
    stage: ResolutionStage,
    failure: RequestFailure,
}

impl StageFailure {
    fn at(stage: ResolutionStage) -> impl FnOnce(RequestFailure) -> Self {
        move |failure| Self { stage, failure }
    }
}

/// Fields accumulated while walking the stages.
struct AssetDraft {
    task: EntityTask,
    scraped_at: DateTime<Utc>,
    display_name: Option<String>,
    logo_url: String,
    gallery_urls: Vec<String>,
}

impl AssetDraft {
    fn new(task: &EntityTask) -> Self {
        Self {
            task: task.clone(),
            scraped_at: Utc::now(),
            display_name: None,
            logo_url: String::new(),
            gallery_urls: Vec::new(),
        }
    }

    fn finish(self) -> ResolvedAsset {
        let mut asset = ResolvedAsset::empty(&self.task, self.scraped_at);
        if let Some(display_name) = self.display_name {
            asset.name = display_name;
        }
        asset.logo_url = self.logo_url;
        asset.gallery_urls = self.gallery_urls;
        asset
    }
}

/// Production resolver chaining the primary API, the fallback logo path and
/// the page scrape behind one candidate validator.
pub struct EntityResolver {
    validator: CandidateValidator,
    crawl_policy: CrawlPolicy,
    primary: PrimaryApiResolver,
    fallback: FallbackPathResolver,
    page_scrape: PageScrapeResolver,
    max_gallery_images: usize,
}

impl EntityResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            validator: CandidateValidator::new(transport.clone(), config.probe_timeout()),
            crawl_policy: CrawlPolicy::new(transport.clone(), config),
            primary: PrimaryApiResolver::new(transport.clone(), config),
            fallback: FallbackPathResolver::new(config),
            page_scrape: PageScrapeResolver::new(transport, config),
            max_gallery_images: config.scrape.max_gallery_images,
        }
    }

    fn enter(task: &EntityTask, stage: ResolutionStage) {
        debug!("Resolve[{}]: {:?}", task.slug, stage);
    }

    fn resolve_logo(&self, task: &EntityTask, detail: &EntityDetail) -> String {
        if let Some(primary_logo) = self.primary.logo_url(detail) {
            if let Some(candidate) = self.validator.validate(&primary_logo) {
                return candidate.url;
            }
            info!(
                "Resolve[{}]: primary logo {} rejected, trying fallback path",
                task.slug, primary_logo
            );
        }
        self.fallback
            .resolve(&task.slug, &self.validator)
            .map(|candidate| candidate.url)
            .unwrap_or_default()
    }

    fn run_stages(&self, draft: &mut AssetDraft) -> Result<ResolutionStage, StageFailure> {
        let task = draft.task.clone();

        Self::enter(&task, ResolutionStage::RobotsCheck);
        let permission = self.crawl_policy.check();
        if !permission.permits_requests() {
            warn!("Robots.txt disallows for {}", task.name);
            return Ok(ResolutionStage::Done);
        }

        Self::enter(&task, ResolutionStage::PrimaryLookup);
        let Some(id) = self
            .primary
            .search(&task.name)
            .map_err(StageFailure::at(ResolutionStage::PrimaryLookup))?
        else {
            warn!("No data for {}", task.name);
            return Ok(ResolutionStage::Done);
        };

        Self::enter(&task, ResolutionStage::DetailFetch);
        let detail = self
            .primary
            .fetch_detail(&id)
            .map_err(StageFailure::at(ResolutionStage::DetailFetch))?;
        draft.display_name = detail.display_name.clone();

        Self::enter(&task, ResolutionStage::LogoResolve);
        draft.logo_url = self.resolve_logo(&task, &detail);
        if draft.logo_url.is_empty() {
            warn!("No logo for {}", task.name);
        }

        Self::enter(&task, ResolutionStage::GalleryResolve);
        if self.max_gallery_images == 0 {
            return Ok(ResolutionStage::Done);
        }
        draft.gallery_urls = rank_candidates(
            self.validator.validate_all(&detail.gallery_urls),
            self.max_gallery_images,
        );
        if draft.gallery_urls.is_empty() {
            info!(
                "Resolve[{}]: no structured gallery, scraping college page",
                task.slug
            );
            let scraped = self
                .page_scrape
                .scrape(&task.slug, permission, &self.validator)
                .map_err(StageFailure::at(ResolutionStage::GalleryResolve))?;
            draft.gallery_urls = rank_candidates(scraped, self.max_gallery_images);
        }
        if draft.gallery_urls.is_empty() {
            warn!("No gallery images found for {}", task.name);
        }

        Ok(ResolutionStage::Done)
    }
}

impl AssetResolver for EntityResolver {
    fn resolve(&self, task: &EntityTask) -> ResolvedAsset {
        let mut draft = AssetDraft::new(task);
        match self.run_stages(&mut draft) {
            Ok(stage) => Self::enter(task, stage),
            Err(StageFailure { stage, failure }) => {
                error!("Error for {} during {:?}: {}", task.name, stage, failure);
            }
        }
        draft.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{AssetResolver, EntityResolver};
    use crate::config::Config;
    use crate::http::scripted_transport::{self, image_head, ScriptedTransport};
    use crate::http::HttpMethod;
    use crate::protocol::EntityTask;

    const SEARCH: &str = "https://api.test/search";
    const DETAIL: &str = "https://api.test/detail";
    const ROBOTS: &str = "https://site.test/robots.txt";

    fn test_config() -> Config {
        let mut config = Config::default();
        config.source.search_url = SEARCH.to_string();
        config.source.detail_url = DETAIL.to_string();
        config.source.media_base_url = "https://media.test".to_string();
        config.source.site_root = "https://site.test".to_string();
        config.network.retry_initial_backoff_secs = 0;
        config.network.retry_max_backoff_secs = 0;
        config.scrape.max_gallery_images = 2;
        config
    }

    fn script_match(transport: &ScriptedTransport, university: serde_json::Value) {
        transport.route(
            HttpMethod::Get,
            SEARCH,
            scripted_transport::json(json!({"data": {"results": [{"id": 7}]}})),
        );
        transport.route(
            HttpMethod::Put,
            DETAIL,
            scripted_transport::json(json!({"data": {"university": university}})),
        );
    }

    #[test]
    fn test_resolve_ranks_gallery_and_keeps_primary_logo() {
        let transport = Arc::new(ScriptedTransport::new());
        script_match(
            &transport,
            json!({
                "name": "Rice University",
                "logo": "programs/university/logo/rice.png",
                "galleryImages": [
                    "https://cdn.test/a.jpg",
                    "https://cdn.test/b.jpg",
                    "https://cdn.test/c.jpg"
                ]
            }),
        );
        transport.route(
            HttpMethod::Head,
            "https://media.test/programs/university/logo/rice.png",
            image_head("image/png", 800),
        );
        transport.route(HttpMethod::Head, "https://cdn.test/a.jpg", image_head("image/jpeg", 5000));
        transport.route(HttpMethod::Head, "https://cdn.test/b.jpg", image_head("image/jpeg", 9000));
        transport.route(HttpMethod::Head, "https://cdn.test/c.jpg", image_head("image/jpeg", 1000));

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("rice university"));

        assert_eq!(asset.name, "Rice University");
        assert_eq!(asset.slug, "rice-university");
        assert_eq!(
            asset.logo_url,
            "https://media.test/programs/university/logo/rice.png"
        );
        assert_eq!(
            asset.gallery_urls,
            vec!["https://cdn.test/b.jpg", "https://cdn.test/a.jpg"]
        );
        assert_eq!(
            transport.count_prefix(HttpMethod::Get, "https://site.test/college/"),
            0
        );
    }

    #[test]
    fn test_rejected_primary_logo_falls_back_to_slug_path() {
        let transport = Arc::new(ScriptedTransport::new());
        script_match(
            &transport,
            json!({"name": "Rice University", "logo": "https://media.test/broken.png"}),
        );
        transport.route(
            HttpMethod::Head,
            "https://media.test/broken.png",
            Ok(scripted_transport::status(404)),
        );
        transport.route(
            HttpMethod::Head,
            "https://media.test/programs/university/logo/rice-university.jpg",
            image_head("image/jpeg", 4096),
        );

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Rice University"));

        assert_eq!(
            asset.logo_url,
            "https://media.test/programs/university/logo/rice-university.jpg"
        );
    }

    #[test]
    fn test_missing_logo_path_uses_fallback_and_empty_when_both_fail() {
        let transport = Arc::new(ScriptedTransport::new());
        script_match(&transport, json!({"name": "Rice University"}));

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Rice University"));

        assert!(asset.logo_url.is_empty());
        assert_eq!(
            transport.count(
                HttpMethod::Head,
                "https://media.test/programs/university/logo/rice-university.jpg"
            ),
            1
        );
    }

    #[test]
    fn test_disallowed_robots_short_circuits_with_empty_record() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            HttpMethod::Get,
            ROBOTS,
            scripted_transport::text("User-agent: *\nDisallow: /\n"),
        );
        script_match(
            &transport,
            json!({"name": "Rice University", "galleryImages": ["https://cdn.test/a.jpg"]}),
        );

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Rice University"));

        assert_eq!(asset.name, "Rice University");
        assert!(asset.logo_url.is_empty());
        assert!(asset.gallery_urls.is_empty());
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(
            transport.count_prefix(HttpMethod::Get, "https://site.test/college/"),
            0
        );
    }

    #[test]
    fn test_ignore_robots_skips_policy_document() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            HttpMethod::Get,
            ROBOTS,
            scripted_transport::text("User-agent: *\nDisallow: /\n"),
        );
        script_match(&transport, json!({"name": "Rice University"}));
        let mut config = test_config();
        config.scrape.ignore_robots = true;

        let asset = EntityResolver::new(transport.clone(), &config)
            .resolve(&EntityTask::new("Rice University"));

        assert_eq!(asset.name, "Rice University");
        assert_eq!(transport.count(HttpMethod::Get, ROBOTS), 0);
        assert_eq!(transport.count(HttpMethod::Put, DETAIL), 1);
    }

    #[test]
    fn test_no_search_match_yields_empty_record_without_detail_call() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            HttpMethod::Get,
            SEARCH,
            scripted_transport::json(json!({"data": {"results": []}})),
        );

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Unknown College"));

        assert_eq!(asset.name, "Unknown College");
        assert!(asset.logo_url.is_empty());
        assert!(asset.gallery_urls.is_empty());
        assert_eq!(transport.count(HttpMethod::Put, DETAIL), 0);
    }

    #[test]
    fn test_fatal_detail_error_returns_partial_record_with_input_name() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(
            HttpMethod::Get,
            SEARCH,
            scripted_transport::json(json!({"data": {"results": [{"id": 7}]}})),
        );
        transport.route(HttpMethod::Put, DETAIL, Ok(scripted_transport::status(400)));

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Rice University"));

        assert_eq!(asset.name, "Rice University");
        assert_eq!(asset.slug, "rice-university");
        assert!(asset.logo_url.is_empty());
        assert!(asset.gallery_urls.is_empty());
        assert_eq!(transport.count(HttpMethod::Put, DETAIL), 1);
    }

    #[test]
    fn test_exhausted_search_retries_still_produce_record() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(HttpMethod::Get, SEARCH, Ok(scripted_transport::status(503)));

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Rice University"));

        assert_eq!(asset.name, "Rice University");
        assert_eq!(transport.count(HttpMethod::Get, SEARCH), 3);
    }

    #[test]
    fn test_empty_structured_gallery_falls_back_to_page_scrape() {
        let transport = Arc::new(ScriptedTransport::new());
        script_match(
            &transport,
            json!({"name": "Rice University", "galleryImages": ["https://cdn.test/dead.jpg"]}),
        );
        transport.route(
            HttpMethod::Get,
            "https://site.test/college/rice-university",
            scripted_transport::html(
                r#"<img src="//cdn.test/gallery-images/small.jpg">
                   <img src="/media/university/gallery/large.jpg">
                   <img src="/media/university/gallery/html.jpg">"#,
            ),
        );
        transport.route(
            HttpMethod::Head,
            "https://cdn.test/gallery-images/small.jpg",
            image_head("image/jpeg", 100),
        );
        transport.route(
            HttpMethod::Head,
            "https://site.test/media/university/gallery/large.jpg",
            image_head("image/jpeg", 900),
        );
        transport.route(
            HttpMethod::Head,
            "https://site.test/media/university/gallery/html.jpg",
            image_head("text/html", 900),
        );

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Rice University"));

        assert_eq!(
            asset.gallery_urls,
            vec![
                "https://site.test/media/university/gallery/large.jpg",
                "https://cdn.test/gallery-images/small.jpg"
            ]
        );
    }

    #[test]
    fn test_page_fetch_failure_keeps_resolved_logo() {
        let transport = Arc::new(ScriptedTransport::new());
        script_match(
            &transport,
            json!({"name": "Rice University", "logo": "https://media.test/logo.png"}),
        );
        transport.route(
            HttpMethod::Head,
            "https://media.test/logo.png",
            image_head("image/png", 10),
        );
        transport.route(
            HttpMethod::Get,
            "https://site.test/college/rice-university",
            Err(crate::http::RequestFailure::new(
                crate::http::HttpFailureKind::Connection,
                "connection reset",
            )),
        );

        let asset = EntityResolver::new(transport.clone(), &test_config())
            .resolve(&EntityTask::new("Rice University"));

        assert_eq!(asset.logo_url, "https://media.test/logo.png");
        assert!(asset.gallery_urls.is_empty());
    }
}
