//! Candidate discovery sources and the image validator they feed.

pub mod candidate_validator;
pub mod crawl_policy;
pub mod fallback_path;
pub mod page_scrape;
pub mod primary_api;

use crate::protocol::ImageCandidate;

/// Orders validated candidates largest first and keeps at most `max` URLs.
///
/// The sort is stable, so equal sizes keep their discovery order.
pub fn rank_candidates(mut candidates: Vec<ImageCandidate>, max: usize) -> Vec<String> {
    candidates.sort_by(|left, right| right.size_bytes.cmp(&left.size_bytes));
    candidates
        .into_iter()
        .take(max)
        .map(|candidate| candidate.url)
        .collect()
}
