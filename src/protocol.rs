//! Records exchanged between the resolvers, the batch scheduler and persistence.

use chrono::{DateTime, Utc};

use crate::slug::slugify;

/// A URL that passed the image probe, with its declared byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub size_bytes: u64,
}

/// One entity queued for resolution. Equality of entities is equality of slugs.
#[derive(Debug, Clone)]
pub struct EntityTask {
    pub name: String,
    pub slug: String,
}

impl EntityTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            slug: slugify(name),
        }
    }
}

impl PartialEq for EntityTask {
    fn eq(&self, other: &Self) -> bool {
        self.slug == other.slug
    }
}

impl Eq for EntityTask {}

impl std::hash::Hash for EntityTask {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slug.hash(state);
    }
}

/// Final per-entity record. Produced once by the entity resolver.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResolvedAsset {
    pub name: String,
    pub slug: String,
    pub logo_url: String,
    pub gallery_urls: Vec<String>,
    pub scraped_at: DateTime<Utc>,
}

impl ResolvedAsset {
    /// A valid record with nothing resolved.
    pub fn empty(task: &EntityTask, scraped_at: DateTime<Utc>) -> Self {
        Self {
            name: task.name.clone(),
            slug: task.slug.clone(),
            logo_url: String::new(),
            gallery_urls: Vec::new(),
            scraped_at,
        }
    }
}

/// What a worker reports back for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Resolved(ResolvedAsset),
    Lost { task: EntityTask, reason: String },
}

/// Manifest of one run, assets ordered by slug.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BatchResult {
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "total_universities")]
    pub total_resolved: usize,
    #[serde(rename = "universities")]
    pub assets: Vec<ResolvedAsset>,
}

impl BatchResult {
    pub fn from_assets(mut assets: Vec<ResolvedAsset>, generated_at: DateTime<Utc>) -> Self {
        assets.sort_by(|left, right| left.slug.cmp(&right.slug));
        Self {
            generated_at,
            total_resolved: assets.len(),
            assets,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{BatchResult, EntityTask, ResolvedAsset};

    #[test]
    fn test_batch_result_sorts_assets_by_slug_and_counts_them() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let assets = vec![
            ResolvedAsset::empty(&EntityTask::new("Yale University"), at),
            ResolvedAsset::empty(&EntityTask::new("Aalto University"), at),
            ResolvedAsset::empty(&EntityTask::new("McGill University"), at),
        ];

        let batch = BatchResult::from_assets(assets, at);
        let slugs: Vec<&str> = batch.assets.iter().map(|asset| asset.slug.as_str()).collect();
        assert_eq!(
            slugs,
            vec!["aalto-university", "mcgill-university", "yale-university"]
        );
        assert_eq!(batch.total_resolved, 3);
    }

    #[test]
    fn test_entity_tasks_with_same_slug_are_equal() {
        assert_eq!(
            EntityTask::new("King's College London"),
            EntityTask::new("Kings College London")
        );
        assert_ne!(
            EntityTask::new("Rice University"),
            EntityTask::new("Duke University")
        );
    }

    #[test]
    fn test_manifest_serializes_with_public_field_names() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let batch = BatchResult::from_assets(
            vec![ResolvedAsset::empty(&EntityTask::new("Rice University"), at)],
            at,
        );

        let value = serde_json::to_value(&batch).expect("manifest should serialize");
        assert_eq!(value["total_universities"], 1);
        assert_eq!(value["universities"][0]["slug"], "rice-university");
        assert_eq!(value["universities"][0]["logo_url"], "");
        assert!(value["universities"][0]["gallery_urls"]
            .as_array()
            .is_some_and(Vec::is_empty));
        assert_eq!(value["generated_at"], "2026-01-02T03:04:05Z");
    }
}
