//! Writes the run manifest and per-entity records, then downloads the
//! resolved images next to them.
//!
//! Layout under the output root:
//! `<YYYYmmdd_HHMMSS>/master.json`, `<slug>/<slug>.json`, `<slug>/logo.<ext>`
//! and `<slug>/gallery/<n>.<ext>`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::http::{HttpRequest, HttpTransport};
use crate::protocol::{BatchResult, ResolvedAsset};

const MANIFEST_FILE_NAME: &str = "master.json";
const GALLERY_DIR_NAME: &str = "gallery";
const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub failed: usize,
}

impl DownloadSummary {
    fn record(&mut self, success: bool) {
        if success {
            self.downloaded += 1;
        } else {
            self.failed += 1;
        }
    }
}

pub struct AssetPersistence {
    transport: Arc<dyn HttpTransport>,
    download_timeout: Duration,
}

impl AssetPersistence {
    pub fn new(transport: Arc<dyn HttpTransport>, download_timeout: Duration) -> Self {
        Self {
            transport,
            download_timeout,
        }
    }

    pub fn run_dir_name(now: DateTime<Local>) -> String {
        now.format("%Y%m%d_%H%M%S").to_string()
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), String> {
        let serialized = serde_json::to_string_pretty(value)
            .map_err(|err| format!("Failed to serialize {}: {err}", path.display()))?;
        fs::write(path, serialized)
            .map_err(|err| format!("Failed to write {}: {err}", path.display()))
    }

    fn create_dir(path: &Path) -> Result<(), String> {
        fs::create_dir_all(path)
            .map_err(|err| format!("Failed to create {}: {err}", path.display()))
    }

    pub fn detect_image_extension(bytes: &[u8]) -> Option<&'static str> {
        if bytes.len() >= 8 && bytes[0..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A] {
            return Some("png");
        }
        if bytes.len() >= 3 && bytes[0] == 0xFF && bytes[1] == 0xD8 && bytes[2] == 0xFF {
            return Some("jpg");
        }
        if bytes.len() >= 12 && bytes[0..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
            return Some("webp");
        }
        if bytes.len() >= 6 && (&bytes[0..6] == b"GIF87a" || &bytes[0..6] == b"GIF89a") {
            return Some("gif");
        }
        if bytes.len() >= 2 && bytes[0] == b'B' && bytes[1] == b'M' {
            return Some("bmp");
        }
        None
    }

    /// Extension of the last path segment, ignoring query and fragment.
    pub fn extension_from_url(url: &str) -> Option<String> {
        let without_suffix = url.split(['?', '#']).next().unwrap_or_default();
        let path = without_suffix
            .split_once("://")
            .map(|(_, rest)| rest.split_once('/').map(|(_, path)| path).unwrap_or_default())
            .unwrap_or(without_suffix);
        let segment = path.rsplit('/').next().unwrap_or_default();
        let (_, extension) = segment.rsplit_once('.')?;
        let valid = (1..=5).contains(&extension.len())
            && extension.chars().all(|ch| ch.is_ascii_alphanumeric());
        valid.then(|| extension.to_ascii_lowercase())
    }

    fn extension_from_content_type(content_type: Option<&str>) -> Option<&'static str> {
        let mime = content_type?.split(';').next()?.trim().to_ascii_lowercase();
        match mime.as_str() {
            "image/svg+xml" => Some("svg"),
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            _ => None,
        }
    }

    /// Downloads `url` to `<dir>/<stem>.<ext>`.
    fn download_image(&self, url: &str, dir: &Path, stem: &str) -> Result<PathBuf, String> {
        let response = self
            .transport
            .send(&HttpRequest::get(url, self.download_timeout))
            .map_err(|failure| failure.to_string())?
            .error_for_status(url)
            .map_err(|failure| failure.to_string())?;
        if response.body.is_empty() {
            return Err(format!("{url} returned an empty body"));
        }
        let sniffed = Self::detect_image_extension(&response.body);
        let declared = Self::extension_from_content_type(response.content_type.as_deref());
        if sniffed.is_none() && declared.is_none() {
            return Err(format!("{url} did not return an image"));
        }
        let extension = Self::extension_from_url(url)
            .or_else(|| sniffed.or(declared).map(ToOwned::to_owned))
            .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string());
        let path = dir.join(format!("{stem}.{extension}"));
        fs::write(&path, &response.body)
            .map_err(|err| format!("Failed to write {}: {err}", path.display()))?;
        Ok(path)
    }

    /// Creates `<out_root>/<timestamp>` and writes `master.json` into it.
    pub fn write_manifest(
        &self,
        out_root: &Path,
        batch: &BatchResult,
        now: DateTime<Local>,
    ) -> Result<PathBuf, String> {
        let run_dir = out_root.join(Self::run_dir_name(now));
        Self::create_dir(&run_dir)?;
        Self::write_json(&run_dir.join(MANIFEST_FILE_NAME), batch)?;
        Ok(run_dir)
    }

    /// Writes one entity's record and downloads its logo and gallery.
    pub fn persist_asset(
        &self,
        run_dir: &Path,
        asset: &ResolvedAsset,
    ) -> Result<DownloadSummary, String> {
        let entity_dir = run_dir.join(&asset.slug);
        let gallery_dir = entity_dir.join(GALLERY_DIR_NAME);
        Self::create_dir(&gallery_dir)?;
        Self::write_json(&entity_dir.join(format!("{}.json", asset.slug)), asset)?;

        let mut summary = DownloadSummary::default();
        if !asset.logo_url.is_empty() {
            match self.download_image(&asset.logo_url, &entity_dir, "logo") {
                Ok(_) => {
                    info!("Downloaded logo for {}", asset.name);
                    summary.record(true);
                }
                Err(reason) => {
                    warn!("Failed logo download for {}: {}", asset.name, reason);
                    summary.record(false);
                }
            }
        }

        if asset.gallery_urls.is_empty() {
            warn!("No gallery for {}", asset.name);
        }
        for (index, url) in asset.gallery_urls.iter().enumerate() {
            let position = index + 1;
            match self.download_image(url, &gallery_dir, &position.to_string()) {
                Ok(_) => {
                    info!("Downloaded gallery image {} for {}", position, asset.name);
                    summary.record(true);
                }
                Err(reason) => {
                    warn!(
                        "Failed gallery image {} for {}: {}",
                        position, asset.name, reason
                    );
                    summary.record(false);
                }
            }
        }
        Ok(summary)
    }

    /// Writes the manifest and every entity. Per-entity write failures are
    /// logged and do not stop the remaining entities.
    pub fn persist_batch(
        &self,
        out_root: &Path,
        batch: &BatchResult,
        now: DateTime<Local>,
    ) -> Result<(PathBuf, DownloadSummary), String> {
        let run_dir = self.write_manifest(out_root, batch, now)?;
        let mut total = DownloadSummary::default();
        for asset in &batch.assets {
            match self.persist_asset(&run_dir, asset) {
                Ok(summary) => {
                    total.downloaded += summary.downloaded;
                    total.failed += summary.failed;
                }
                Err(reason) => warn!("Failed to persist {}: {}", asset.name, reason),
            }
        }
        Ok((run_dir, total))
    }
}
