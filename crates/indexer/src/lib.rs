//! Scene indexing pipeline and fuzzy retrieval
//!
//! Orchestrates download, scene detection, representative-frame saving, and
//! captioning into a single persisted Scene Store, then answers fuzzy text
//! queries against it. The store file doubles as the idempotency guard: if it
//! already exists the whole pipeline short-circuits, so re-running never
//! repeats the download or any captioning work.
//!
//! # Example
//! ```no_run
//! use scene_search_indexer::{build_index, find_matches, IndexConfig};
//! use scene_search_captioning::GeminiCaptioner;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = GeminiCaptioner::from_env("gemini-1.5-pro")?;
//! let store = build_index(
//!     &model,
//!     "super mario movie trailer",
//!     Path::new("scene_images"),
//!     Path::new("scene_captions.json"),
//!     &IndexConfig::default(),
//! )?;
//! let matches = find_matches("car", &store, 70.0);
//! # Ok(())
//! # }
//! ```

mod fuzzy;
mod store;

pub use fuzzy::{caption_vocabulary, find_matches, partial_ratio, DEFAULT_THRESHOLD};
pub use store::SceneStore;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use scene_search_acquisition::{download_video, AcquisitionError, DownloadConfig};
use scene_search_captioning::CaptionModel;
use scene_search_common::ProcessingError;
use scene_search_scenes::{detect_scenes, save_scene_frames, SceneDetectionError, SceneDetectorConfig};

/// Errors specific to index building
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Scene detection failed: {0}")]
    Detection(#[from] SceneDetectionError),

    #[error("Scene store is malformed: {0}")]
    MalformedStore(String),

    #[error("No scene images found in {0}")]
    NoSceneImages(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<IndexerError> for ProcessingError {
    fn from(err: IndexerError) -> Self {
        match err {
            IndexerError::Acquisition(e) => e.into(),
            IndexerError::Detection(e) => e.into(),
            other => ProcessingError::Other(other.to_string()),
        }
    }
}

/// Configuration for the indexing pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Downloader options for acquiring the source video
    pub download: DownloadConfig,
    /// Shot-boundary detection options
    pub detector: SceneDetectorConfig,
    /// Directory the source video is downloaded into
    pub video_output_dir: PathBuf,
}

/// Build the scene index for a video located by `query`
///
/// If `store_path` already exists the pipeline is a no-op and returns it
/// untouched. This is an at-most-once-per-destination policy, not a freshness
/// check: a changed query does not invalidate an existing store.
///
/// Otherwise the pipeline downloads the video, detects scenes, saves one
/// representative frame per scene into `scene_image_dir`, captions every
/// image in that directory, and writes the accumulated mapping to
/// `store_path` in one shot. Captioning failures for individual images are
/// logged and skipped; everything earlier in the pipeline is fatal and leaves
/// no partial store behind.
///
/// # Errors
/// Returns an error on acquisition, detection, or store-write failure.
pub fn build_index(
    model: &dyn CaptionModel,
    query: &str,
    scene_image_dir: &Path,
    store_path: &Path,
    config: &IndexConfig,
) -> Result<PathBuf, IndexerError> {
    if store_path.exists() {
        info!(
            "Scene store {} already exists, skipping indexing",
            store_path.display()
        );
        return Ok(store_path.to_path_buf());
    }

    let video_dir = if config.video_output_dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        config.video_output_dir.as_path()
    };
    let video_path = download_video(query, video_dir, &config.download)?;

    let scenes = detect_scenes(&video_path, &config.detector)?;
    save_scene_frames(&video_path, &scenes, scene_image_dir)?;

    let store = caption_scene_directory(model, scene_image_dir)?;
    store.save(store_path)?;

    Ok(store_path.to_path_buf())
}

/// Caption every scene image in a directory into an in-memory store
///
/// Images are visited in sorted order; a caption failure for one image is
/// logged and skipped so one bad frame cannot abort the batch.
///
/// # Errors
/// Returns an error if the directory cannot be listed or holds no images.
pub fn caption_scene_directory(
    model: &dyn CaptionModel,
    scene_image_dir: &Path,
) -> Result<SceneStore, IndexerError> {
    let images = list_scene_images(scene_image_dir)?;
    if images.is_empty() {
        return Err(IndexerError::NoSceneImages(
            scene_image_dir.display().to_string(),
        ));
    }

    let mut store = SceneStore::new();
    for image_path in &images {
        match model.caption(image_path) {
            Ok(caption) => {
                info!("Processed scene {}", image_path.display());
                store.insert(image_path.display().to_string(), caption);
            }
            Err(e) => {
                warn!("Error processing {}: {}", image_path.display(), e);
            }
        }
    }

    info!(
        "Captioned {}/{} scene images",
        store.len(),
        images.len()
    );
    Ok(store)
}

/// List `.jpg`/`.png` files in a directory, sorted by path
fn list_scene_images(dir: &Path) -> Result<Vec<PathBuf>, IndexerError> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| {
                    ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("png")
                })
        })
        .collect();
    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_scene_images_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b.jpg", "a.png", "c.txt", "d.JPG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let images = list_scene_images(dir.path()).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg", "d.JPG"]);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        struct Never;
        impl CaptionModel for Never {
            fn caption(
                &self,
                _: &Path,
            ) -> Result<String, scene_search_captioning::CaptionError> {
                unreachable!("no images to caption")
            }
        }
        let err = caption_scene_directory(&Never, dir.path()).unwrap_err();
        assert!(matches!(err, IndexerError::NoSceneImages(_)));
    }
}
