//! Video acquisition via yt-dlp
//!
//! Searches for a video matching a free-text query and downloads the single
//! best-quality, non-playlist result into a target directory. The downloader
//! itself is an external collaborator; this module shells out to `yt-dlp` and
//! reports the path of the downloaded file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};
use scene_search_common::ProcessingError;

/// Errors specific to video acquisition
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("No results found for the query: {0}")]
    NoResults(String),

    #[error("yt-dlp execution failed: {0}")]
    DownloaderError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AcquisitionError> for ProcessingError {
    fn from(err: AcquisitionError) -> Self {
        match err {
            AcquisitionError::NoResults(q) => ProcessingError::VideoNotFound(q),
            other => ProcessingError::DownloadFailed(other.to_string()),
        }
    }
}

/// Configuration for the downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Format selector passed to yt-dlp (default: best single file)
    pub format: String,
    /// Output filename template (title-based)
    pub output_template: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            format: "best".to_string(),
            output_template: "%(title)s.%(ext)s".to_string(),
        }
    }
}

/// Search for a video matching `query` and download the first result
///
/// # Arguments
/// * `query` - Free-text search term
/// * `output_dir` - Directory the video file is written into
/// * `config` - Downloader options
///
/// # Returns
/// Path of the downloaded file
///
/// # Errors
/// Returns an error if yt-dlp cannot be executed, exits non-zero, or reports
/// no matching video.
pub fn download_video(
    query: &str,
    output_dir: &Path,
    config: &DownloadConfig,
) -> Result<PathBuf, AcquisitionError> {
    std::fs::create_dir_all(output_dir)?;

    info!("Searching for: {}", query);

    // `--print after_move:filepath` makes yt-dlp report the final file path on
    // stdout once the download completes, so no filename guessing is needed.
    let output = Command::new("yt-dlp")
        .arg("--format")
        .arg(&config.format)
        .arg("--no-playlist")
        .arg("--paths")
        .arg(output_dir)
        .arg("--output")
        .arg(&config.output_template)
        .arg("--print")
        .arg("after_move:filepath")
        .arg("--no-simulate")
        .arg(format!("ytsearch1:{query}"))
        .output()
        .map_err(|e| AcquisitionError::DownloaderError(format!("Failed to execute yt-dlp: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("yt-dlp stderr: {}", stderr);
        return Err(AcquisitionError::DownloaderError(format!(
            "yt-dlp exited with {}: {}",
            output.status,
            stderr.lines().last().unwrap_or("no diagnostic output")
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let file_path = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .next_back()
        .map(PathBuf::from)
        .ok_or_else(|| AcquisitionError::NoResults(query.to_string()))?;

    if !file_path.exists() {
        return Err(AcquisitionError::NoResults(query.to_string()));
    }

    info!("Downloaded: {}", file_path.display());
    Ok(file_path)
}
