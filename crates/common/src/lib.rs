//! Common types and utilities for the scene-search pipelines

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processing errors shared across pipeline crates
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Basic stream-level facts about a video file
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoMeta {
    /// Total duration in seconds
    pub duration: f64,
    /// Average frame rate
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoMeta {
    /// Convert a second offset into a frame index at this video's frame rate
    #[must_use]
    pub fn frame_index(&self, seconds: f64) -> u64 {
        (seconds * self.fps) as u64
    }
}

/// A detected scene: the contiguous segment between two shot boundaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Start time of the scene in seconds
    pub start_time: f64,
    /// End time of the scene in seconds
    pub end_time: f64,
    pub start_frame: u64,
    pub end_frame: u64,
    /// Boundary score at the cut that opened this scene (0.0 for the first)
    pub score: f64,
}

impl Scene {
    /// Midpoint of the scene, used when picking a representative frame
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        (self.start_time + self.end_time) / 2.0
    }
}

/// A `[start, end]` second-offset pair identifying a video segment of interest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Basic sanity: non-negative and not inverted
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.start >= 0.0 && self.end >= 0.0 && self.start <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index() {
        let meta = VideoMeta {
            duration: 10.0,
            fps: 30.0,
            width: 1920,
            height: 1080,
        };
        assert_eq!(meta.frame_index(2.0), 60);
        assert_eq!(meta.frame_index(0.0), 0);
    }

    #[test]
    fn test_scene_midpoint() {
        let scene = Scene {
            start_time: 4.0,
            end_time: 10.0,
            start_frame: 120,
            end_frame: 300,
            score: 12.5,
        };
        assert!((scene.midpoint() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_time_range_validity() {
        assert!(TimeRange { start: 3.0, end: 8.0 }.is_valid());
        assert!(TimeRange { start: 2.0, end: 2.0 }.is_valid());
        assert!(!TimeRange { start: 5.0, end: 2.0 }.is_valid());
        assert!(!TimeRange { start: -1.0, end: 10.0 }.is_valid());
    }
}
