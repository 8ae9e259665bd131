//! Scene detection using `FFmpeg`'s scdet filter
//!
//! Detects shot boundaries by running `FFmpeg`'s built-in scdet filter over
//! the video and parsing the per-cut scores it prints, then saves one
//! representative frame per detected scene. The boundary-detection algorithm
//! itself is an external collaborator; this module owns the invocation, the
//! output parsing, and the scene/frame bookkeeping.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};
use scene_search_common::{ProcessingError, Scene, VideoMeta};
use scene_search_frames::FrameGrabber;

/// Errors specific to scene detection
#[derive(Debug, Error)]
pub enum SceneDetectionError {
    #[error("FFmpeg execution failed: {0}")]
    FfmpegError(String),

    #[error("Video file not found: {0}")]
    FileNotFound(String),

    #[error("Frame extraction failed: {0}")]
    FrameError(#[from] scene_search_frames::FrameError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<SceneDetectionError> for ProcessingError {
    fn from(err: SceneDetectionError) -> Self {
        ProcessingError::FFmpegError(err.to_string())
    }
}

/// Configuration for scene detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDetectorConfig {
    /// Scene change detection threshold (0.0-100.0)
    /// Lower values = more sensitive (more scene changes detected)
    pub threshold: f64,

    /// Minimum scene length in frames; cuts closer than this to the previous
    /// boundary are ignored
    pub min_scene_len: u64,
}

impl Default for SceneDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 30.0,
            min_scene_len: 15,
        }
    }
}

/// Detect scene boundaries in a video file
///
/// Runs `FFmpeg` with the scdet filter and turns the reported cut timestamps
/// into an ordered list of scenes covering the whole video.
///
/// # Errors
/// Returns an error if the file does not exist, `FFmpeg` cannot be executed,
/// or the video cannot be probed.
pub fn detect_scenes(
    video_path: &Path,
    config: &SceneDetectorConfig,
) -> Result<Vec<Scene>, SceneDetectionError> {
    if !video_path.exists() {
        return Err(SceneDetectionError::FileNotFound(
            video_path.display().to_string(),
        ));
    }

    let meta = scene_search_frames::probe(video_path)?;

    info!(
        "Running scene detection on {} with threshold {} (min scene length {} frames)",
        video_path.display(),
        config.threshold,
        config.min_scene_len
    );

    // The scdet filter prints scene change scores to stderr:
    // [scdet @ 0x...] lavfi.scd.score: X.XXX, lavfi.scd.time: Y.YYY
    let output = Command::new("ffmpeg")
        .arg("-i")
        .arg(video_path)
        .arg("-vf")
        .arg(format!("scdet=t={}:s=1", config.threshold / 100.0))
        .arg("-an")
        .arg("-f")
        .arg("null")
        .arg("-")
        .output()
        .map_err(|e| SceneDetectionError::FfmpegError(format!("Failed to execute ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("FFmpeg stderr: {}", stderr);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let min_gap = f64::from(config.min_scene_len as u32) / meta.fps.max(1.0);
    let mut cuts: Vec<(f64, f64)> = Vec::new();

    for line in stderr.lines() {
        if !line.contains("lavfi.scd.score") || !line.contains("lavfi.scd.time") {
            continue;
        }
        let Some((score_str, time_str)) = parse_scdet_line(line) else {
            continue;
        };
        match (score_str.parse::<f64>(), time_str.parse::<f64>()) {
            (Ok(score), Ok(timestamp)) => {
                if score < config.threshold {
                    continue;
                }
                if let Some(&(last, _)) = cuts.last() {
                    if timestamp - last < min_gap {
                        debug!(
                            "Skipping cut at {:.2}s (within {} frames of previous)",
                            timestamp, config.min_scene_len
                        );
                        continue;
                    }
                }
                cuts.push((timestamp, score));
            }
            _ => {
                warn!(
                    "Failed to parse score or timestamp: {} | {}",
                    score_str, time_str
                );
            }
        }
    }

    let scenes = scenes_from_cuts(&cuts, meta);
    info!("Detected {} scenes", scenes.len());
    Ok(scenes)
}

/// Build the ordered scene list from cut timestamps and the probed metadata
fn scenes_from_cuts(cuts: &[(f64, f64)], meta: VideoMeta) -> Vec<Scene> {
    let mut scenes = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0.0;
    let mut start_score = 0.0;

    for &(cut, score) in cuts {
        scenes.push(Scene {
            start_time: start,
            end_time: cut,
            start_frame: meta.frame_index(start),
            end_frame: meta.frame_index(cut),
            score: start_score,
        });
        start = cut;
        start_score = score;
    }

    let end = meta.duration.max(start);
    scenes.push(Scene {
        start_time: start,
        end_time: end,
        start_frame: meta.frame_index(start),
        end_frame: meta.frame_index(end),
        score: start_score,
    });

    scenes
}

/// Save one representative frame (the scene midpoint) per scene
///
/// Frames are written as `<stem>-Scene-NNN-01.jpg` in scene order. A frame
/// that fails to decode is logged and skipped; the remaining scenes still get
/// their images.
///
/// # Errors
/// Returns an error only if the video cannot be opened or the output
/// directory cannot be created.
pub fn save_scene_frames(
    video_path: &Path,
    scenes: &[Scene],
    output_dir: &Path,
) -> Result<Vec<PathBuf>, SceneDetectionError> {
    std::fs::create_dir_all(output_dir)?;

    let stem = video_path
        .file_stem()
        .map_or_else(|| "video".to_string(), |s| s.to_string_lossy().to_string());

    let mut grabber = FrameGrabber::open(video_path)?;
    let mut saved = Vec::with_capacity(scenes.len());

    for (i, scene) in scenes.iter().enumerate() {
        let path = output_dir.join(format!("{stem}-Scene-{:03}-01.jpg", i + 1));
        match grabber.save_frame_at(scene.midpoint(), &path) {
            Ok(()) => saved.push(path),
            Err(e) => {
                warn!(
                    "Could not save frame for scene {} at {:.2}s: {}",
                    i + 1,
                    scene.midpoint(),
                    e
                );
            }
        }
    }

    info!("Saved {} scene frames to {}", saved.len(), output_dir.display());
    Ok(saved)
}

/// Parse a line from `FFmpeg` scdet output
/// Format: [scdet @ 0x...] lavfi.scd.score: 1.234, lavfi.scd.time: 5.678
/// Returns (`score_str`, `time_str`) if parsing succeeds
fn parse_scdet_line(line: &str) -> Option<(String, String)> {
    let score_start = line.find("lavfi.scd.score: ")?;
    let score_str_start = score_start + "lavfi.scd.score: ".len();
    let score_end = line[score_str_start..].find(',')?;
    let score_str = &line[score_str_start..score_str_start + score_end];

    let time_start = line.find("lavfi.scd.time: ")?;
    let time_str_start = time_start + "lavfi.scd.time: ".len();
    let time_str = line[time_str_start..].split_whitespace().next()?;

    Some((score_str.to_string(), time_str.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> VideoMeta {
        VideoMeta {
            duration: 60.0,
            fps: 30.0,
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn test_parse_scdet_line() {
        let line = "[scdet @ 0x600003a3bc00] lavfi.scd.score: 4.793, lavfi.scd.time: 7.433333";
        let (score, time) = parse_scdet_line(line).unwrap();
        assert_eq!(score, "4.793");
        assert_eq!(time, "7.433333");
    }

    #[test]
    fn test_parse_scdet_line_with_trailing_text() {
        let line =
            "[scdet @ 0x600003a3bc00] lavfi.scd.score: 1.094, lavfi.scd.time: 8.883333 frame= 123";
        let (score, time) = parse_scdet_line(line).unwrap();
        assert_eq!(score, "1.094");
        assert_eq!(time, "8.883333");
    }

    #[test]
    fn test_scenes_from_no_cuts_covers_whole_video() {
        let scenes = scenes_from_cuts(&[], meta());
        assert_eq!(scenes.len(), 1);
        assert!((scenes[0].start_time - 0.0).abs() < f64::EPSILON);
        assert!((scenes[0].end_time - 60.0).abs() < f64::EPSILON);
        assert_eq!(scenes[0].end_frame, 1800);
    }

    #[test]
    fn test_scenes_from_cuts_are_contiguous() {
        let scenes = scenes_from_cuts(&[(10.0, 35.0), (40.0, 52.0)], meta());
        assert_eq!(scenes.len(), 3);
        assert!((scenes[0].end_time - scenes[1].start_time).abs() < f64::EPSILON);
        assert!((scenes[1].end_time - scenes[2].start_time).abs() < f64::EPSILON);
        assert!((scenes[1].score - 35.0).abs() < f64::EPSILON);
        assert!((scenes[2].end_time - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_config() {
        let config = SceneDetectorConfig::default();
        assert!((config.threshold - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.min_scene_len, 15);
    }
}
