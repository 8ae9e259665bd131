//! Generative video-understanding query path
//!
//! Uploads the video to the Gemini Files API, waits for the asset to become
//! active, asks the model for the time ranges that match a user query, and
//! samples frames out of the surviving ranges for collage assembly.
//!
//! The service is constrained to answer with a bare JSON array of
//! `[start, end]` second pairs; any markdown fencing is stripped before
//! parsing. A response that still fails to parse is fatal for the query, while
//! individual ranges that fail basic sanity (malformed shape, negative,
//! inverted) are dropped with a warning.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use scene_search_common::{ProcessingError, TimeRange};
use scene_search_frames::FrameGrabber;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Errors specific to the video-query engine
#[derive(Debug, Error)]
pub enum VideoQueryError {
    #[error("GEMINI_API_KEY not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Video analysis API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Uploaded file entered FAILED state")]
    ProcessingFailed,

    #[error("File did not become active after {0} retries")]
    ActivationTimeout(u32),

    #[error("Sampling period must be positive, got {0}")]
    InvalidSamplePeriod(f64),

    #[error("Could not parse time ranges from response: {0}")]
    InvalidResponse(String),

    #[error("Frame extraction failed: {0}")]
    Frame(#[from] scene_search_frames::FrameError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<VideoQueryError> for ProcessingError {
    fn from(err: VideoQueryError) -> Self {
        match err {
            VideoQueryError::MissingApiKey => ProcessingError::ModelInit(err.to_string()),
            VideoQueryError::ActivationTimeout(_) => {
                ProcessingError::Timeout("file activation".to_string())
            }
            VideoQueryError::InvalidResponse(m) => ProcessingError::InvalidResponse(m),
            VideoQueryError::InvalidSamplePeriod(_) => ProcessingError::Other(err.to_string()),
            other => ProcessingError::ServiceError(other.to_string()),
        }
    }
}

/// Processing state of an uploaded file asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Processing,
    Active,
    Failed,
}

impl FileState {
    fn from_service(state: &str) -> Self {
        match state {
            "ACTIVE" => FileState::Active,
            "FAILED" => FileState::Failed,
            _ => FileState::Processing,
        }
    }
}

/// Configuration for the video-query engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoQueryConfig {
    /// Maximum activation-poll attempts before giving up
    pub poll_max_retries: u32,
    /// Fixed sleep between activation polls, in seconds
    pub poll_interval_secs: u64,
    /// Sampling period for frame extraction, in seconds
    pub sample_period: f64,
    /// Directory extracted frames are written into
    pub extracted_dir: PathBuf,
}

impl Default for VideoQueryConfig {
    fn default() -> Self {
        Self {
            poll_max_retries: 10,
            poll_interval_secs: 15,
            sample_period: 3.0,
            extracted_dir: PathBuf::from("extracted_images"),
        }
    }
}

// ============== Wire types ==============

#[derive(Deserialize)]
struct UploadResponse {
    file: FileInfo,
}

#[derive(Deserialize)]
struct FileInfo {
    name: String,
    uri: String,
    state: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "file_data")]
        file_data: FileData,
    },
}

#[derive(Serialize)]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Client for the Gemini Files + generateContent endpoints
pub struct GeminiVideoClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiVideoClient {
    /// Create a client, failing fast on a missing credential
    ///
    /// # Errors
    /// Returns `MissingApiKey` when `GEMINI_API_KEY` is unset or blank.
    pub fn from_env(model: &str) -> Result<Self, VideoQueryError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(VideoQueryError::MissingApiKey)?;
        Ok(Self::new(api_key, model.to_string(), DEFAULT_BASE_URL.to_string()))
    }

    #[must_use]
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    /// Upload the video bytes to the Files API
    fn upload_video(&self, video_path: &Path) -> Result<FileInfo, VideoQueryError> {
        let bytes = std::fs::read(video_path)?;
        info!(
            "Uploading {} ({} bytes) for analysis",
            video_path.display(),
            bytes.len()
        );

        let url = format!(
            "{}/upload/v1beta/files?key={}&uploadType=media",
            self.base_url.trim_end_matches('/'),
            self.api_key
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(VideoQueryError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| VideoQueryError::InvalidResponse(format!("upload response: {e}")))?;
        info!("Uploaded as {}", parsed.file.name);
        Ok(parsed.file)
    }

    /// Fetch the current processing state of an uploaded file
    fn get_file(&self, name: &str) -> Result<FileInfo, VideoQueryError> {
        let url = format!(
            "{}/v1beta/{}?key={}",
            self.base_url.trim_end_matches('/'),
            name,
            self.api_key
        );
        let response = self.client.get(&url).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(VideoQueryError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| VideoQueryError::InvalidResponse(format!("file state response: {e}")))
    }

    /// Poll until the uploaded file is active, with bounded retries and a
    /// fixed backoff interval
    fn wait_until_active(
        &self,
        mut file: FileInfo,
        config: &VideoQueryConfig,
    ) -> Result<FileInfo, VideoQueryError> {
        let mut retries = 0;
        loop {
            match FileState::from_service(&file.state) {
                FileState::Active => return Ok(file),
                FileState::Failed => return Err(VideoQueryError::ProcessingFailed),
                FileState::Processing => {
                    if retries >= config.poll_max_retries {
                        return Err(VideoQueryError::ActivationTimeout(config.poll_max_retries));
                    }
                    info!(
                        "Waiting for file to become ACTIVE (state: {}). Retry {}/{}",
                        file.state,
                        retries + 1,
                        config.poll_max_retries
                    );
                    std::thread::sleep(Duration::from_secs(config.poll_interval_secs));
                    file = self.get_file(&file.name)?;
                    retries += 1;
                }
            }
        }
    }

    /// Ask the model for the time ranges matching `user_text`
    fn generate_ranges(
        &self,
        user_text: &str,
        duration: f64,
        file_uri: &str,
    ) -> Result<String, VideoQueryError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model.trim_start_matches("models/"),
            self.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: build_prompt(user_text, duration),
                    },
                    Part::File {
                        file_data: FileData {
                            mime_type: "video/mp4".to_string(),
                            file_uri: file_uri.to_string(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 400,
            },
        };

        let response = self.client.post(&url).json(&request).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(VideoQueryError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| VideoQueryError::InvalidResponse(format!("analysis response: {e}")))?;

        parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| {
                VideoQueryError::InvalidResponse("empty response from the API".to_string())
            })
    }
}

/// Run the full video-model query path: upload, activate, ask, validate
///
/// # Errors
/// Fatal on upload/poll/parse failure; only individual malformed ranges are
/// dropped without error.
pub fn query_video(
    client: &GeminiVideoClient,
    user_text: &str,
    video_path: &Path,
    config: &VideoQueryConfig,
) -> Result<Vec<TimeRange>, VideoQueryError> {
    let meta = scene_search_frames::probe(video_path)?;

    let uploaded = client.upload_video(video_path)?;
    let active = client.wait_until_active(uploaded, config)?;

    let raw = client.generate_ranges(user_text, meta.duration, &active.uri)?;
    debug!("Raw analysis response: {}", raw);

    let ranges = parse_time_ranges(&raw)?;
    Ok(filter_ranges(&ranges, meta.duration))
}

/// Build the analysis instruction around the user's text and video duration
fn build_prompt(user_text: &str, duration: f64) -> String {
    format!(
        "You are a video search engine. Analyze the given video and identify the best scenes \
         matching the user input in this video.\n\
         Provide the results ONLY in the following JSON format with no explanation at all:\n\
         [\n    [start1, end1],\n    [start2, end2],\n    [start3, end3]\n]\n\
         Where 'start' and 'end' are numbers representing seconds in the video.\n\
         Make sure:\n\
         1. Start and end times are in ascending order.\n\
         2. Time ranges do not overlap.\n\
         3. Start and end times are within the video duration ({duration} seconds).\n\
         User input: {user_text}"
    )
}

/// Strip any markdown code fencing the service wrapped around the JSON
fn strip_code_fences(text: &str) -> String {
    text.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse the service response into time ranges
///
/// The response as a whole must be a JSON array; that failing is fatal for
/// the query. Individual elements that are not two-number arrays are dropped
/// with a warning.
pub fn parse_time_ranges(text: &str) -> Result<Vec<TimeRange>, VideoQueryError> {
    let cleaned = strip_code_fences(text);
    let values: Vec<serde_json::Value> = serde_json::from_str(&cleaned)
        .map_err(|e| VideoQueryError::InvalidResponse(format!("{e}: {cleaned}")))?;

    let mut ranges = Vec::with_capacity(values.len());
    for value in values {
        let Some(pair) = value.as_array() else {
            warn!("Dropping non-array range element: {}", value);
            continue;
        };
        if pair.len() != 2 {
            warn!("Dropping malformed range element: {}", value);
            continue;
        }
        match (pair[0].as_f64(), pair[1].as_f64()) {
            (Some(start), Some(end)) => ranges.push(TimeRange { start, end }),
            _ => warn!("Dropping non-numeric range element: {}", value),
        }
    }
    Ok(ranges)
}

/// Drop ranges failing basic sanity and clamp the rest to the video duration
#[must_use]
pub fn filter_ranges(ranges: &[TimeRange], duration: f64) -> Vec<TimeRange> {
    ranges
        .iter()
        .filter(|r| {
            if !r.is_valid() || r.start > duration {
                warn!("Dropping invalid time range [{}, {}]", r.start, r.end);
                return false;
            }
            true
        })
        .map(|r| TimeRange {
            start: r.start,
            end: r.end.min(duration),
        })
        .collect()
}

/// Sample frames out of the matched ranges at a fixed period
///
/// Each surviving range is walked from `start` to `end` inclusive in
/// `sample_period` steps; each sampled frame is saved as
/// `frame_<seconds>s.jpg`. Individual frame failures are logged and skipped.
///
/// # Errors
/// Returns an error if the sampling period is not positive, the video cannot
/// be opened, or the output directory cannot be created.
pub fn extract_frames(
    ranges: &[TimeRange],
    video_path: &Path,
    config: &VideoQueryConfig,
) -> Result<Vec<PathBuf>, VideoQueryError> {
    // A zero or negative step would never advance past range.end.
    if config.sample_period <= 0.0 {
        return Err(VideoQueryError::InvalidSamplePeriod(config.sample_period));
    }

    std::fs::create_dir_all(&config.extracted_dir)?;

    let mut grabber = FrameGrabber::open(video_path)?;
    let mut extracted = Vec::new();

    for range in ranges {
        let mut t = range.start.floor();
        while t <= range.end + 1e-9 {
            let path = config
                .extracted_dir
                .join(format!("frame_{}s.jpg", t as u64));
            match grabber.save_frame_at(t, &path) {
                Ok(()) => extracted.push(path),
                Err(e) => warn!("Could not extract frame at {} seconds: {}", t, e),
            }
            t += config.sample_period;
        }
    }

    info!(
        "Extracted {} frames to {}",
        extracted.len(),
        config.extracted_dir.display()
    );
    Ok(extracted)
}
