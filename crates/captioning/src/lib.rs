//! Scene captioning via a hosted vision-language model
//!
//! The captioning model is an external collaborator: this crate defines the
//! `CaptionModel` capability trait the indexing pipeline consumes and one
//! concrete adapter backed by the Gemini `generateContent` endpoint with the
//! frame image supplied inline as base64.

use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use scene_search_common::ProcessingError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const CAPTION_PROMPT: &str =
    "Describe this video frame in one short sentence. Respond with the caption only.";

/// Errors specific to caption generation
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("GEMINI_API_KEY not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Caption API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("No caption in model response")]
    EmptyResponse,

    #[error("Failed to parse model response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<CaptionError> for ProcessingError {
    fn from(err: CaptionError) -> Self {
        match err {
            CaptionError::MissingApiKey => ProcessingError::ModelInit(err.to_string()),
            other => ProcessingError::ServiceError(other.to_string()),
        }
    }
}

/// Capability interface for captioning one representative frame image
pub trait CaptionModel {
    /// Produce a natural-language caption for the image at `path`
    ///
    /// # Errors
    /// Returns an error if the image cannot be read or the backing model
    /// fails; the indexing pipeline treats this as a per-image failure.
    fn caption(&self, path: &Path) -> Result<String, CaptionError>;
}

// ============== Gemini wire types ==============

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inline_data")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
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
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct ApiError {
    code: u16,
    message: String,
}

/// Caption adapter backed by the Gemini `generateContent` endpoint
pub struct GeminiCaptioner {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiCaptioner {
    /// Create a captioner for `model`, failing fast if the credential is
    /// missing (model initialization failures abort the dependent pipeline)
    ///
    /// # Errors
    /// Returns `MissingApiKey` when `GEMINI_API_KEY` is unset or blank.
    pub fn from_env(model: &str) -> Result<Self, CaptionError> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(CaptionError::MissingApiKey)?;
        Ok(Self::new(api_key, model.to_string(), DEFAULT_BASE_URL.to_string()))
    }

    #[must_use]
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        info!(
            "Caption model initialized: model={}, api_key_len={}",
            model,
            api_key.len()
        );
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

impl CaptionModel for GeminiCaptioner {
    fn caption(&self, path: &Path) -> Result<String, CaptionError> {
        let bytes = std::fs::read(path)?;
        let mime_type = mime_for(path);
        let data = general_purpose::STANDARD.encode(&bytes);

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
                        text: CAPTION_PROMPT.to_string(),
                    },
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data,
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 100,
            },
        };

        debug!("Requesting caption for {}", path.display());

        let response = self.client.post(&url).json(&request).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(CaptionError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| CaptionError::InvalidResponse(format!("{e} - body: {body}")))?;

        if let Some(err) = parsed.error {
            return Err(CaptionError::Api {
                status: err.code,
                message: err.message,
            });
        }

        parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| match p {
                Part::Text { text } => Some(text.trim().to_string()),
                Part::Inline { .. } => None,
            })
            .filter(|t| !t.is_empty())
            .ok_or(CaptionError::EmptyResponse)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for(Path::new("scene-001.jpg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("scene-001.PNG")), "image/png");
        assert_eq!(mime_for(Path::new("scene-001")), "image/jpeg");
    }

    #[test]
    fn test_response_text_extraction() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":" a red car driving \n"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        let text = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| match p {
                Part::Text { text } => Some(text.trim().to_string()),
                Part::Inline { .. } => None,
            })
            .unwrap();
        assert_eq!(text, "a red car driving");
    }

    #[test]
    fn test_missing_key_is_model_init_failure() {
        let err: ProcessingError = CaptionError::MissingApiKey.into();
        assert!(matches!(err, ProcessingError::ModelInit(_)));
    }
}
