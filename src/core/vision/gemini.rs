//! Gemini `generateContent` client for obstacle analysis.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use zeroize::Zeroize;

use super::types::{DetectionResult, ObstacleAnalyzer, VisionError, VisionResult};

/// Public Gemini REST endpoint.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const TEMPERATURE: f32 = 0.3;
const MAX_OUTPUT_TOKENS: u32 = 2048;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Greedy: from the first '{' to the last '}'
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("JSON object pattern is valid"));

const OBSTACLE_PROMPT: &str = r#"Analyze this image from a mobile camera for obstacle detection to help a visually impaired person navigate safely.

Identify and describe any obstacles in the path, including:
- People or pedestrians
- Vehicles (cars, bikes, etc.)
- Street furniture (poles, benches, trash cans)
- Steps, curbs, or elevation changes
- Other obstacles that could impede navigation

For each obstacle, provide its type, its approximate location in the frame
as normalized coordinates between 0 and 1, an estimated distance
(close/medium/far), a severity level (low/medium/high) and a brief
description. Also provide a navigation recommendation based on the
obstacles detected.

Return the response as a JSON object with this structure:
{
    "obstacles": [
        {
            "type": "string",
            "location": {"x": 0.5, "y": 0.5},
            "distance_estimate": "close|medium|far",
            "description": "string",
            "severity": "low|medium|high"
        }
    ],
    "recommendation": "string"
}"#;

/// Configuration for [`GeminiVision`].
#[derive(Clone)]
pub struct GeminiVisionConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiVisionConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for GeminiVisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiVisionConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Drop for GeminiVisionConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Obstacle analyzer backed by the Gemini REST API.
pub struct GeminiVision {
    config: GeminiVisionConfig,
    client: reqwest::Client,
}

impl GeminiVision {
    pub fn new(config: GeminiVisionConfig) -> VisionResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(VisionError::InvalidConfiguration(
                "Google API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisionError::Request(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    async fn generate(&self, jpeg: &[u8]) -> VisionResult<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: OBSTACLE_PROMPT,
                    },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: BASE64.encode(jpeg),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(text)
    }
}

#[async_trait]
impl ObstacleAnalyzer for GeminiVision {
    async fn analyze(&self, jpeg: &[u8]) -> VisionResult<DetectionResult> {
        let text = self.generate(jpeg).await?;
        let result = parse_model_output(&text)?;
        debug!(
            obstacle_count = result.obstacles.len(),
            "Detected obstacles"
        );
        Ok(result)
    }
}

/// Extract the JSON document from free-form model text and normalize it.
pub fn parse_model_output(text: &str) -> VisionResult<DetectionResult> {
    let text = text.trim();
    let candidate = JSON_OBJECT
        .find(text)
        .map(|m| m.as_str())
        .unwrap_or(text);

    let value: Value =
        serde_json::from_str(candidate).map_err(|e| VisionError::Parse(e.to_string()))?;
    DetectionResult::from_model_value(&value)
}
