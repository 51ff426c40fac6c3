//! Obstacle detection result model.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Recommendation used when analysis fails.
pub const DEGRADED_RECOMMENDATION: &str = "Unable to analyze image. Please proceed with caution.";

/// Recommendation used when the model omits one.
pub const DEFAULT_RECOMMENDATION: &str = "No specific recommendation available.";

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while analyzing a frame.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Frame could not be converted to JPEG
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Transport-level failure talking to the vision model
    #[error("Request failed: {0}")]
    Request(String),

    /// Vision model answered with a non-success status
    #[error("Vision API returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Model output was not a usable JSON document
    #[error("Failed to parse model output: {0}")]
    Parse(String),

    /// Missing credentials or model configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

// =============================================================================
// Result Model
// =============================================================================

/// Estimated distance from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceEstimate {
    Close,
    Medium,
    Far,
}

impl DistanceEstimate {
    /// Lenient parse; anything unrecognized is treated as `Medium`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "close" | "near" => DistanceEstimate::Close,
            "far" => DistanceEstimate::Far,
            _ => DistanceEstimate::Medium,
        }
    }
}

/// How dangerous an obstacle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Lenient parse; anything unrecognized is treated as `Low`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Normalized frame coordinates, both in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn center() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::center()
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.5 }
}

/// One detected obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(rename = "type")]
    pub obstacle_type: String,
    pub location: Location,
    pub distance_estimate: DistanceEstimate,
    pub description: String,
    pub severity: Severity,
}

impl Obstacle {
    /// Build an obstacle from loosely structured model output, filling defaults.
    pub fn from_value(value: &Value) -> Self {
        let str_field = |key: &str| value.get(key).and_then(Value::as_str);

        let location = value
            .get("location")
            .map(|loc| {
                let x = loc.get("x").and_then(Value::as_f64).unwrap_or(0.5);
                let y = loc.get("y").and_then(Value::as_f64).unwrap_or(0.5);
                Location::new(x, y)
            })
            .unwrap_or_default();

        Self {
            obstacle_type: str_field("type").unwrap_or("unknown").to_string(),
            location,
            distance_estimate: str_field("distance_estimate")
                .map(DistanceEstimate::parse_lenient)
                .unwrap_or(DistanceEstimate::Medium),
            description: str_field("description").unwrap_or_default().to_string(),
            severity: str_field("severity")
                .map(Severity::parse_lenient)
                .unwrap_or(Severity::Low),
        }
    }
}

/// Outcome of analyzing one frame. Always well-formed, even on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub obstacles: Vec<Obstacle>,
    pub recommendation: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    /// Result used when analysis failed for any reason.
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            obstacles: Vec::new(),
            recommendation: DEGRADED_RECOMMENDATION.to_string(),
            timestamp: now_seconds(),
            error: Some(error.into()),
        }
    }

    /// Normalize a parsed model document into a result stamped now.
    pub fn from_model_value(value: &Value) -> VisionResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| VisionError::Parse("expected a JSON object".to_string()))?;

        let obstacles = object
            .get("obstacles")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(Obstacle::from_value).collect())
            .unwrap_or_default();

        let recommendation = object
            .get("recommendation")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_RECOMMENDATION)
            .to_string();

        Ok(Self {
            obstacles,
            recommendation,
            timestamp: now_seconds(),
            error: None,
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Current wall-clock time as fractional epoch seconds.
pub fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// =============================================================================
// Analyzer Trait
// =============================================================================

/// Vision collaborator: JPEG bytes in, detection result out.
#[async_trait]
pub trait ObstacleAnalyzer: Send + Sync {
    async fn analyze(&self, jpeg: &[u8]) -> VisionResult<DetectionResult>;
}
