//! Obstacle analysis of camera frames.

mod gemini;
mod types;

pub use gemini::{GEMINI_API_BASE, GeminiVision, GeminiVisionConfig, parse_model_output};
pub use types::{
    DEFAULT_RECOMMENDATION, DEGRADED_RECOMMENDATION, DetectionResult, DistanceEstimate, Location,
    Obstacle, ObstacleAnalyzer, Severity, VisionError, VisionResult, now_seconds,
};
