//! Crate-level error type.
//!
//! Each subsystem owns its own error enum; [`AgentError`] gathers them for
//! callers that drive more than one subsystem, such as the worker.

use thiserror::Error;

use crate::config::ConfigError;
use crate::core::pipeline::PipelineError;
use crate::core::room::MediaError;
use crate::core::session::SessionError;
use crate::core::tools::ToolError;
use crate::core::vision::VisionError;
use crate::core::voice::VoiceError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Room error: {0}")]
    Media(#[from] MediaError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Voice agent error: {0}")]
    Voice(#[from] VoiceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Result type for crate-level operations.
pub type AgentResult<T> = Result<T, AgentError>;
