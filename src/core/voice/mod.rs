//! Voice agent surface.
//!
//! The speech and language services are driven through [`VoiceAgent`]. The
//! bundled [`ToolBridgeAgent`] exposes the routed tool surface over the
//! room's data channel so any speech front end in the room can call tools.

mod bridge;
mod instructions;

use async_trait::async_trait;
use thiserror::Error;

pub use bridge::{ToolBridgeAgent, ToolBridgeConfig, ToolCallMessage, ToolReplyMessage};
pub use instructions::agent_instructions;

/// Errors raised by a voice agent.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Voice agent already started")]
    AlreadyStarted,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Media error: {0}")]
    Media(#[from] crate::core::room::MediaError),

    #[error("Voice agent error: {0}")]
    Internal(String),
}

/// Result type for voice agent operations.
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Model and voice identifiers a speech front end is configured with.
#[derive(Debug, Clone, Default)]
pub struct VoiceProfile {
    pub llm_model: String,
    pub llm_voice: String,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice_id: String,
}

/// Speech pipeline attached to a room.
#[async_trait]
pub trait VoiceAgent: Send {
    /// Attach to the room and begin serving the conversation.
    async fn start(&mut self) -> VoiceResult<()>;

    /// Detach from the room. Idempotent.
    async fn stop(&mut self) -> VoiceResult<()>;

    fn is_running(&self) -> bool;
}
