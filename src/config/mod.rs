//! Configuration module for the assistant agent
//!
//! This module handles agent configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use lumen_agent::config::AgentConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = AgentConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = AgentConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Serving {} tool servers", config.mcp_server_urls.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

mod env;
mod merge;
mod validation;
mod yaml;

pub use env::{parse_headers, parse_server_headers, parse_url_list};
pub use yaml::YamlConfig;

use crate::core::pipeline::PipelineSettings;
use crate::core::supervisor::ProcessConfig;
use crate::core::tools::ToolServerConfig;
use crate::core::video::VideoPipelineConfig;
use crate::core::voice::{ToolBridgeConfig, VoiceProfile};

/// Default values for every optional setting.
pub mod defaults {
    pub const LIVEKIT_URL: &str = "ws://localhost:7880";
    pub const AGENT_IDENTITY: &str = "lumen-agent";
    pub const GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
    pub const GEMINI_VOICE: &str = "Puck";
    pub const VOXTRAL_MODEL: &str = "voxtral-mini-2507";
    pub const ELEVENLABS_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
    pub const ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";
    pub const TOOL_REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const TOOL_SERVER_HOST: &str = "127.0.0.1";
    pub const TOOL_SERVER_PORT: u16 = 8081;
    pub const TOOL_SERVER_READY_PATH: &str = "/mcp";
    pub const VIDEO_PROCESSING_FPS: f64 = 2.0;
    pub const VIDEO_JPEG_QUALITY: u8 = 85;
    pub const VIDEO_WAIT_TIMEOUT_SECONDS: u64 = 30;
    pub const OBSTACLE_DETECTION_TOPIC: &str = "obstacle_detection";
    pub const TOOL_CALL_TOPIC: &str = "tool_call";
    pub const TOOL_RESULT_TOPIC: &str = "tool_result";
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Agent configuration
///
/// Contains everything needed to run one assistant session:
/// - LiveKit connection and agent identity
/// - Model identifiers, voices and API keys
/// - Remote tool servers and the optional local tool server
/// - Video sampling and data-channel topics
#[derive(Debug, Clone)]
pub struct AgentConfig {
    // LiveKit settings
    pub livekit_url: String,
    pub livekit_api_key: Option<String>,
    pub livekit_api_secret: Option<String>,
    pub livekit_room: Option<String>,
    pub agent_identity: String,

    // Models
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_voice: String,
    pub mistral_api_key: Option<String>,
    pub voxtral_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model: String,

    // Remote tool servers
    pub mcp_server_urls: Vec<String>,
    /// Request headers keyed by server URL
    pub mcp_server_headers: HashMap<String, HashMap<String, String>>,
    pub whatsapp_api_url: Option<String>,
    pub whatsapp_api_headers: HashMap<String, String>,
    pub tool_request_timeout_seconds: u64,

    // Local tool server
    pub tool_server_enabled: bool,
    pub tool_server_host: String,
    pub tool_server_port: u16,
    pub tool_server_command: Option<String>,
    pub tool_server_args: Vec<String>,
    pub tool_server_ready_path: String,

    // Video
    pub video_enabled: bool,
    pub video_processing_fps: f64,
    pub video_jpeg_quality: u8,
    pub video_wait_timeout_seconds: u64,
    pub obstacle_detection_topic: String,

    // Data channel
    pub tool_call_topic: String,
    pub tool_result_topic: String,
}

/// Implement Drop to zeroize all secret fields when AgentConfig is dropped.
impl Drop for AgentConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        for key in [
            &mut self.livekit_api_key,
            &mut self.livekit_api_secret,
            &mut self.google_api_key,
            &mut self.mistral_api_key,
            &mut self.elevenlabs_api_key,
        ]
        .into_iter()
        .flatten()
        {
            key.zeroize();
        }

        // Header values routinely carry bearer tokens
        for headers in self.mcp_server_headers.values_mut() {
            for value in headers.values_mut() {
                value.zeroize();
            }
        }
        for value in self.whatsapp_api_headers.values_mut() {
            value.zeroize();
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables (and defaults).
    ///
    /// The `.env` file is loaded in `main` before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// LiveKit API key and secret, required for minting tokens.
    pub fn livekit_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let key = self
            .livekit_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("LIVEKIT_API_KEY"))?;
        let secret = self
            .livekit_api_secret
            .as_deref()
            .ok_or(ConfigError::Missing("LIVEKIT_API_SECRET"))?;
        Ok((key, secret))
    }

    /// Configured tool-server URLs with trailing slashes removed.
    pub fn tool_server_urls(&self) -> Vec<String> {
        self.mcp_server_urls
            .iter()
            .map(|u| normalize_url(u))
            .filter(|u| !u.is_empty())
            .collect()
    }

    /// Per-URL headers keyed the same way as [`Self::tool_server_urls`].
    pub fn tool_server_headers(&self) -> HashMap<String, HashMap<String, String>> {
        self.mcp_server_headers
            .iter()
            .map(|(url, headers)| (normalize_url(url), headers.clone()))
            .collect()
    }

    /// The WhatsApp tool server, unless it is already configured.
    pub fn whatsapp_server(&self) -> Option<ToolServerConfig> {
        let url = normalize_url(self.whatsapp_api_url.as_deref()?);
        if url.is_empty() || self.tool_server_urls().contains(&url) {
            return None;
        }
        Some(ToolServerConfig::new(url).with_headers(self.whatsapp_api_headers.clone()))
    }

    pub fn process_config(&self) -> ProcessConfig {
        ProcessConfig {
            enabled: self.tool_server_enabled,
            command: self.tool_server_command.clone(),
            args: self.tool_server_args.clone(),
            host: self.tool_server_host.clone(),
            port: self.tool_server_port,
            ready_path: self.tool_server_ready_path.clone(),
            ..ProcessConfig::default()
        }
    }

    pub fn video_config(&self) -> VideoPipelineConfig {
        VideoPipelineConfig {
            fps: self.video_processing_fps,
            jpeg_quality: self.video_jpeg_quality,
            topic: self.obstacle_detection_topic.clone(),
            wait_timeout: Duration::from_secs(self.video_wait_timeout_seconds),
            ..VideoPipelineConfig::default()
        }
    }

    pub fn voice_profile(&self) -> VoiceProfile {
        VoiceProfile {
            llm_model: self.gemini_model.clone(),
            llm_voice: self.gemini_voice.clone(),
            stt_model: self.voxtral_model.clone(),
            tts_model: self.elevenlabs_model.clone(),
            tts_voice_id: self.elevenlabs_voice_id.clone(),
        }
    }

    pub fn bridge_config(&self) -> ToolBridgeConfig {
        ToolBridgeConfig {
            call_topic: self.tool_call_topic.clone(),
            result_topic: self.tool_result_topic.clone(),
            profile: self.voice_profile(),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            tool_server_urls: self.tool_server_urls(),
            tool_server_headers: self.tool_server_headers(),
            extra_tool_servers: self.whatsapp_server().into_iter().collect(),
            tool_request_timeout: Duration::from_secs(self.tool_request_timeout_seconds),
            supervisor: self.process_config(),
            video_enabled: self.video_enabled,
            video: self.video_config(),
        }
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
