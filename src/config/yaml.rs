use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// livekit:
///   url: "wss://example.livekit.cloud"
///   api_key: "your-api-key"
///   api_secret: "your-api-secret"
///   room: "lumen-room"
///   agent_identity: "lumen-agent"
///
/// models:
///   google_api_key: "your-google-key"
///   gemini_model: "gemini-2.0-flash-exp"
///   gemini_voice: "Puck"
///   mistral_api_key: "your-mistral-key"
///   voxtral_model: "voxtral-mini-2507"
///   elevenlabs_api_key: "your-elevenlabs-key"
///   elevenlabs_voice_id: "EXAVITQu4vr4xnSDxMaL"
///   elevenlabs_model: "eleven_multilingual_v2"
///
/// tools:
///   server_urls:
///     - "http://localhost:8080"
///   server_headers:
///     "http://localhost:8080":
///       Authorization: "Bearer token"
///   whatsapp_api_url: "http://localhost:8081"
///   whatsapp_api_headers:
///     X-Api-Key: "key"
///   request_timeout_seconds: 30
///
/// tool_server:
///   enabled: true
///   host: "127.0.0.1"
///   port: 8081
///   command: "python"
///   args: ["scripts/run_whatsapp_server.py"]
///   ready_path: "/mcp"
///
/// video:
///   enabled: true
///   processing_fps: 2.0
///   jpeg_quality: 85
///   wait_timeout_seconds: 30
///   obstacle_detection_topic: "obstacle_detection"
///
/// data:
///   tool_call_topic: "tool_call"
///   tool_result_topic: "tool_result"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub livekit: Option<LiveKitYaml>,
    pub models: Option<ModelsYaml>,
    pub tools: Option<ToolsYaml>,
    pub tool_server: Option<ToolServerYaml>,
    pub video: Option<VideoYaml>,
    pub data: Option<DataYaml>,
}

/// LiveKit configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveKitYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub room: Option<String>,
    pub agent_identity: Option<String>,
}

/// Model identifiers and credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ModelsYaml {
    pub google_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_voice: Option<String>,
    pub mistral_api_key: Option<String>,
    pub voxtral_model: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: Option<String>,
    pub elevenlabs_model: Option<String>,
}

/// Remote tool servers from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    pub server_urls: Option<Vec<String>>,
    pub server_headers: Option<HashMap<String, HashMap<String, String>>>,
    pub whatsapp_api_url: Option<String>,
    pub whatsapp_api_headers: Option<HashMap<String, String>>,
    pub request_timeout_seconds: Option<u64>,
}

/// Locally supervised tool server from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolServerYaml {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub ready_path: Option<String>,
}

/// Video pipeline settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VideoYaml {
    pub enabled: Option<bool>,
    pub processing_fps: Option<f64>,
    pub jpeg_quality: Option<u8>,
    pub wait_timeout_seconds: Option<u64>,
    pub obstacle_detection_topic: Option<String>,
}

/// Data-channel topics from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DataYaml {
    pub tool_call_topic: Option<String>,
    pub tool_result_topic: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
livekit:
  url: "ws://livekit.example.com"
  api_key: "test-key"
  api_secret: "test-secret"
  room: "demo"

models:
  gemini_model: "gemini-2.5-flash"

tools:
  server_urls: ["http://a.local", "http://b.local"]
  server_headers:
    "http://a.local":
      Authorization: "Bearer a"

tool_server:
  enabled: true
  port: 9100
  args: ["-m", "server"]

video:
  processing_fps: 1.5
  jpeg_quality: 70
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let livekit = config.livekit.unwrap();
        assert_eq!(livekit.url.as_deref(), Some("ws://livekit.example.com"));
        assert_eq!(livekit.room.as_deref(), Some("demo"));

        let tools = config.tools.unwrap();
        assert_eq!(tools.server_urls.unwrap().len(), 2);
        assert_eq!(
            tools.server_headers.unwrap()["http://a.local"]["Authorization"],
            "Bearer a"
        );

        let tool_server = config.tool_server.unwrap();
        assert_eq!(tool_server.enabled, Some(true));
        assert_eq!(tool_server.port, Some(9100));
        assert!(tool_server.host.is_none());

        let video = config.video.unwrap();
        assert_eq!(video.processing_fps, Some(1.5));
        assert_eq!(video.jpeg_quality, Some(70));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();
        assert!(config.livekit.is_none());
        assert!(config.video.is_none());
    }

    #[test]
    fn test_from_file_missing_file() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
