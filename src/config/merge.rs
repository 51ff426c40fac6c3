//! Environment base with YAML overrides.

use super::env::{
    env_bool, env_or, env_parse, env_string, parse_headers, parse_server_headers, parse_url_list,
};
use super::yaml::YamlConfig;
use super::{AgentConfig, ConfigError, defaults};

/// Build the configuration from environment variables, then apply YAML
/// values on top.
pub(crate) fn merge_config(yaml: Option<YamlConfig>) -> Result<AgentConfig, ConfigError> {
    let mut config = from_env_only()?;
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }
    Ok(config)
}

fn from_env_only() -> Result<AgentConfig, ConfigError> {
    Ok(AgentConfig {
        livekit_url: env_or("LIVEKIT_URL", defaults::LIVEKIT_URL),
        livekit_api_key: env_string("LIVEKIT_API_KEY"),
        livekit_api_secret: env_string("LIVEKIT_API_SECRET"),
        livekit_room: env_string("LIVEKIT_ROOM"),
        agent_identity: env_or("AGENT_IDENTITY", defaults::AGENT_IDENTITY),

        google_api_key: env_string("GOOGLE_API_KEY"),
        gemini_model: env_or("GEMINI_MODEL", defaults::GEMINI_MODEL),
        gemini_voice: env_or("GEMINI_VOICE", defaults::GEMINI_VOICE),
        mistral_api_key: env_string("MISTRAL_API_KEY"),
        voxtral_model: env_or("VOXTRAL_MODEL", defaults::VOXTRAL_MODEL),
        elevenlabs_api_key: env_string("ELEVENLABS_API_KEY"),
        elevenlabs_voice_id: env_or("ELEVENLABS_VOICE_ID", defaults::ELEVENLABS_VOICE_ID),
        elevenlabs_model: env_or("ELEVENLABS_MODEL", defaults::ELEVENLABS_MODEL),

        mcp_server_urls: env_string("MCP_SERVER_URLS")
            .map(|raw| parse_url_list(&raw))
            .unwrap_or_default(),
        mcp_server_headers: env_string("MCP_SERVER_HEADERS")
            .map(|raw| parse_server_headers(&raw))
            .unwrap_or_default(),
        whatsapp_api_url: env_string("WHATSAPP_API_URL"),
        whatsapp_api_headers: env_string("WHATSAPP_API_HEADERS")
            .map(|raw| parse_headers(&raw))
            .unwrap_or_default(),
        tool_request_timeout_seconds: env_parse("TOOL_REQUEST_TIMEOUT_SECONDS")?
            .unwrap_or(defaults::TOOL_REQUEST_TIMEOUT_SECONDS),

        tool_server_enabled: env_bool("TOOL_SERVER_ENABLED")?.unwrap_or(false),
        tool_server_host: env_or("TOOL_SERVER_HOST", defaults::TOOL_SERVER_HOST),
        tool_server_port: env_parse("TOOL_SERVER_PORT")?.unwrap_or(defaults::TOOL_SERVER_PORT),
        tool_server_command: env_string("TOOL_SERVER_COMMAND"),
        tool_server_args: env_string("TOOL_SERVER_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        tool_server_ready_path: env_or("TOOL_SERVER_READY_PATH", defaults::TOOL_SERVER_READY_PATH),

        video_enabled: env_bool("VIDEO_ENABLED")?.unwrap_or(true),
        video_processing_fps: env_parse("VIDEO_PROCESSING_FPS")?
            .unwrap_or(defaults::VIDEO_PROCESSING_FPS),
        video_jpeg_quality: env_parse("VIDEO_JPEG_QUALITY")?
            .unwrap_or(defaults::VIDEO_JPEG_QUALITY),
        video_wait_timeout_seconds: env_parse("VIDEO_WAIT_TIMEOUT_SECONDS")?
            .unwrap_or(defaults::VIDEO_WAIT_TIMEOUT_SECONDS),
        obstacle_detection_topic: env_or(
            "OBSTACLE_DETECTION_TOPIC",
            defaults::OBSTACLE_DETECTION_TOPIC,
        ),

        tool_call_topic: env_or("TOOL_CALL_TOPIC", defaults::TOOL_CALL_TOPIC),
        tool_result_topic: env_or("TOOL_RESULT_TOPIC", defaults::TOOL_RESULT_TOPIC),
    })
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

fn apply_yaml(config: &mut AgentConfig, yaml: YamlConfig) {
    if let Some(livekit) = yaml.livekit {
        set(&mut config.livekit_url, livekit.url);
        set_opt(&mut config.livekit_api_key, livekit.api_key);
        set_opt(&mut config.livekit_api_secret, livekit.api_secret);
        set_opt(&mut config.livekit_room, livekit.room);
        set(&mut config.agent_identity, livekit.agent_identity);
    }

    if let Some(models) = yaml.models {
        set_opt(&mut config.google_api_key, models.google_api_key);
        set(&mut config.gemini_model, models.gemini_model);
        set(&mut config.gemini_voice, models.gemini_voice);
        set_opt(&mut config.mistral_api_key, models.mistral_api_key);
        set(&mut config.voxtral_model, models.voxtral_model);
        set_opt(&mut config.elevenlabs_api_key, models.elevenlabs_api_key);
        set(&mut config.elevenlabs_voice_id, models.elevenlabs_voice_id);
        set(&mut config.elevenlabs_model, models.elevenlabs_model);
    }

    if let Some(tools) = yaml.tools {
        if let Some(urls) = tools.server_urls {
            config.mcp_server_urls = urls
                .into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
        }
        set(&mut config.mcp_server_headers, tools.server_headers);
        set_opt(&mut config.whatsapp_api_url, tools.whatsapp_api_url);
        set(&mut config.whatsapp_api_headers, tools.whatsapp_api_headers);
        set(
            &mut config.tool_request_timeout_seconds,
            tools.request_timeout_seconds,
        );
    }

    if let Some(server) = yaml.tool_server {
        set(&mut config.tool_server_enabled, server.enabled);
        set(&mut config.tool_server_host, server.host);
        set(&mut config.tool_server_port, server.port);
        set_opt(&mut config.tool_server_command, server.command);
        set(&mut config.tool_server_args, server.args);
        set(&mut config.tool_server_ready_path, server.ready_path);
    }

    if let Some(video) = yaml.video {
        set(&mut config.video_enabled, video.enabled);
        set(&mut config.video_processing_fps, video.processing_fps);
        set(&mut config.video_jpeg_quality, video.jpeg_quality);
        set(
            &mut config.video_wait_timeout_seconds,
            video.wait_timeout_seconds,
        );
        set(
            &mut config.obstacle_detection_topic,
            video.obstacle_detection_topic,
        );
    }

    if let Some(data) = yaml.data {
        set(&mut config.tool_call_topic, data.tool_call_topic);
        set(&mut config.tool_result_topic, data.tool_result_topic);
    }
}
