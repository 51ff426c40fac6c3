use url::Url;

use super::{AgentConfig, ConfigError};

/// Validate a fully merged configuration.
pub(crate) fn validate(config: &AgentConfig) -> Result<(), ConfigError> {
    validate_video(config.video_processing_fps, config.video_jpeg_quality)?;
    validate_tool_server(
        config.tool_server_enabled,
        config.tool_server_command.as_deref(),
        config.tool_server_port,
    )?;

    for url in &config.mcp_server_urls {
        validate_http_url("MCP_SERVER_URLS", url)?;
    }
    if let Some(url) = &config.whatsapp_api_url {
        validate_http_url("WHATSAPP_API_URL", url)?;
    }

    if config.tool_request_timeout_seconds == 0 {
        return Err(ConfigError::InvalidValue {
            key: "TOOL_REQUEST_TIMEOUT_SECONDS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(())
}

pub(crate) fn validate_video(fps: f64, quality: u8) -> Result<(), ConfigError> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key: "VIDEO_PROCESSING_FPS".to_string(),
            reason: format!("{fps} must be a positive number"),
        });
    }
    if !(1..=100).contains(&quality) {
        return Err(ConfigError::InvalidValue {
            key: "VIDEO_JPEG_QUALITY".to_string(),
            reason: format!("{quality} must be between 1 and 100"),
        });
    }
    Ok(())
}

pub(crate) fn validate_tool_server(
    enabled: bool,
    command: Option<&str>,
    port: u16,
) -> Result<(), ConfigError> {
    if enabled && command.is_some() && port == 0 {
        return Err(ConfigError::InvalidValue {
            key: "TOOL_SERVER_PORT".to_string(),
            reason: "must be non-zero when the tool server is enabled".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_http_url(key: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("'{raw}': {e}"),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{raw}' uses unsupported scheme '{other}'"),
        }),
    }
}
