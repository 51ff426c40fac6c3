//! Room access tokens.

use std::time::Duration;

use livekit_api::access_token::{AccessToken, VideoGrants};

use crate::config::ConfigError;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Mint a JWT that lets `identity` join `room`, publish and subscribe
/// media, and publish data.
pub fn generate_access_token(
    api_key: &str,
    api_secret: &str,
    room: &str,
    identity: &str,
    name: Option<&str>,
    ttl: Duration,
) -> Result<String, ConfigError> {
    let grants = VideoGrants {
        room_join: true,
        room: room.to_string(),
        can_publish: true,
        can_subscribe: true,
        can_publish_data: true,
        ..Default::default()
    };

    AccessToken::with_api_key(api_key, api_secret)
        .with_identity(identity)
        .with_name(name.unwrap_or(identity))
        .with_ttl(ttl)
        .with_grants(grants)
        .to_jwt()
        .map_err(|e| ConfigError::InvalidValue {
            key: "LIVEKIT_API_SECRET".to_string(),
            reason: format!("failed to sign access token: {e}"),
        })
}
