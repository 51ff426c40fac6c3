//! Environment variable parsing.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use tracing::warn;

use super::ConfigError;

/// Non-empty, trimmed value of an environment variable.
pub(crate) fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Environment value or a default.
pub(crate) fn env_or(key: &str, default: &str) -> String {
    env_string(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, `None` when unset.
pub(crate) fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
pub(crate) fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    env_string(key)
        .map(|raw| {
            parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("'{raw}' is not a boolean"),
            })
        })
        .transpose()
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated URL list, dropping blanks.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a JSON object of per-URL header maps. Invalid JSON yields an empty map.
pub fn parse_server_headers(raw: &str) -> HashMap<String, HashMap<String, String>> {
    if raw.trim().is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Invalid tool server headers JSON, ignoring");
        HashMap::new()
    })
}

/// Parse a flat JSON header map. Invalid JSON yields an empty map.
pub fn parse_headers(raw: &str) -> HashMap<String, String> {
    if raw.trim().is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "Invalid headers JSON, ignoring");
        HashMap::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_list() {
        assert_eq!(
            parse_url_list(" http://a.local , ,http://b.local,"),
            vec!["http://a.local", "http://b.local"]
        );
        assert!(parse_url_list("").is_empty());
    }

    #[test]
    fn test_parse_server_headers() {
        let headers =
            parse_server_headers(r#"{"http://a.local": {"Authorization": "Bearer x"}}"#);
        assert_eq!(headers["http://a.local"]["Authorization"], "Bearer x");
        assert!(parse_server_headers("{not json").is_empty());
        assert!(parse_server_headers("").is_empty());
    }

    #[test]
    fn test_parse_headers_invalid_is_empty() {
        assert!(parse_headers("[1,2]").is_empty());
        assert_eq!(parse_headers(r#"{"X-Key": "v"}"#)["X-Key"], "v");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
