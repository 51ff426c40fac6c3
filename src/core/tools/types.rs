//! Wire types for the HTTP tool-server protocol.
//!
//! A tool server exposes two operations:
//!
//! - `GET {url}/tools` returning `{"tools": [ToolDescriptor, ...]}`
//! - `POST {url}/tools/{name}` accepting a [`ToolCallRequest`] and returning a
//!   [`ToolCallResponse`], or `404 Not Found` when the tool is not hosted there

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while discovering or calling tools.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No candidate server accepted the call
    #[error("Tool {0} not found on any tool server")]
    ToolNotFound(String),

    /// Transport-level failure (connection refused, timeout, TLS)
    #[error("HTTP error from {url}: {reason}")]
    Http { url: String, reason: String },

    /// The server answered with a non-success status
    #[error("Tool server {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The response body could not be decoded
    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ToolError {
    /// Whether this failure means "the tool is not hosted here".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ToolError::Status { status: 404, .. })
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

// =============================================================================
// Server Configuration
// =============================================================================

/// Endpoint of one tool server.
///
/// Identity is the URL: the registry never holds two entries with the same URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Base URL of the server (without trailing slash)
    pub url: String,

    /// Headers sent with every request to this server
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ToolServerConfig {
    /// Create a config with no extra headers.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: normalize_url(url.into()),
            headers: HashMap::new(),
        }
    }

    /// Attach headers to this server.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// URL of the discovery endpoint.
    pub fn tools_url(&self) -> String {
        format!("{}/tools", self.url)
    }

    /// URL of the call endpoint for `name`.
    pub fn call_url(&self, name: &str) -> String {
        format!("{}/tools/{}", self.url, name)
    }
}

fn normalize_url(url: String) -> String {
    let trimmed = url.trim();
    trimmed.trim_end_matches('/').to_string()
}

// =============================================================================
// Descriptors
// =============================================================================

/// JSON-schema-like description of a tool's arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,

    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,

    #[serde(default)]
    pub required: Vec<String>,
}

fn default_schema_type() -> String {
    "object".to_string()
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self {
            schema_type: default_schema_type(),
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

/// Metadata advertising one callable capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: ToolInputSchema,
}

/// Body of a discovery response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsResponse {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

// =============================================================================
// Calls
// =============================================================================

/// Request body for a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,
}

/// Result of a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    /// Ordered content blocks
    #[serde(default)]
    pub content: Vec<Value>,

    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_config_urls() {
        let config = ToolServerConfig::new("http://maps.local:8080/");
        assert_eq!(config.url, "http://maps.local:8080");
        assert_eq!(config.tools_url(), "http://maps.local:8080/tools");
        assert_eq!(
            config.call_url("get_directions"),
            "http://maps.local:8080/tools/get_directions"
        );
    }

    #[test]
    fn test_descriptor_defaults_missing_schema_fields() {
        let descriptor: ToolDescriptor = serde_json::from_value(json!({
            "name": "geocode_address",
            "description": "Convert an address to coordinates",
            "inputSchema": {"properties": {"address": {"type": "string"}}}
        }))
        .unwrap();

        assert_eq!(descriptor.input_schema.schema_type, "object");
        assert!(descriptor.input_schema.required.is_empty());
        assert!(descriptor.input_schema.properties.contains_key("address"));
    }

    #[test]
    fn test_call_response_uses_camel_case_error_flag() {
        let response: ToolCallResponse =
            serde_json::from_value(json!({"content": [{"type": "text", "text": "ok"}], "isError": true}))
                .unwrap();
        assert!(response.is_error);
        assert_eq!(response.content.len(), 1);

        let empty: ToolCallResponse = serde_json::from_value(json!({})).unwrap();
        assert!(!empty.is_error);
        assert!(empty.content.is_empty());
    }

    #[test]
    fn test_not_found_classification() {
        let not_found = ToolError::Status {
            url: "http://a".into(),
            status: 404,
        };
        let server_error = ToolError::Status {
            url: "http://a".into(),
            status: 500,
        };
        assert!(not_found.is_not_found());
        assert!(!server_error.is_not_found());
        assert!(!ToolError::ToolNotFound("x".into()).is_not_found());
    }
}
