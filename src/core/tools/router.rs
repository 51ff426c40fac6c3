//! Tool router: one logical tool surface over N independently owned servers.
//!
//! Discovery results are cached per server URL for the lifetime of the router.
//! Calls are dispatched to candidate servers strictly in registration order;
//! the first server that accepts the call wins and no two servers ever see the
//! same logical call concurrently.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use super::registry::ServerRegistry;
use super::types::{
    ToolCallRequest, ToolCallResponse, ToolDescriptor, ToolError, ToolResult, ToolServerConfig,
    ToolsResponse,
};

/// Default timeout for discovery and call requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Router over the registered tool servers.
pub struct ToolRouter {
    registry: ServerRegistry,
    client: reqwest::Client,
    /// Discovered descriptors keyed by server URL
    cache: Mutex<HashMap<String, Vec<ToolDescriptor>>>,
}

impl ToolRouter {
    /// Create a router with the default request timeout.
    pub fn new(registry: ServerRegistry) -> ToolResult<Self> {
        Self::with_timeout(registry, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a router with a custom request timeout.
    pub fn with_timeout(registry: ServerRegistry, timeout: Duration) -> ToolResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Http {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            registry,
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Registered servers in fallback order.
    pub fn servers(&self) -> &[ToolServerConfig] {
        self.registry.servers()
    }

    /// List tools from every registered server, or only `server_filter`.
    ///
    /// A failing server is logged and skipped. Results are concatenated in
    /// registration order and duplicate names across servers are kept.
    pub async fn list_tools(&self, server_filter: Option<&str>) -> Vec<ToolDescriptor> {
        let mut all_tools = Vec::new();

        for server in self.registry.candidates(server_filter) {
            let cached = self.cache.lock().get(&server.url).cloned();
            if let Some(cached) = cached {
                all_tools.extend(cached);
                continue;
            }

            match self.discover(server).await {
                Ok(tools) => {
                    debug!(
                        server_url = %server.url,
                        tool_count = tools.len(),
                        "Loaded tools from server"
                    );
                    all_tools.extend(tools.iter().cloned());
                    self.cache.lock().insert(server.url.clone(), tools);
                }
                Err(e) => {
                    error!(server_url = %server.url, error = %e, "Error listing tools");
                }
            }
        }

        all_tools
    }

    /// Call `name` on the first server that hosts it.
    ///
    /// Servers answering 404 are skipped silently; any other failure is logged
    /// and the next server is tried. Returns [`ToolError::ToolNotFound`] once
    /// every candidate has been exhausted.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        server_filter: Option<&str>,
    ) -> ToolResult<ToolCallResponse> {
        let request = ToolCallRequest {
            name: name.to_string(),
            arguments,
        };

        for server in self.registry.candidates(server_filter) {
            match self.invoke(server, &request).await {
                Ok(response) => {
                    info!(
                        tool_name = %name,
                        server_url = %server.url,
                        is_error = response.is_error,
                        "Tool call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_not_found() => {
                    debug!(tool_name = %name, server_url = %server.url, "Tool not hosted, trying next server");
                }
                Err(e) => {
                    error!(
                        tool_name = %name,
                        server_url = %server.url,
                        error = %e,
                        "Error calling tool, trying next server"
                    );
                }
            }
        }

        Err(ToolError::ToolNotFound(name.to_string()))
    }

    /// Number of servers whose catalog is cached.
    pub fn cached_server_count(&self) -> usize {
        self.cache.lock().len()
    }

    async fn discover(&self, server: &ToolServerConfig) -> ToolResult<Vec<ToolDescriptor>> {
        let url = server.tools_url();
        let mut request = self.client.get(&url);
        for (key, value) in &server.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| ToolError::Http {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body: ToolsResponse = response.json().await.map_err(|e| ToolError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(body.tools)
    }

    async fn invoke(
        &self,
        server: &ToolServerConfig,
        call: &ToolCallRequest,
    ) -> ToolResult<ToolCallResponse> {
        let url = server.call_url(&call.name);
        let mut request = self.client.post(&url);
        for (key, value) in &server.headers {
            request = request.header(key, value);
        }
        request = request.header("Content-Type", "application/json").json(call);

        let response = request.send().await.map_err(|e| ToolError::Http {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| ToolError::Decode {
            url,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_lists_nothing() {
        let router = ToolRouter::new(ServerRegistry::new()).unwrap();
        assert!(router.list_tools(None).await.is_empty());
        assert_eq!(router.cached_server_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_registry_call_is_not_found() {
        let router = ToolRouter::new(ServerRegistry::new()).unwrap();
        let result = router.call_tool("send_message", Map::new(), None).await;
        match result {
            Err(ToolError::ToolNotFound(name)) => assert_eq!(name, "send_message"),
            other => panic!("Expected ToolNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_filter_is_not_found() {
        let mut registry = ServerRegistry::new();
        registry.register(ToolServerConfig::new("http://127.0.0.1:9"));
        let router = ToolRouter::new(registry).unwrap();

        assert!(router.list_tools(Some("http://other.local")).await.is_empty());
        assert!(matches!(
            router
                .call_tool("x", Map::new(), Some("http://other.local"))
                .await,
            Err(ToolError::ToolNotFound(_))
        ));
    }
}
