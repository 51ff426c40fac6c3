//! Ordered registry of tool-server endpoints.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::types::ToolServerConfig;

/// Ordered set of tool servers keyed by URL.
///
/// Insertion order is the fallback order used by the router. Registering a URL
/// that is already present keeps the first entry and its headers.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Vec<ToolServerConfig>,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of URLs and a per-URL header map.
    ///
    /// Blank URLs are skipped.
    pub fn from_urls(urls: &[String], headers: &HashMap<String, HashMap<String, String>>) -> Self {
        let mut registry = Self::new();
        for url in urls {
            if url.trim().is_empty() {
                continue;
            }
            let server_headers = headers.get(url.trim()).cloned().unwrap_or_default();
            registry.register(ToolServerConfig::new(url.as_str()).with_headers(server_headers));
        }
        registry
    }

    /// Append a server; returns `false` if its URL was already registered.
    pub fn register(&mut self, server: ToolServerConfig) -> bool {
        if self.contains(&server.url) {
            warn!(server_url = %server.url, "Tool server already registered, keeping first entry");
            return false;
        }
        debug!(server_url = %server.url, "Registered tool server");
        self.servers.push(server);
        true
    }

    /// Whether a server with this URL is registered.
    pub fn contains(&self, url: &str) -> bool {
        let url = url.trim().trim_end_matches('/');
        self.servers.iter().any(|s| s.url == url)
    }

    /// Look up a server by URL.
    pub fn get(&self, url: &str) -> Option<&ToolServerConfig> {
        let url = url.trim().trim_end_matches('/');
        self.servers.iter().find(|s| s.url == url)
    }

    /// Servers in fallback order.
    pub fn servers(&self) -> &[ToolServerConfig] {
        &self.servers
    }

    /// Resolve the candidate list for an optional server filter.
    ///
    /// An unknown filter resolves to no servers.
    pub fn candidates(&self, filter: Option<&str>) -> Vec<&ToolServerConfig> {
        match filter {
            Some(url) => self.get(url).into_iter().collect(),
            None => self.servers.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
