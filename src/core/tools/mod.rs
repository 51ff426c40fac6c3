//! Tool discovery and dispatch across HTTP tool servers.
//!
//! # Architecture
//!
//! - [`ServerRegistry`] holds the ordered set of known servers and their headers
//! - [`ToolRouter`] discovers and caches each server's catalog and dispatches
//!   calls with sequential fallback
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen_agent::core::tools::{ServerRegistry, ToolRouter, ToolServerConfig};
//!
//! # async fn run() -> Result<(), lumen_agent::core::tools::ToolError> {
//! let mut registry = ServerRegistry::new();
//! registry.register(ToolServerConfig::new("http://localhost:8080"));
//!
//! let router = ToolRouter::new(registry)?;
//! let tools = router.list_tools(None).await;
//! println!("{} tools available", tools.len());
//! # Ok(())
//! # }
//! ```

mod registry;
mod router;
mod types;

pub use registry::ServerRegistry;
pub use router::{DEFAULT_REQUEST_TIMEOUT, ToolRouter};
pub use types::{
    ToolCallRequest, ToolCallResponse, ToolDescriptor, ToolError, ToolInputSchema, ToolResult,
    ToolServerConfig, ToolsResponse,
};
