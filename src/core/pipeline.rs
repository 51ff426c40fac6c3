//! Assistant pipeline: supervisor, tool router, voice agent and video
//! pipeline wired together for one room.
//!
//! Start order is supervisor, router, voice agent, video. Stop runs the
//! same list in reverse and always reaches the supervisor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use super::room::MediaRoom;
use super::supervisor::{ProcessConfig, ToolServerSupervisor};
use super::tools::{
    DEFAULT_REQUEST_TIMEOUT, ServerRegistry, ToolDescriptor, ToolError, ToolRouter,
    ToolServerConfig,
};
use super::video::{VideoPipeline, VideoPipelineConfig};
use super::vision::ObstacleAnalyzer;
use super::voice::{ToolBridgeAgent, ToolBridgeConfig, VoiceAgent, VoiceError};

/// Errors raised while starting or stopping the assistant pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Tool router error: {0}")]
    Tools(#[from] ToolError),

    #[error("Voice agent error: {0}")]
    Voice(#[from] VoiceError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Static settings for one assistant pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Configured tool-server URLs, in fallback order
    pub tool_server_urls: Vec<String>,
    /// Per-URL request headers
    pub tool_server_headers: HashMap<String, HashMap<String, String>>,
    /// Additional servers appended after the configured ones
    pub extra_tool_servers: Vec<ToolServerConfig>,
    pub tool_request_timeout: Duration,
    pub supervisor: ProcessConfig,
    pub video_enabled: bool,
    pub video: VideoPipelineConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tool_server_urls: Vec::new(),
            tool_server_headers: HashMap::new(),
            extra_tool_servers: Vec::new(),
            tool_request_timeout: DEFAULT_REQUEST_TIMEOUT,
            supervisor: ProcessConfig::default(),
            video_enabled: true,
            video: VideoPipelineConfig::default(),
        }
    }
}

/// Builds the voice agent once the tool surface is known.
pub trait VoiceAgentFactory: Send + Sync {
    fn create(
        &self,
        room: Arc<dyn MediaRoom>,
        router: Arc<ToolRouter>,
        tools: Vec<ToolDescriptor>,
    ) -> Result<Box<dyn VoiceAgent>, VoiceError>;
}

/// Factory for the bundled data-channel tool bridge.
#[derive(Debug, Clone, Default)]
pub struct ToolBridgeFactory {
    pub config: ToolBridgeConfig,
}

impl VoiceAgentFactory for ToolBridgeFactory {
    fn create(
        &self,
        room: Arc<dyn MediaRoom>,
        router: Arc<ToolRouter>,
        tools: Vec<ToolDescriptor>,
    ) -> Result<Box<dyn VoiceAgent>, VoiceError> {
        Ok(Box::new(ToolBridgeAgent::new(
            room,
            router,
            tools,
            self.config.clone(),
        )))
    }
}

/// A startable, stoppable unit owned by the session orchestrator.
#[async_trait]
pub trait SessionPipeline: Send {
    async fn start(&mut self) -> PipelineResult<()>;

    /// Best effort; must release every resource even when it reports an error.
    async fn stop(&mut self) -> PipelineResult<()>;
}

/// Builds a fresh pipeline for each session start.
pub trait PipelineFactory: Send + Sync {
    fn build(&self) -> PipelineResult<Box<dyn SessionPipeline>>;
}

/// The production pipeline.
pub struct AssistantPipeline {
    room: Arc<dyn MediaRoom>,
    analyzer: Option<Arc<dyn ObstacleAnalyzer>>,
    voice_factory: Arc<dyn VoiceAgentFactory>,
    settings: PipelineSettings,
    supervisor: ToolServerSupervisor,
    router: Option<Arc<ToolRouter>>,
    voice: Option<Box<dyn VoiceAgent>>,
    video: Option<VideoPipeline>,
}

impl AssistantPipeline {
    pub fn new(
        room: Arc<dyn MediaRoom>,
        analyzer: Option<Arc<dyn ObstacleAnalyzer>>,
        voice_factory: Arc<dyn VoiceAgentFactory>,
        settings: PipelineSettings,
    ) -> Self {
        let supervisor = ToolServerSupervisor::new(settings.supervisor.clone());
        Self {
            room,
            analyzer,
            voice_factory,
            settings,
            supervisor,
            router: None,
            voice: None,
            video: None,
        }
    }

    pub fn router(&self) -> Option<&Arc<ToolRouter>> {
        self.router.as_ref()
    }

    pub fn supervisor(&self) -> &ToolServerSupervisor {
        &self.supervisor
    }

    pub fn video(&self) -> Option<&VideoPipeline> {
        self.video.as_ref()
    }
}

/// Configured servers, then extra servers not already present, then the
/// supervised server when one is ready.
pub fn build_registry(
    settings: &PipelineSettings,
    supervised_url: Option<String>,
) -> ServerRegistry {
    let mut registry =
        ServerRegistry::from_urls(&settings.tool_server_urls, &settings.tool_server_headers);

    for server in &settings.extra_tool_servers {
        if !registry.contains(&server.url) {
            info!(server_url = %server.url, "Adding extra tool server");
            registry.register(server.clone());
        }
    }

    if let Some(url) = supervised_url {
        info!(server_url = %url, "Adding supervised tool server");
        registry.register(ToolServerConfig::new(url));
    }

    registry
}

#[async_trait]
impl SessionPipeline for AssistantPipeline {
    async fn start(&mut self) -> PipelineResult<()> {
        if self.voice.is_some() {
            warn!("Assistant pipeline is already started");
            return Ok(());
        }

        self.supervisor.start().await;

        let supervised_url = self.supervisor.is_ready().then(|| self.supervisor.url());
        let registry = build_registry(&self.settings, supervised_url);
        let router = Arc::new(ToolRouter::with_timeout(
            registry,
            self.settings.tool_request_timeout,
        )?);
        self.router = Some(Arc::clone(&router));

        let tools = router.list_tools(None).await;
        info!(
            server_count = router.servers().len(),
            tool_count = tools.len(),
            "Tool surface ready"
        );

        let mut voice = self
            .voice_factory
            .create(Arc::clone(&self.room), router, tools)?;
        voice.start().await?;
        self.voice = Some(voice);

        if self.settings.video_enabled {
            match &self.analyzer {
                Some(analyzer) => {
                    let mut video = VideoPipeline::new(
                        Arc::clone(&self.room),
                        Arc::clone(analyzer),
                        self.settings.video.clone(),
                    );
                    video.start();
                    self.video = Some(video);
                }
                None => warn!("Video enabled but no obstacle analyzer configured"),
            }
        }

        info!(room_name = %self.room.name(), "Assistant pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> PipelineResult<()> {
        let mut first_error = None;

        if let Some(mut video) = self.video.take() {
            video.stop().await;
        }

        if let Some(mut voice) = self.voice.take() {
            if let Err(e) = voice.stop().await {
                error!(error = %e, "Error stopping voice agent");
                first_error = Some(PipelineError::Voice(e));
            }
        }

        self.router = None;
        self.supervisor.stop().await;

        info!(room_name = %self.room.name(), "Assistant pipeline stopped");
        first_error.map_or(Ok(()), Err)
    }
}

/// Builds [`AssistantPipeline`]s sharing one room, analyzer and settings.
pub struct AssistantPipelineFactory {
    room: Arc<dyn MediaRoom>,
    analyzer: Option<Arc<dyn ObstacleAnalyzer>>,
    voice_factory: Arc<dyn VoiceAgentFactory>,
    settings: PipelineSettings,
}

impl AssistantPipelineFactory {
    pub fn new(
        room: Arc<dyn MediaRoom>,
        analyzer: Option<Arc<dyn ObstacleAnalyzer>>,
        voice_factory: Arc<dyn VoiceAgentFactory>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            room,
            analyzer,
            voice_factory,
            settings,
        }
    }
}

impl PipelineFactory for AssistantPipelineFactory {
    fn build(&self) -> PipelineResult<Box<dyn SessionPipeline>> {
        Ok(Box::new(AssistantPipeline::new(
            Arc::clone(&self.room),
            self.analyzer.clone(),
            Arc::clone(&self.voice_factory),
            self.settings.clone(),
        )))
    }
}
