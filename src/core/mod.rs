pub mod pipeline;
pub mod room;
pub mod session;
pub mod supervisor;
pub mod tools;
pub mod video;
pub mod vision;
pub mod voice;

// Re-export commonly used types for convenience
pub use pipeline::{
    AssistantPipeline, AssistantPipelineFactory, PipelineError, PipelineFactory, PipelineResult,
    PipelineSettings, SessionPipeline, ToolBridgeFactory, VoiceAgentFactory,
};

pub use room::{FrameStream, MediaError, MediaResult, MediaRoom, RoomEvent};

pub use session::{SessionError, SessionOrchestrator, SessionPhase, SessionResult};

pub use supervisor::{ProcessConfig, SupervisorState, ToolServerSupervisor};

pub use tools::{
    ServerRegistry, ToolCallResponse, ToolDescriptor, ToolError, ToolResult, ToolRouter,
    ToolServerConfig,
};

pub use video::{VideoFrame, VideoPipeline, VideoPipelineConfig, VideoPipelineStats};

pub use vision::{
    DetectionResult, GeminiVision, GeminiVisionConfig, Obstacle, ObstacleAnalyzer, VisionError,
    VisionResult,
};

pub use voice::{ToolBridgeAgent, ToolBridgeConfig, VoiceAgent, VoiceError, VoiceResult};
