//! Per-room session orchestration.
//!
//! ```text
//!  Idle ──start()──> Starting ──ok──> Running ──stop()──> Stopping ──> Stopped
//!                       │                                   ^
//!                       └──────────── error (rollback) ─────┘
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use super::pipeline::{PipelineError, PipelineFactory, SessionPipeline};

/// Errors returned from [`SessionOrchestrator::start`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to start assistant pipeline: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Starting => write!(f, "starting"),
            SessionPhase::Running => write!(f, "running"),
            SessionPhase::Stopping => write!(f, "stopping"),
            SessionPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Mutable per-room state. Only the orchestrator writes it.
#[derive(Default)]
pub struct SessionState {
    pub running: bool,
    pub pipeline: Option<Box<dyn SessionPipeline>>,
}

/// Starts and stops the assistant pipeline for one room.
pub struct SessionOrchestrator {
    room_name: String,
    factory: Arc<dyn PipelineFactory>,
    state: SessionState,
    phase: SessionPhase,
}

impl SessionOrchestrator {
    pub fn new(room_name: impl Into<String>, factory: Arc<dyn PipelineFactory>) -> Self {
        Self {
            room_name: room_name.into(),
            factory,
            state: SessionState::default(),
            phase: SessionPhase::Idle,
        }
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Build and start the pipeline.
    ///
    /// On failure everything started so far is stopped before the error is
    /// returned.
    pub async fn start(&mut self) -> SessionResult<()> {
        if self.state.running {
            warn!(room_name = %self.room_name, "Session is already running");
            return Ok(());
        }

        self.state.running = true;
        self.phase = SessionPhase::Starting;

        match self.start_pipeline().await {
            Ok(()) => {
                self.phase = SessionPhase::Running;
                info!(room_name = %self.room_name, "Session started");
                Ok(())
            }
            Err(e) => {
                error!(room_name = %self.room_name, error = %e, "Error starting session");
                self.stop().await;
                Err(e.into())
            }
        }
    }

    async fn start_pipeline(&mut self) -> Result<(), PipelineError> {
        let pipeline = self.factory.build()?;
        // Owned before start so a partial start is still torn down by stop()
        let pipeline = self.state.pipeline.insert(pipeline);
        pipeline.start().await
    }

    /// Stop the pipeline. Never fails; errors are logged.
    pub async fn stop(&mut self) {
        if !self.state.running {
            return;
        }

        self.state.running = false;
        self.phase = SessionPhase::Stopping;

        if let Some(mut pipeline) = self.state.pipeline.take() {
            if let Err(e) = pipeline.stop().await {
                error!(room_name = %self.room_name, error = %e, "Error stopping session");
            }
        }

        self.phase = SessionPhase::Stopped;
        info!(room_name = %self.room_name, "Session stopped");
    }
}
