//! Agent worker: joins one room and runs an assistant session in it until the
//! room goes away or the process is interrupted.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::config::{AgentConfig, ConfigError};
use crate::core::pipeline::{
    AssistantPipelineFactory, ToolBridgeFactory, VoiceAgentFactory, build_registry,
};
use crate::core::room::{MediaRoom, RoomEvent};
use crate::core::session::{SessionOrchestrator, SessionResult};
use crate::core::tools::{ToolDescriptor, ToolRouter};
use crate::core::vision::{GeminiVision, GeminiVisionConfig, ObstacleAnalyzer};
use crate::errors::AgentResult;
use crate::livekit::{DEFAULT_TOKEN_TTL, LiveKitRoom, generate_access_token};

/// Why the worker stopped waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    RoomDisconnected(String),
    /// Ctrl-C
    Interrupted,
    /// SIGTERM
    Terminated,
}

/// Build the obstacle analyzer when a Google API key is configured.
pub fn build_analyzer(config: &AgentConfig) -> AgentResult<Option<Arc<dyn ObstacleAnalyzer>>> {
    let Some(api_key) = config.google_api_key.as_deref().filter(|k| !k.is_empty()) else {
        warn!("GOOGLE_API_KEY not set, obstacle detection disabled");
        return Ok(None);
    };

    let vision = GeminiVision::new(GeminiVisionConfig::new(api_key, &config.gemini_model))?;
    Ok(Some(Arc::new(vision)))
}

/// Run discovery against every configured server and return the catalog.
///
/// The local tool server is not started here.
pub async fn discover_tools(config: &AgentConfig) -> AgentResult<Vec<ToolDescriptor>> {
    let settings = config.pipeline_settings();
    let registry = build_registry(&settings, None);
    let router = ToolRouter::with_timeout(registry, settings.tool_request_timeout)?;
    Ok(router.list_tools(None).await)
}

/// Connect to the configured room and serve it until shutdown.
pub async fn run(config: AgentConfig) -> AgentResult<ShutdownReason> {
    let room_name = config
        .livekit_room
        .clone()
        .ok_or(ConfigError::Missing("LIVEKIT_ROOM"))?;
    let (api_key, api_secret) = config.livekit_credentials()?;
    let token = generate_access_token(
        api_key,
        api_secret,
        &room_name,
        &config.agent_identity,
        None,
        DEFAULT_TOKEN_TTL,
    )?;

    let analyzer = build_analyzer(&config)?;

    let room = Arc::new(LiveKitRoom::connect(&config.livekit_url, &token).await?);
    info!(
        room_name = %room_name,
        agent_identity = %config.agent_identity,
        "Agent joined room"
    );

    // Subscribe before starting so an early disconnect is not missed
    let events = room.subscribe_events();

    let voice_factory: Arc<dyn VoiceAgentFactory> = Arc::new(ToolBridgeFactory {
        config: config.bridge_config(),
    });
    let media: Arc<dyn MediaRoom> = room.clone();
    let factory = Arc::new(AssistantPipelineFactory::new(
        media,
        analyzer,
        voice_factory,
        config.pipeline_settings(),
    ));

    let mut session = SessionOrchestrator::new(room_name, factory);
    let served = serve_session(&mut session, events, shutdown_signal()).await;
    room.close().await;

    Ok(served?)
}

/// Start the session, then keep it running until the room disconnects or
/// `shutdown` resolves. The session is stopped on every path.
///
/// Shutdown is honoured while the session is still starting: a slow start
/// is abandoned and whatever it brought up is stopped.
pub async fn serve_session<F>(
    session: &mut SessionOrchestrator,
    events: broadcast::Receiver<RoomEvent>,
    shutdown: F,
) -> SessionResult<ShutdownReason>
where
    F: Future<Output = ShutdownReason>,
{
    let disconnect = wait_for_disconnect(events);
    tokio::pin!(disconnect);
    tokio::pin!(shutdown);

    let early = tokio::select! {
        result = session.start() => {
            result?;
            None
        }
        reason = &mut disconnect => Some(reason),
        reason = &mut shutdown => Some(reason),
    };

    if let Some(reason) = early {
        warn!(reason = ?reason, "Shutdown requested while the session was starting");
        session.stop().await;
        return Ok(reason);
    }

    let reason = tokio::select! {
        reason = &mut disconnect => reason,
        reason = &mut shutdown => reason,
    };
    info!(reason = ?reason, "Shutting down agent");

    session.stop().await;
    Ok(reason)
}

/// Resolve on Ctrl-C, or on SIGTERM where the platform has it.
pub async fn shutdown_signal() -> ShutdownReason {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => ShutdownReason::Interrupted,
        _ = terminate => ShutdownReason::Terminated,
    }
}

/// Wait for the room to report a disconnect.
pub async fn wait_for_disconnect(mut events: broadcast::Receiver<RoomEvent>) -> ShutdownReason {
    loop {
        match events.recv().await {
            Ok(RoomEvent::Disconnected { reason }) => {
                return ShutdownReason::RoomDisconnected(reason);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Room event receiver lagged");
            }
            Err(RecvError::Closed) => {
                return ShutdownReason::RoomDisconnected("event channel closed".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::core::pipeline::{PipelineError, PipelineFactory, PipelineResult, SessionPipeline};
    use crate::core::voice::VoiceError;

    #[derive(Clone, Copy)]
    enum Start {
        Ok,
        Stall,
        Fail,
    }

    struct ScriptedPipeline {
        start: Start,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SessionPipeline for ScriptedPipeline {
        async fn start(&mut self) -> PipelineResult<()> {
            match self.start {
                Start::Ok => Ok(()),
                Start::Stall => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
                Start::Fail => Err(PipelineError::Voice(VoiceError::Internal(
                    "speech service unavailable".to_string(),
                ))),
            }
        }

        async fn stop(&mut self) -> PipelineResult<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedFactory {
        start: Start,
        stopped: Arc<AtomicBool>,
    }

    impl PipelineFactory for ScriptedFactory {
        fn build(&self) -> PipelineResult<Box<dyn SessionPipeline>> {
            Ok(Box::new(ScriptedPipeline {
                start: self.start,
                stopped: Arc::clone(&self.stopped),
            }))
        }
    }

    fn session(start: Start) -> (SessionOrchestrator, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        let factory = Arc::new(ScriptedFactory {
            start,
            stopped: Arc::clone(&stopped),
        });
        (SessionOrchestrator::new("room-1", factory), stopped)
    }

    async fn after(delay: Duration, reason: ShutdownReason) -> ShutdownReason {
        tokio::time::sleep(delay).await;
        reason
    }

    #[tokio::test]
    async fn test_shutdown_while_starting_stops_session() {
        let (mut session, stopped) = session(Start::Stall);
        let (_tx, rx) = broadcast::channel::<RoomEvent>(8);

        let reason = serve_session(
            &mut session,
            rx,
            after(Duration::from_millis(50), ShutdownReason::Terminated),
        )
        .await
        .unwrap();

        assert_eq!(reason, ShutdownReason::Terminated);
        assert!(!session.is_running());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_disconnect_while_starting_stops_session() {
        let (mut session, stopped) = session(Start::Stall);
        let (tx, rx) = broadcast::channel(8);

        let served = tokio::spawn(async move {
            let never = std::future::pending::<ShutdownReason>();
            let reason = serve_session(&mut session, rx, never).await;
            (reason, session.is_running())
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(RoomEvent::Disconnected {
            reason: "ParticipantRemoved".to_string(),
        })
        .unwrap();

        let (reason, running) = served.await.unwrap();
        assert_eq!(
            reason.unwrap(),
            ShutdownReason::RoomDisconnected("ParticipantRemoved".to_string())
        );
        assert!(!running);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_running_session_stops_on_signal() {
        let (mut session, stopped) = session(Start::Ok);
        let (_tx, rx) = broadcast::channel::<RoomEvent>(8);

        let reason = serve_session(
            &mut session,
            rx,
            after(Duration::from_millis(50), ShutdownReason::Interrupted),
        )
        .await
        .unwrap();

        assert_eq!(reason, ShutdownReason::Interrupted);
        assert!(!session.is_running());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_start_is_returned() {
        let (mut session, stopped) = session(Start::Fail);
        let (_tx, rx) = broadcast::channel::<RoomEvent>(8);

        let never = std::future::pending::<ShutdownReason>();
        let result = serve_session(&mut session, rx, never).await;

        assert!(result.is_err());
        assert!(!session.is_running());
        // Rolled back by the orchestrator itself
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_wait_for_disconnect_skips_other_events() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(RoomEvent::DataReceived {
            participant: None,
            topic: Some("tool_call".to_string()),
            payload: Bytes::from_static(b"{}"),
        })
        .unwrap();
        tx.send(RoomEvent::Disconnected {
            reason: "ServerShutdown".to_string(),
        })
        .unwrap();

        assert_eq!(
            wait_for_disconnect(rx).await,
            ShutdownReason::RoomDisconnected("ServerShutdown".to_string())
        );
    }

    #[tokio::test]
    async fn test_wait_for_disconnect_on_closed_channel() {
        let (tx, rx) = broadcast::channel::<RoomEvent>(8);
        drop(tx);

        assert!(matches!(
            wait_for_disconnect(rx).await,
            ShutdownReason::RoomDisconnected(_)
        ));
    }
}
