//! Data-channel tool bridge.
//!
//! On start the agent publishes its instructions and the tool catalog on the
//! result topic. It then serves `{id, name, arguments}` requests arriving on
//! the call topic through the [`ToolRouter`] and answers each one with
//! `{id, result}` or `{id, error}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::instructions::agent_instructions;
use super::{VoiceAgent, VoiceError, VoiceProfile, VoiceResult};
use crate::core::room::{MediaRoom, RoomEvent};
use crate::core::tools::{ToolCallResponse, ToolDescriptor, ToolRouter};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ToolBridgeConfig {
    pub call_topic: String,
    pub result_topic: String,
    pub profile: VoiceProfile,
}

impl Default for ToolBridgeConfig {
    fn default() -> Self {
        Self {
            call_topic: "tool_call".to_string(),
            result_topic: "tool_result".to_string(),
            profile: VoiceProfile::default(),
        }
    }
}

/// Incoming tool request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallMessage {
    /// Correlation id echoed in the reply
    pub id: Value,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Restrict the call to one server URL
    #[serde(default)]
    pub server: Option<String>,
}

/// Reply to a [`ToolCallMessage`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolReplyMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolCallResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct CatalogAnnouncement<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    instructions: String,
    llm_model: &'a str,
    llm_voice: &'a str,
    stt_model: &'a str,
    tts_model: &'a str,
    tts_voice_id: &'a str,
    tools: &'a [ToolDescriptor],
}

/// Voice agent that exposes the routed tools over the data channel.
pub struct ToolBridgeAgent {
    room: Arc<dyn MediaRoom>,
    router: Arc<ToolRouter>,
    tools: Vec<ToolDescriptor>,
    config: ToolBridgeConfig,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ToolBridgeAgent {
    pub fn new(
        room: Arc<dyn MediaRoom>,
        router: Arc<ToolRouter>,
        tools: Vec<ToolDescriptor>,
        config: ToolBridgeConfig,
    ) -> Self {
        Self {
            room,
            router,
            tools,
            config,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    async fn announce(&self) -> VoiceResult<()> {
        let profile = &self.config.profile;
        let announcement = CatalogAnnouncement {
            kind: "catalog",
            instructions: agent_instructions(&self.tools),
            llm_model: &profile.llm_model,
            llm_voice: &profile.llm_voice,
            stt_model: &profile.stt_model,
            tts_model: &profile.tts_model,
            tts_voice_id: &profile.tts_voice_id,
            tools: &self.tools,
        };
        let payload =
            serde_json::to_vec(&announcement).map_err(|e| VoiceError::Internal(e.to_string()))?;

        self.room
            .publish_data(payload, &self.config.result_topic, true)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VoiceAgent for ToolBridgeAgent {
    async fn start(&mut self) -> VoiceResult<()> {
        if self.task.is_some() {
            return Err(VoiceError::AlreadyStarted);
        }

        // Subscribe before announcing so early requests are not lost
        let events = self.room.subscribe_events();
        self.announce().await?;

        self.cancel = CancellationToken::new();
        let server = CallServer {
            room: Arc::clone(&self.room),
            router: Arc::clone(&self.router),
            call_topic: self.config.call_topic.clone(),
            result_topic: self.config.result_topic.clone(),
        };
        self.task = Some(tokio::spawn(server.serve(events, self.cancel.clone())));

        info!(
            room_name = %self.room.name(),
            tool_count = self.tools.len(),
            call_topic = %self.config.call_topic,
            "Tool bridge agent started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> VoiceResult<()> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        self.cancel.cancel();
        if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
            warn!("Tool bridge did not stop in time, aborting");
            task.abort();
        }
        info!("Tool bridge agent stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ToolBridgeAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[derive(Clone)]
struct CallServer {
    room: Arc<dyn MediaRoom>,
    router: Arc<ToolRouter>,
    call_topic: String,
    result_topic: String,
}

impl CallServer {
    async fn serve(
        self,
        mut events: tokio::sync::broadcast::Receiver<RoomEvent>,
        cancel: CancellationToken,
    ) {
        let mut calls = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(_) = calls.join_next(), if !calls.is_empty() => {}
                event = events.recv() => match event {
                    Ok(RoomEvent::DataReceived { topic: Some(topic), payload, participant })
                        if topic == self.call_topic =>
                    {
                        debug!(participant = ?participant, "Received tool call request");
                        let server = self.clone();
                        calls.spawn(async move { server.handle(payload).await });
                    }
                    Ok(RoomEvent::Disconnected { .. }) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Tool bridge lagged behind room events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }

        calls.shutdown().await;
    }

    async fn handle(&self, payload: Bytes) {
        let request: ToolCallMessage = match serde_json::from_slice(&payload) {
            Ok(request) => request,
            Err(e) => {
                // Still answer when the id can be recovered
                let id = serde_json::from_slice::<Value>(&payload)
                    .ok()
                    .and_then(|v| v.get("id").cloned());
                match id {
                    Some(id) => self.reply(id, Err(format!("invalid request: {e}"))).await,
                    None => warn!(error = %e, "Dropping malformed tool call request"),
                }
                return;
            }
        };

        let outcome = self
            .router
            .call_tool(&request.name, request.arguments, request.server.as_deref())
            .await
            .map_err(|e| e.to_string());

        self.reply(request.id, outcome).await;
    }

    async fn reply(&self, id: Value, outcome: Result<ToolCallResponse, String>) {
        let (result, error) = match outcome {
            Ok(response) => (Some(response), None),
            Err(e) => (None, Some(e)),
        };
        let reply = ToolReplyMessage {
            kind: "result",
            id,
            result,
            error,
        };

        let payload = match serde_json::to_vec(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize tool reply");
                return;
            }
        };

        if let Err(e) = self.room.publish_data(payload, &self.result_topic, true).await {
            error!(error = %e, topic = %self.result_topic, "Failed to publish tool reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_message_defaults() {
        let msg: ToolCallMessage =
            serde_json::from_value(json!({"id": 7, "name": "list_chats"})).unwrap();
        assert_eq!(msg.id, json!(7));
        assert!(msg.arguments.is_empty());
        assert!(msg.server.is_none());
    }

    #[test]
    fn test_error_reply_shape() {
        let reply = ToolReplyMessage {
            kind: "result",
            id: json!("abc"),
            result: None,
            error: Some("Tool x not found on any tool server".to_string()),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["type"], "result");
        assert_eq!(value["id"], "abc");
        assert!(value.get("result").is_none());
        assert!(value["error"].as_str().unwrap().contains("not found"));
    }
}
