//! Media-room abstraction consumed by the video pipeline and voice agent.
//!
//! The realtime session (LiveKit in production) is reached only through
//! [`MediaRoom`], so pipelines can be driven by an in-memory room in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::broadcast;

use super::video::VideoFrame;

/// Errors raised by a media room.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Room not connected")]
    NotConnected,

    #[error("Failed to connect to room: {0}")]
    Connect(String),

    #[error("Failed to subscribe to track: {0}")]
    Subscribe(String),

    #[error("Failed to publish data: {0}")]
    Publish(String),
}

/// Result type for media-room operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Events surfaced by a room, fanned out to every subscriber.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// A remote track was subscribed
    TrackSubscribed {
        participant: String,
        is_camera: bool,
    },

    /// A data packet arrived
    DataReceived {
        participant: Option<String>,
        topic: Option<String>,
        payload: Bytes,
    },

    /// A remote participant left
    ParticipantDisconnected { participant: String },

    /// The local connection to the room ended
    Disconnected { reason: String },
}

/// Stream of decoded camera frames.
pub type FrameStream = BoxStream<'static, VideoFrame>;

/// Narrow view of a realtime media room.
#[async_trait]
pub trait MediaRoom: Send + Sync {
    /// Room name, used for logging.
    fn name(&self) -> String;

    /// Identities of remote participants with a subscribed camera track.
    fn camera_participants(&self) -> Vec<String>;

    /// Subscribe to room events. Dropping the receiver unsubscribes.
    fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent>;

    /// Open the camera frame stream of a participant.
    async fn open_camera_stream(&self, participant: &str) -> MediaResult<FrameStream>;

    /// Send a data packet on a labeled topic to every participant.
    async fn publish_data(&self, payload: Vec<u8>, topic: &str, reliable: bool) -> MediaResult<()>;
}
