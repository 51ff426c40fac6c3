//! [`MediaRoom`] over a LiveKit room connection.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use ::livekit::prelude::{
    DataPacket, RemoteParticipant, RemoteTrack, Room, RoomEvent as LkRoomEvent, RoomOptions,
    TrackKind, TrackSource,
};
use ::livekit::webrtc::prelude::VideoBuffer;
use ::livekit::webrtc::video_stream::native::NativeVideoStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::room::{FrameStream, MediaError, MediaResult, MediaRoom, RoomEvent};
use crate::core::video::VideoFrame;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A connected LiveKit room.
pub struct LiveKitRoom {
    room: Arc<Room>,
    events: broadcast::Sender<RoomEvent>,
    pump: JoinHandle<()>,
}

impl LiveKitRoom {
    /// Connect to `url` with an access token.
    pub async fn connect(url: &str, token: &str) -> MediaResult<Self> {
        let (room, room_events) = Room::connect(url, token, RoomOptions::default())
            .await
            .map_err(|e| MediaError::Connect(e.to_string()))?;

        info!(room_name = %room.name(), "Connected to room");

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pump = tokio::spawn(pump_events(room_events, events.clone()));

        Ok(Self {
            room: Arc::new(room),
            events,
            pump,
        })
    }

    /// Leave the room.
    pub async fn close(&self) {
        if let Err(e) = self.room.close().await {
            warn!(error = %e, "Error closing room");
        }
    }
}

impl Drop for LiveKitRoom {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Fan LiveKit events out to every subscriber, translated to [`RoomEvent`].
async fn pump_events(
    mut room_events: mpsc::UnboundedReceiver<LkRoomEvent>,
    events: broadcast::Sender<RoomEvent>,
) {
    while let Some(event) = room_events.recv().await {
        let translated = match event {
            LkRoomEvent::TrackSubscribed {
                publication,
                participant,
                ..
            } => RoomEvent::TrackSubscribed {
                participant: participant.identity().as_str().to_string(),
                is_camera: publication.kind() == TrackKind::Video
                    && publication.source() == TrackSource::Camera,
            },
            LkRoomEvent::DataReceived {
                payload,
                topic,
                participant,
                ..
            } => RoomEvent::DataReceived {
                participant: participant.map(|p| p.identity().as_str().to_string()),
                topic,
                payload: Bytes::copy_from_slice(payload.as_slice()),
            },
            LkRoomEvent::ParticipantDisconnected(participant) => {
                RoomEvent::ParticipantDisconnected {
                    participant: participant.identity().as_str().to_string(),
                }
            }
            LkRoomEvent::Disconnected { reason } => RoomEvent::Disconnected {
                reason: format!("{reason:?}"),
            },
            _ => continue,
        };

        // No subscribers is not an error
        let _ = events.send(translated);
    }

    debug!("Room event stream closed");
    let _ = events.send(RoomEvent::Disconnected {
        reason: "event stream closed".to_string(),
    });
}

fn has_subscribed_camera(participant: &RemoteParticipant) -> bool {
    participant.track_publications().values().any(|publication| {
        publication.kind() == TrackKind::Video
            && publication.source() == TrackSource::Camera
            && publication.is_subscribed()
    })
}

#[async_trait]
impl MediaRoom for LiveKitRoom {
    fn name(&self) -> String {
        self.room.name()
    }

    fn camera_participants(&self) -> Vec<String> {
        self.room
            .remote_participants()
            .values()
            .filter(|p| has_subscribed_camera(p))
            .map(|p| p.identity().as_str().to_string())
            .collect()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    async fn open_camera_stream(&self, participant: &str) -> MediaResult<FrameStream> {
        let remote = self
            .room
            .remote_participants()
            .into_values()
            .find(|p| p.identity().as_str() == participant)
            .ok_or_else(|| MediaError::Subscribe(format!("participant {participant} not found")))?;

        let track = remote
            .track_publications()
            .into_values()
            .filter(|p| p.kind() == TrackKind::Video && p.source() == TrackSource::Camera)
            .find_map(|p| p.track())
            .ok_or_else(|| {
                MediaError::Subscribe(format!("participant {participant} has no camera track"))
            })?;

        let RemoteTrack::Video(video) = track else {
            return Err(MediaError::Subscribe("camera track is not video".to_string()));
        };

        let frames = NativeVideoStream::new(video.rtc_track()).map(|frame| {
            let i420 = frame.buffer.to_i420();
            let (y, u, v) = i420.data();
            let (stride_y, stride_u, stride_v) = i420.strides();
            VideoFrame {
                width: i420.width(),
                height: i420.height(),
                y: Bytes::copy_from_slice(y),
                u: Bytes::copy_from_slice(u),
                v: Bytes::copy_from_slice(v),
                stride_y,
                stride_u,
                stride_v,
                timestamp_us: frame.timestamp_us,
            }
        });

        Ok(frames.boxed())
    }

    async fn publish_data(&self, payload: Vec<u8>, topic: &str, reliable: bool) -> MediaResult<()> {
        self.room
            .local_participant()
            .publish_data(DataPacket {
                payload,
                topic: Some(topic.to_string()),
                reliable,
                ..Default::default()
            })
            .await
            .map_err(|e| MediaError::Publish(e.to_string()))
    }
}
