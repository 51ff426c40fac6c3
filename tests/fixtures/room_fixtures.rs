//! In-memory [`MediaRoom`] for driving pipelines without a media server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use lumen_agent::core::room::{FrameStream, MediaError, MediaResult, MediaRoom, RoomEvent};
use lumen_agent::core::video::VideoFrame;

/// A data packet captured by [`FakeRoom::publish_data`].
#[derive(Debug, Clone)]
pub struct PublishedPacket {
    pub topic: String,
    pub reliable: bool,
    pub payload: Vec<u8>,
}

impl PublishedPacket {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("published payload is JSON")
    }
}

pub struct FakeRoom {
    name: String,
    events: broadcast::Sender<RoomEvent>,
    cameras: Mutex<Vec<String>>,
    sources: Mutex<HashMap<String, mpsc::UnboundedReceiver<VideoFrame>>>,
    published: Mutex<Vec<PublishedPacket>>,
    fail_publish: AtomicBool,
}

impl FakeRoom {
    pub fn new(name: &str) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            name: name.to_string(),
            events,
            cameras: Mutex::new(Vec::new()),
            sources: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
        }
    }

    /// Register a participant whose camera is already subscribed.
    pub fn add_camera(&self, participant: &str) -> mpsc::UnboundedSender<VideoFrame> {
        let sender = self.register_source(participant);
        self.cameras.lock().push(participant.to_string());
        sender
    }

    /// Register a camera and announce it through a `TrackSubscribed` event.
    pub fn announce_camera(&self, participant: &str) -> mpsc::UnboundedSender<VideoFrame> {
        let sender = self.register_source(participant);
        self.emit(RoomEvent::TrackSubscribed {
            participant: participant.to_string(),
            is_camera: true,
        });
        sender
    }

    fn register_source(&self, participant: &str) -> mpsc::UnboundedSender<VideoFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sources.lock().insert(participant.to_string(), rx);
        tx
    }

    pub fn emit(&self, event: RoomEvent) {
        let _ = self.events.send(event);
    }

    /// Deliver a data packet as if a remote participant sent it.
    pub fn deliver_data(&self, topic: &str, payload: impl Into<Bytes>) {
        self.emit(RoomEvent::DataReceived {
            participant: Some("user".to_string()),
            topic: Some(topic.to_string()),
            payload: payload.into(),
        });
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn published(&self) -> Vec<PublishedPacket> {
        self.published.lock().clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<PublishedPacket> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// Poll until `count` packets were published on `topic` or `limit` passes.
    pub async fn wait_for_published(
        &self,
        topic: &str,
        count: usize,
        limit: Duration,
    ) -> Vec<PublishedPacket> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let packets = self.published_on(topic);
            if packets.len() >= count || tokio::time::Instant::now() >= deadline {
                return packets;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until at least one event subscriber exists.
    pub async fn wait_for_subscriber(&self, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while self.subscriber_count() == 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

#[async_trait]
impl MediaRoom for FakeRoom {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn camera_participants(&self) -> Vec<String> {
        self.cameras.lock().clone()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    async fn open_camera_stream(&self, participant: &str) -> MediaResult<FrameStream> {
        let rx = self
            .sources
            .lock()
            .remove(participant)
            .ok_or_else(|| MediaError::Subscribe(format!("no camera for {participant}")))?;

        let frames = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        Ok(frames.boxed())
    }

    async fn publish_data(&self, payload: Vec<u8>, topic: &str, reliable: bool) -> MediaResult<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MediaError::Publish("publish disabled".to_string()));
        }
        self.published.lock().push(PublishedPacket {
            topic: topic.to_string(),
            reliable,
            payload,
        });
        Ok(())
    }
}

/// A small well-formed grey frame.
pub fn grey_frame() -> VideoFrame {
    VideoFrame::solid(16, 16, 128, 128, 128)
}
