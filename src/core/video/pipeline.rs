//! Throttled obstacle-detection pipeline over a participant's camera.
//!
//! The pipeline waits for a remote participant publishing a camera track,
//! samples that stream at a bounded rate and hands every admitted frame to
//! its own analysis task. Results are published on a data topic as they
//! complete, in no particular order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::encoder::encode_jpeg;
use super::frame::VideoFrame;
use super::throttle::FrameThrottle;
use crate::core::room::{MediaRoom, RoomEvent};
use crate::core::vision::{DetectionResult, ObstacleAnalyzer};

/// Settings for [`VideoPipeline`].
#[derive(Debug, Clone)]
pub struct VideoPipelineConfig {
    /// Maximum analyzed frames per second
    pub fps: f64,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Data topic detections are published on
    pub topic: String,
    /// How long to wait for a camera participant
    pub wait_timeout: Duration,
    /// Maximum concurrently running analysis tasks; extra frames are dropped
    pub max_in_flight: usize,
    /// Upper bound on the shutdown wait
    pub stop_timeout: Duration,
}

impl Default for VideoPipelineConfig {
    fn default() -> Self {
        Self {
            fps: 2.0,
            jpeg_quality: 85,
            topic: "obstacle_detection".to_string(),
            wait_timeout: Duration::from_secs(30),
            max_in_flight: 4,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Frame counters, readable while the pipeline runs.
#[derive(Debug, Default)]
pub struct VideoPipelineStats {
    pub frames_received: AtomicU64,
    pub frames_dispatched: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub results_published: AtomicU64,
    pub publish_failures: AtomicU64,
}

impl VideoPipelineStats {
    pub fn dispatched(&self) -> u64 {
        self.frames_dispatched.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.results_published.load(Ordering::Relaxed)
    }
}

struct FrameWorker {
    room: Arc<dyn MediaRoom>,
    analyzer: Arc<dyn ObstacleAnalyzer>,
    config: VideoPipelineConfig,
    stats: Arc<VideoPipelineStats>,
}

/// Background camera sampler publishing obstacle detections.
pub struct VideoPipeline {
    worker: Arc<FrameWorker>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl VideoPipeline {
    pub fn new(
        room: Arc<dyn MediaRoom>,
        analyzer: Arc<dyn ObstacleAnalyzer>,
        config: VideoPipelineConfig,
    ) -> Self {
        Self {
            worker: Arc::new(FrameWorker {
                room,
                analyzer,
                config,
                stats: Arc::new(VideoPipelineStats::default()),
            }),
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Arc<VideoPipelineStats> {
        Arc::clone(&self.worker.stats)
    }

    /// Spawn the background sampling task.
    pub fn start(&mut self) {
        if self.is_running() || self.task.is_some() {
            warn!("Video pipeline is already running");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        self.cancel = CancellationToken::new();

        let worker = Arc::clone(&self.worker);
        let running = Arc::clone(&self.running);
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            worker.run(cancel).await;
            running.store(false, Ordering::SeqCst);
        }));

        info!(
            room_name = %self.worker.room.name(),
            fps = self.worker.config.fps,
            "Video pipeline started"
        );
    }

    /// Cancel sampling and in-flight analyses, waiting a bounded time.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(mut task) = self.task.take() else {
            return;
        };

        self.cancel.cancel();
        match tokio::time::timeout(self.worker.config.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => error!(error = %e, "Video pipeline task failed"),
            Err(_) => {
                warn!("Video pipeline did not stop in time, aborting");
                task.abort();
            }
        }

        info!(
            dispatched = self.worker.stats.dispatched(),
            published = self.worker.stats.published(),
            "Video pipeline stopped"
        );
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl FrameWorker {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let participant = tokio::select! {
            _ = cancel.cancelled() => return,
            participant = self.wait_for_camera() => participant,
        };
        let Some(participant) = participant else {
            warn!("No video participant found, stopping video pipeline");
            return;
        };

        let mut frames = match self.room.open_camera_stream(&participant).await {
            Ok(frames) => frames,
            Err(e) => {
                error!(participant = %participant, error = %e, "Could not subscribe to video track");
                return;
            }
        };
        info!(participant = %participant, "Subscribed to camera track");

        let mut throttle = FrameThrottle::new(self.config.fps);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Frame analysis task panicked");
                        }
                    }
                }
                frame = frames.next() => {
                    let Some(frame) = frame else {
                        info!(participant = %participant, "Camera stream ended");
                        break;
                    };
                    self.stats.frames_received.fetch_add(1, Ordering::Relaxed);

                    if tasks.len() >= self.config.max_in_flight.max(1) {
                        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(in_flight = tasks.len(), "Analysis capacity full, dropping frame");
                        continue;
                    }
                    if !throttle.admit() {
                        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }

                    self.stats.frames_dispatched.fetch_add(1, Ordering::Relaxed);
                    let worker = Arc::clone(&self);
                    tasks.spawn(async move { worker.process_frame(frame).await });
                }
            }
        }

        if !cancel.is_cancelled() {
            // Stream ended on its own: let outstanding analyses publish
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = async { while tasks.join_next().await.is_some() {} } => {}
            }
        }

        // Aborts and awaits every outstanding analysis
        tasks.shutdown().await;
    }

    async fn wait_for_camera(&self) -> Option<String> {
        // Subscribe before scanning so a track arriving in between is not missed
        let mut events = self.room.subscribe_events();

        if let Some(participant) = self.room.camera_participants().into_iter().next() {
            return Some(participant);
        }

        let wait = async {
            loop {
                match events.recv().await {
                    Ok(RoomEvent::TrackSubscribed {
                        participant,
                        is_camera: true,
                    }) => return Some(participant),
                    Ok(RoomEvent::Disconnected { reason }) => {
                        debug!(reason = %reason, "Room disconnected while waiting for camera");
                        return None;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Room events lagged, rescanning participants");
                        if let Some(participant) =
                            self.room.camera_participants().into_iter().next()
                        {
                            return Some(participant);
                        }
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        };

        match tokio::time::timeout(self.config.wait_timeout, wait).await {
            Ok(participant) => participant,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.wait_timeout.as_secs_f64(),
                    "Timeout waiting for video participant"
                );
                None
            }
        }
    }

    async fn process_frame(&self, frame: VideoFrame) {
        let result = self.analyze(frame).await;
        self.publish(&result).await;
    }

    /// Never fails: every error becomes a degraded result.
    async fn analyze(&self, frame: VideoFrame) -> DetectionResult {
        let quality = self.config.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await;

        let jpeg = match encoded {
            Ok(Ok(jpeg)) => jpeg,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to encode frame");
                return DetectionResult::degraded(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "Frame encoding task failed");
                return DetectionResult::degraded(e.to_string());
            }
        };

        match self.analyzer.analyze(&jpeg).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Error detecting obstacles");
                DetectionResult::degraded(e.to_string())
            }
        }
    }

    async fn publish(&self, result: &DetectionResult) {
        let payload = match serde_json::to_vec(result) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize detection result");
                return;
            }
        };

        match self.room.publish_data(payload, &self.config.topic, true).await {
            Ok(()) => {
                self.stats.results_published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    obstacle_count = result.obstacles.len(),
                    topic = %self.config.topic,
                    "Published obstacle detection result"
                );
            }
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, topic = %self.config.topic, "Error publishing detection result");
            }
        }
    }
}
