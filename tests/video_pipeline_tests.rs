//! Video Pipeline Integration Tests
//!
//! Drives the obstacle pipeline through an in-memory room and checks
//! sampling, publication and shutdown behavior.

mod fixtures;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use lumen_agent::core::room::{MediaRoom, RoomEvent};
use lumen_agent::core::video::{VideoFrame, VideoPipeline, VideoPipelineConfig};
use lumen_agent::core::vision::{DEGRADED_RECOMMENDATION, DetectionResult, ObstacleAnalyzer};

use fixtures::{
    FailingAnalyzer, FakeRoom, GatedAnalyzer, StaticAnalyzer, door_detection, grey_frame,
};

const TOPIC: &str = "obstacle_detection";
const WAIT: Duration = Duration::from_secs(5);

fn test_config(fps: f64) -> VideoPipelineConfig {
    VideoPipelineConfig {
        fps,
        wait_timeout: Duration::from_secs(2),
        stop_timeout: Duration::from_secs(2),
        ..VideoPipelineConfig::default()
    }
}

fn pipeline(
    room: &Arc<FakeRoom>,
    analyzer: Arc<dyn ObstacleAnalyzer>,
    config: VideoPipelineConfig,
) -> VideoPipeline {
    let media: Arc<dyn MediaRoom> = room.clone();
    VideoPipeline::new(media, analyzer, config)
}

async fn wait_until_stopped(pipeline: &VideoPipeline) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while pipeline.is_running() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}

#[tokio::test]
async fn test_publishes_detection_for_each_admitted_frame() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let frames = room.add_camera("user");
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut video = pipeline(&room, analyzer.clone(), test_config(1000.0));
    video.start();
    assert!(video.is_running());

    for _ in 0..3 {
        frames.send(grey_frame()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    drop(frames);

    let packets = room.wait_for_published(TOPIC, 3, WAIT).await;
    assert_eq!(packets.len(), 3);
    assert_eq!(analyzer.calls(), 3);

    for packet in &packets {
        assert!(packet.reliable);
        let result: DetectionResult = serde_json::from_slice(&packet.payload).unwrap();
        assert_eq!(result.obstacles.len(), 1);
        assert_eq!(result.obstacles[0].obstacle_type, "door");
        assert!(!result.is_degraded());

        let json = packet.json();
        assert_eq!(json["obstacles"][0]["type"], "door");
        assert_eq!(json["obstacles"][0]["distance_estimate"], "close");
        assert!(json.get("error").is_none());
    }

    // Stream ended on its own
    assert!(wait_until_stopped(&video).await);
    video.stop().await;
    assert_eq!(video.stats().published(), 3);
}

#[tokio::test]
async fn test_burst_is_throttled_to_one_frame() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let frames = room.add_camera("user");
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut video = pipeline(&room, analyzer.clone(), test_config(1.0));
    video.start();

    // Five frames well inside one throttle interval
    for _ in 0..5 {
        frames.send(grey_frame()).unwrap();
    }
    drop(frames);

    assert!(wait_until_stopped(&video).await);
    let stats = video.stats();
    assert_eq!(stats.frames_received.load(Ordering::Relaxed), 5);
    assert_eq!(stats.dispatched(), 1);
    assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 4);
    assert_eq!(room.published_on(TOPIC).len(), 1);

    video.stop().await;
}

#[tokio::test]
async fn test_analyzer_failure_publishes_degraded_result() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let frames = room.add_camera("user");

    let mut video = pipeline(&room, Arc::new(FailingAnalyzer), test_config(1000.0));
    video.start();

    frames.send(grey_frame()).unwrap();
    drop(frames);

    let packets = room.wait_for_published(TOPIC, 1, WAIT).await;
    assert_eq!(packets.len(), 1);

    let result: DetectionResult = serde_json::from_slice(&packets[0].payload).unwrap();
    assert!(result.obstacles.is_empty());
    assert_eq!(result.recommendation, DEGRADED_RECOMMENDATION);
    assert!(result.error.unwrap().contains("503"));

    video.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_publishes_degraded_result() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let frames = room.add_camera("user");
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut video = pipeline(&room, analyzer.clone(), test_config(1000.0));
    video.start();

    let mut frame = grey_frame();
    frame.y = bytes::Bytes::from_static(&[0u8; 4]);
    frames.send(frame).unwrap();
    drop(frames);

    let packets = room.wait_for_published(TOPIC, 1, WAIT).await;
    assert_eq!(packets.len(), 1);

    let result: DetectionResult = serde_json::from_slice(&packets[0].payload).unwrap();
    assert!(result.is_degraded());
    // Encoding failed, so the analyzer was never consulted
    assert_eq!(analyzer.calls(), 0);

    video.stop().await;
}

#[tokio::test]
async fn test_publish_failure_is_counted_not_fatal() {
    let room = Arc::new(FakeRoom::new("room-1"));
    room.set_fail_publish(true);
    let frames = room.add_camera("user");
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut video = pipeline(&room, analyzer.clone(), test_config(1000.0));
    video.start();

    frames.send(grey_frame()).unwrap();
    let stats = video.stats();
    let deadline = tokio::time::Instant::now() + WAIT;
    while stats.publish_failures.load(Ordering::Relaxed) == 0
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    room.set_fail_publish(false);
    frames.send(grey_frame()).unwrap();
    drop(frames);

    let packets = room.wait_for_published(TOPIC, 1, WAIT).await;
    assert_eq!(packets.len(), 1);
    assert!(wait_until_stopped(&video).await);
    assert_eq!(stats.publish_failures.load(Ordering::Relaxed), 1);

    video.stop().await;
}

#[tokio::test]
async fn test_waits_for_camera_announced_later() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut video = pipeline(&room, analyzer.clone(), test_config(1000.0));
    video.start();

    assert!(room.wait_for_subscriber(WAIT).await);
    let frames = room.announce_camera("late-user");
    frames.send(grey_frame()).unwrap();
    drop(frames);

    let packets = room.wait_for_published(TOPIC, 1, WAIT).await;
    assert_eq!(packets.len(), 1);

    video.stop().await;
}

#[tokio::test]
async fn test_non_camera_tracks_are_ignored() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut config = test_config(1000.0);
    config.wait_timeout = Duration::from_millis(200);
    let mut video = pipeline(&room, analyzer.clone(), config);
    video.start();

    assert!(room.wait_for_subscriber(WAIT).await);
    room.emit(RoomEvent::TrackSubscribed {
        participant: "user".to_string(),
        is_camera: false,
    });

    assert!(wait_until_stopped(&video).await);
    assert_eq!(video.stats().frames_received.load(Ordering::Relaxed), 0);

    video.stop().await;
}

#[tokio::test]
async fn test_no_camera_participant_times_out() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut config = test_config(2.0);
    config.wait_timeout = Duration::from_millis(100);
    let mut video = pipeline(&room, analyzer.clone(), config);
    video.start();

    assert!(wait_until_stopped(&video).await);
    assert!(room.published().is_empty());
    assert_eq!(analyzer.calls(), 0);

    video.stop().await;
}

#[tokio::test]
async fn test_room_disconnect_ends_camera_wait() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut config = test_config(2.0);
    config.wait_timeout = Duration::from_secs(60);
    let mut video = pipeline(&room, analyzer, config);
    video.start();

    assert!(room.wait_for_subscriber(WAIT).await);
    room.emit(RoomEvent::Disconnected {
        reason: "ServerShutdown".to_string(),
    });

    assert!(wait_until_stopped(&video).await);
    video.stop().await;
}

#[tokio::test]
async fn test_capacity_limit_drops_frames() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let frames = room.add_camera("user");
    let analyzer = Arc::new(GatedAnalyzer::new());

    let mut config = test_config(1000.0);
    config.max_in_flight = 1;
    let mut video = pipeline(&room, analyzer.clone(), config);
    video.start();

    frames.send(grey_frame()).unwrap();
    let deadline = tokio::time::Instant::now() + WAIT;
    while analyzer.started() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(analyzer.started(), 1);

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        frames.send(grey_frame()).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = video.stats();
    assert_eq!(stats.dispatched(), 1);
    assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 3);

    analyzer.release(1);
    let packets = room.wait_for_published(TOPIC, 1, WAIT).await;
    assert_eq!(packets.len(), 1);

    video.stop().await;
}

#[tokio::test]
async fn test_stop_cancels_in_flight_analysis() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let frames = room.add_camera("user");
    let analyzer = Arc::new(GatedAnalyzer::new());

    let mut video = pipeline(&room, analyzer.clone(), test_config(1000.0));
    video.start();

    frames.send(grey_frame()).unwrap();
    let deadline = tokio::time::Instant::now() + WAIT;
    while analyzer.started() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(analyzer.started(), 1);

    tokio::time::timeout(WAIT, video.stop())
        .await
        .expect("stop returns promptly");
    assert!(!video.is_running());

    // Releasing after stop must not produce a late publication
    analyzer.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(room.published_on(TOPIC).is_empty());

    // Second stop is a no-op
    video.stop().await;
    drop(frames);
}

#[tokio::test]
async fn test_frames_with_odd_dimensions_are_encoded() {
    let room = Arc::new(FakeRoom::new("room-1"));
    let frames = room.add_camera("user");
    let analyzer = Arc::new(StaticAnalyzer::new(door_detection()));

    let mut video = pipeline(&room, analyzer.clone(), test_config(1000.0));
    video.start();

    frames.send(VideoFrame::solid(15, 9, 200, 100, 150)).unwrap();
    drop(frames);

    let packets = room.wait_for_published(TOPIC, 1, WAIT).await;
    assert_eq!(packets.len(), 1);
    assert_eq!(analyzer.calls(), 1);

    video.stop().await;
}
