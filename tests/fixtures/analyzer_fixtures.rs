//! Scripted obstacle analyzers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use lumen_agent::core::vision::{
    DetectionResult, DistanceEstimate, Location, Obstacle, ObstacleAnalyzer, Severity,
    VisionError, VisionResult, now_seconds,
};

pub fn door_detection() -> DetectionResult {
    DetectionResult {
        obstacles: vec![Obstacle {
            obstacle_type: "door".to_string(),
            location: Location::new(0.5, 0.4),
            distance_estimate: DistanceEstimate::Close,
            description: "Closed door ahead".to_string(),
            severity: Severity::Medium,
        }],
        recommendation: "Stop, the door is closed".to_string(),
        timestamp: now_seconds(),
        error: None,
    }
}

/// Always returns the same result and counts calls.
pub struct StaticAnalyzer {
    result: DetectionResult,
    calls: AtomicUsize,
}

impl StaticAnalyzer {
    pub fn new(result: DetectionResult) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObstacleAnalyzer for StaticAnalyzer {
    async fn analyze(&self, jpeg: &[u8]) -> VisionResult<DetectionResult> {
        assert!(jpeg.starts_with(&[0xFF, 0xD8]), "analyzer expects JPEG input");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Fails every request.
pub struct FailingAnalyzer;

#[async_trait]
impl ObstacleAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _jpeg: &[u8]) -> VisionResult<DetectionResult> {
        Err(VisionError::Status {
            status: 503,
            body: "model overloaded".to_string(),
        })
    }
}

/// Holds every call until a permit is released.
pub struct GatedAnalyzer {
    gate: Semaphore,
    started: AtomicUsize,
}

impl GatedAnalyzer {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObstacleAnalyzer for GatedAnalyzer {
    async fn analyze(&self, _jpeg: &[u8]) -> VisionResult<DetectionResult> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| VisionError::Request(e.to_string()))?;
        permit.forget();
        Ok(door_detection())
    }
}
