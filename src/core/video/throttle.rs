//! Frame-rate throttle.

use std::time::Duration;

use tokio::time::Instant;

/// Drops frames that arrive sooner than the minimum interval after the last
/// admitted frame. There is no queue: a dropped frame is gone.
#[derive(Debug)]
pub struct FrameThrottle {
    min_interval: Duration,
    last_admitted: Option<Instant>,
}

impl FrameThrottle {
    /// Throttle to at most `fps` frames per second. Non-positive or
    /// non-finite rates admit every frame; rates too small to represent
    /// saturate to the longest interval.
    pub fn new(fps: f64) -> Self {
        let min_interval = if fps.is_finite() && fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / fps).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last_admitted: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Decide whether the frame arriving now is processed.
    ///
    /// The admission time is recorded before returning, so it counts from
    /// the moment of dispatch rather than analysis completion.
    pub fn admit(&mut self) -> bool {
        self.admit_at(Instant::now())
    }

    pub fn admit_at(&mut self, now: Instant) -> bool {
        let too_soon = self
            .last_admitted
            .is_some_and(|last| now.saturating_duration_since(last) < self.min_interval);
        if too_soon {
            return false;
        }
        self.last_admitted = Some(now);
        true
    }
}
