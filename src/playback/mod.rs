pub mod engine;
pub mod scheduler;

pub use engine::{PlaybackEngine, Schedule};
pub use scheduler::{Journey, JourneyHandle};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use std::time::Duration;

/// Longest wait the scheduler arms, for a start delay or a tick interval
pub const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Convert a wait in seconds to a [`Duration`] the scheduler can arm
///
/// `None` for negative, non-finite or longer-than-[`MAX_WAIT`] waits.
pub fn wait_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|wait| *wait <= MAX_WAIT)
}

/// Coarse playback phase derived from the running/paused flags
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    Idle,
    Running,
    Paused,
}

/// Process-wide playback defaults
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Fixes per second; 2.0 replays at twice the recorded rate
    pub speed: f64,
    /// Wait before the first fix when a start call gives no delay
    pub start_delay_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            start_delay_seconds: 0.0,
        }
    }
}

/// Mutable journey state, owned by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current_index: usize,
    pub running: bool,
    pub paused: bool,
    pub speed_multiplier: f64,
    pub start_delay_seconds: f64,
}

impl PlaybackState {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            current_index: 0,
            running: false,
            paused: false,
            speed_multiplier: config.speed,
            start_delay_seconds: config.start_delay_seconds,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        match (self.running, self.paused) {
            (false, _) => PlaybackPhase::Idle,
            (true, false) => PlaybackPhase::Running,
            (true, true) => PlaybackPhase::Paused,
        }
    }
}

/// A control call, already decoded from its wire form
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCall {
    Start { delay_seconds: Option<f64> },
    Stop,
    Reset,
    Resume,
    SetSpeed { speed: f64 },
}

/// Snapshot of the journey reported to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyStatus {
    pub phase: PlaybackPhase,
    pub current_index: usize,
    pub track_length: usize,
    pub running: bool,
    pub paused: bool,
    pub speed_multiplier: f64,
    pub start_delay_seconds: f64,
    pub connections: usize,
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// Rejected control calls
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("speed must be positive and at least one fix per week, got {0}")]
    InvalidSpeed(f64),

    #[error("delaySeconds must be between 0 and one week, got {0}")]
    InvalidDelay(f64),

    #[error("journey task is not running")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_duration_bounds() {
        assert_eq!(wait_duration(0.0), Some(Duration::ZERO));
        assert_eq!(wait_duration(1.5), Some(Duration::from_millis(1500)));
        assert_eq!(wait_duration(MAX_WAIT.as_secs_f64()), Some(MAX_WAIT));

        assert!(wait_duration(-0.5).is_none());
        assert!(wait_duration(f64::NAN).is_none());
        assert!(wait_duration(f64::INFINITY).is_none());
        assert!(wait_duration(1e20).is_none());
        assert!(wait_duration(MAX_WAIT.as_secs_f64() + 1.0).is_none());
    }
}
