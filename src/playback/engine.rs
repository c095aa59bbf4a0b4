use chrono::{DateTime, Utc};
use std::time::Duration;
use crate::core::{Coordinate, Track};
use crate::playback::{
    wait_duration, ControlCall, ControlError, JourneyStatus, PlaybackConfig, PlaybackPhase,
    PlaybackState, MAX_WAIT,
};

/// What the scheduler has to do with its pending tick after a transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    /// Leave the pending tick alone
    Keep,
    /// Drop the pending tick
    Cancel,
    /// Replace the pending tick with a step at the current index after a delay
    StepAfter(Duration),
    /// Run a step at the current index right away
    StepNow,
}

/// Result of applying a control call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub message: &'static str,
    pub schedule: Schedule,
}

impl Outcome {
    fn new(message: &'static str, schedule: Schedule) -> Self {
        Self { message, schedule }
    }

    fn no_op(message: &'static str) -> Self {
        Self::new(message, Schedule::Keep)
    }
}

/// One coordinate to broadcast, produced by a step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    pub index: usize,
    pub coordinate: Coordinate,
}

/// Playback state machine for a single journey over a track
///
/// The engine never touches timers. Transitions report a [`Schedule`] and the
/// scheduler owns the actual tick.
pub struct PlaybackEngine {
    track: Track,
    state: PlaybackState,
    epoch: u64,
}

impl PlaybackEngine {
    pub fn new(track: Track, config: PlaybackConfig) -> Self {
        Self {
            track,
            state: PlaybackState::new(config),
            epoch: 0,
        }
    }

    /// Get current playback position (index into the track)
    pub fn position(&self) -> usize {
        self.state.current_index
    }

    /// Get total number of coordinates
    pub fn total_points(&self) -> usize {
        self.track.len()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.state.phase()
    }

    /// Get current playback speed
    pub fn speed(&self) -> f64 {
        self.state.speed_multiplier
    }

    /// Generation of the tick chain; bumped whenever a pending tick must not fire
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Interval until the next step, from the speed at the time of asking
    pub fn tick_interval(&self) -> Duration {
        wait_duration(1.0 / self.speed()).unwrap_or(MAX_WAIT)
    }

    /// Apply a decoded control call
    pub fn apply(&mut self, call: ControlCall) -> Result<Outcome, ControlError> {
        match call {
            ControlCall::Start { delay_seconds } => self.start(delay_seconds),
            ControlCall::Stop => Ok(self.stop()),
            ControlCall::Reset => Ok(self.reset()),
            ControlCall::Resume => Ok(self.resume()),
            ControlCall::SetSpeed { speed } => self.set_speed(speed),
        }
    }

    /// Start the journey from the first coordinate
    ///
    /// An explicit delay, zero included, wins over the configured default.
    pub fn start(&mut self, delay_seconds: Option<f64>) -> Result<Outcome, ControlError> {
        let seconds = delay_seconds.unwrap_or(self.state.start_delay_seconds);
        let delay = wait_duration(seconds).ok_or(ControlError::InvalidDelay(seconds))?;

        if self.state.running {
            return Ok(Outcome::no_op("Journey is already running"));
        }

        self.state.running = true;
        self.state.paused = false;
        self.state.current_index = 0;
        self.epoch += 1;

        Ok(Outcome::new(
            "Journey started",
            Schedule::StepAfter(delay),
        ))
    }

    /// Pause a running journey
    pub fn stop(&mut self) -> Outcome {
        if self.state.running && !self.state.paused {
            self.state.paused = true;
            self.epoch += 1;
            return Outcome::new("Journey stopped", Schedule::Cancel);
        }
        Outcome::no_op("Journey is not running or already stopped")
    }

    /// Return to idle at the first coordinate, whatever the current state
    pub fn reset(&mut self) -> Outcome {
        self.state.paused = true;
        self.state.running = false;
        self.state.current_index = 0;
        self.epoch += 1;
        Outcome::new("Journey reset", Schedule::Cancel)
    }

    /// Continue a paused journey, re-emitting the coordinate it paused on
    pub fn resume(&mut self) -> Outcome {
        if self.state.running && self.state.paused {
            self.state.paused = false;
            self.epoch += 1;
            return Outcome::new("Journey resumed", Schedule::StepNow);
        }
        Outcome::no_op("Journey is not paused or not running")
    }

    /// Set playback speed for the ticks armed from now on
    pub fn set_speed(&mut self, speed: f64) -> Result<Outcome, ControlError> {
        // Infinite speed would collapse the interval to zero
        if !speed.is_finite() || speed <= 0.0 || wait_duration(1.0 / speed).is_none() {
            return Err(ControlError::InvalidSpeed(speed));
        }
        self.state.speed_multiplier = speed;
        Ok(Outcome::no_op("Speed updated"))
    }

    /// Run one broadcast step at `index`
    ///
    /// Returns `None` when paused or past the end of the track; the chain
    /// then simply stops.
    pub fn step(&mut self, index: usize) -> Option<Emission> {
        if self.state.paused {
            return None;
        }
        let coordinate = *self.track.get(index)?;
        self.state.current_index = index;
        Some(Emission { index, coordinate })
    }

    /// Snapshot of the state, plus connection facts the engine does not own
    pub fn status(
        &self,
        connections: usize,
        last_connected_at: Option<DateTime<Utc>>,
    ) -> JourneyStatus {
        JourneyStatus {
            phase: self.phase(),
            current_index: self.state.current_index,
            track_length: self.track.len(),
            running: self.state.running,
            paused: self.state.paused,
            speed_multiplier: self.state.speed_multiplier,
            start_delay_seconds: self.state.start_delay_seconds,
            connections,
            last_connected_at,
        }
    }
}
