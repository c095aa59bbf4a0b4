//! Broadcast scheduler
//!
//! A single task owns the [`PlaybackEngine`] and the [`ConnectionRegistry`].
//! Control calls, connection changes and broadcast ticks are all handled one
//! at a time inside that task, so no two of them ever interleave. Everything
//! else talks to it through a cloneable [`JourneyHandle`].
//!
//! At most one tick is pending at any time. It carries the engine epoch it
//! was armed under; a tick from an older epoch is dropped instead of firing.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use std::time::Duration;
use crate::core::Track;
use crate::playback::{
    ControlCall, ControlError, JourneyStatus, PlaybackConfig, PlaybackEngine, Schedule,
};
use crate::sink::{ConnectionRegistry, Sink, SinkId};

/// Queue depth for commands sent to the journey task
const COMMAND_QUEUE_SIZE: usize = 100;

enum JourneyCommand {
    Control {
        call: ControlCall,
        reply: oneshot::Sender<Result<&'static str, ControlError>>,
    },
    Status {
        reply: oneshot::Sender<JourneyStatus>,
    },
    Attach {
        sink: Box<dyn Sink>,
        reply: oneshot::Sender<()>,
    },
    Detach {
        id: SinkId,
    },
    Shutdown,
}

/// The next broadcast step waiting for its deadline
#[derive(Debug, Clone, Copy)]
struct ScheduledTick {
    index: usize,
    deadline: Instant,
    epoch: u64,
}

/// Cloneable handle to the journey task
#[derive(Clone)]
pub struct JourneyHandle {
    tx: mpsc::Sender<JourneyCommand>,
}

impl JourneyHandle {
    /// Apply a control call and return its status message
    pub async fn control(&self, call: ControlCall) -> Result<&'static str, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(JourneyCommand::Control { call, reply }).await?;
        rx.await.map_err(|_| ControlError::Unavailable)?
    }

    /// Snapshot of the journey state
    pub async fn status(&self) -> Result<JourneyStatus, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(JourneyCommand::Status { reply }).await?;
        rx.await.map_err(|_| ControlError::Unavailable)
    }

    /// Attach a sink; returns once it will receive the next broadcast
    pub async fn attach(&self, sink: Box<dyn Sink>) -> Result<(), ControlError> {
        let (reply, rx) = oneshot::channel();
        self.send(JourneyCommand::Attach { sink, reply }).await?;
        rx.await.map_err(|_| ControlError::Unavailable)
    }

    /// Detach a sink after its connection closed
    pub async fn detach(&self, id: SinkId) {
        // Nothing left to detach from if the task is gone
        let _ = self.send(JourneyCommand::Detach { id }).await;
    }

    /// Stop the journey task and close every sink
    pub async fn shutdown(&self) {
        let _ = self.send(JourneyCommand::Shutdown).await;
    }

    async fn send(&self, command: JourneyCommand) -> Result<(), ControlError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ControlError::Unavailable)
    }
}

/// The journey task: playback state, connected sinks and the pending tick
pub struct Journey {
    engine: PlaybackEngine,
    registry: ConnectionRegistry,
    pending: Option<ScheduledTick>,
    commands: mpsc::Receiver<JourneyCommand>,
}

impl Journey {
    /// Spawn the journey task on the current runtime
    pub fn spawn(
        track: Track,
        config: PlaybackConfig,
        registry: ConnectionRegistry,
    ) -> (JourneyHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let journey = Self {
            engine: PlaybackEngine::new(track, config),
            registry,
            pending: None,
            commands,
        };
        let task = tokio::spawn(journey.run());
        (JourneyHandle { tx }, task)
    }

    async fn run(mut self) {
        info!(
            "Journey task started ({} points, {:?} policy)",
            self.engine.total_points(),
            self.registry.policy()
        );

        loop {
            let deadline = self.pending.map(|tick| tick.deadline);

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(JourneyCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                _ = wait_for(deadline) => {
                    if let Some(tick) = self.pending.take() {
                        self.fire(tick).await;
                    }
                }
            }
        }

        self.registry.close_all().await;
        info!("Journey task stopped");
    }

    async fn handle(&mut self, command: JourneyCommand) {
        match command {
            JourneyCommand::Control { call, reply } => {
                let result = self.apply(call).await;
                let _ = reply.send(result);
            }
            JourneyCommand::Status { reply } => {
                let stats = self.registry.stats();
                let _ = reply.send(self.engine.status(self.registry.len(), stats.last_attached));
            }
            JourneyCommand::Attach { sink, reply } => {
                self.registry.attach(sink).await;
                let _ = reply.send(());
            }
            JourneyCommand::Detach { id } => {
                self.registry.detach(id);
            }
            JourneyCommand::Shutdown => {}
        }
    }

    async fn apply(&mut self, call: ControlCall) -> Result<&'static str, ControlError> {
        let outcome = match self.engine.apply(call) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Rejected {:?}: {}", call, e);
                return Err(e);
            }
        };
        info!("{:?}: {}", call, outcome.message);

        match outcome.schedule {
            Schedule::Keep => {}
            Schedule::Cancel => self.pending = None,
            Schedule::StepAfter(delay) => self.arm(self.engine.position(), delay),
            Schedule::StepNow => {
                self.pending = None;
                self.step(self.engine.position()).await;
            }
        }

        Ok(outcome.message)
    }

    async fn fire(&mut self, tick: ScheduledTick) {
        if tick.epoch != self.engine.epoch() {
            debug!("Dropping stale tick for index {}", tick.index);
            return;
        }
        self.step(tick.index).await;
    }

    /// Broadcast the coordinate at `index` and arm the tick for the next one
    async fn step(&mut self, index: usize) {
        let Some(emission) = self.engine.step(index) else {
            if index >= self.engine.total_points() {
                info!("Journey reached the end of the track");
            }
            return;
        };

        match emission.coordinate.to_payload() {
            Ok(payload) => {
                let report = self.registry.broadcast(&payload).await;
                debug!(
                    "Broadcast point {} {} to {} sink(s), {} failed",
                    emission.index, payload, report.delivered, report.failed
                );
            }
            Err(e) => warn!("Failed to serialize point {}: {}", emission.index, e),
        }

        self.arm(index + 1, self.engine.tick_interval());
    }

    /// Replace the pending tick with a step at `index` after `delay`
    fn arm(&mut self, index: usize, delay: Duration) {
        self.pending = match Instant::now().checked_add(delay) {
            Some(deadline) => Some(ScheduledTick {
                index,
                deadline,
                epoch: self.engine.epoch(),
            }),
            None => {
                warn!("Cannot schedule point {} {:?} from now", index, delay);
                None
            }
        };
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
