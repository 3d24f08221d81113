//! Asynchronous goal-convergence for a single axis.
//!
//! A [`MotionSynchronizer`] drives one axis towards a goal and tells waiters
//! when it got there. It knows nothing about the device beyond two closures:
//! one that commands a goal and one that samples the current value.
//!
//! ```text
//!           request(goal)              |sample - goal| <= tolerance
//!   Idle ─────────────────▶ Moving ───────────────────────────────▶ Converged
//!     ▲                       │  ▲                                     │
//!     │ error / cancel        │  └──────────── request(new goal) ──────┘
//!     └───────────────────────┘
//! ```
//!
//! While Moving, a polling task samples the value every `poll_interval`. The
//! task exits on convergence, on a hardware error, on timeout or on shutdown,
//! and the next request starts a fresh one.
//!
//! # Example
//!
//! ```rust,ignore
//! let stage: Arc<dyn Movable> = inventory.get_movable("ZStage").unwrap();
//! let sync = MotionSynchronizer::for_stage("ZStage", stage, SyncSettings::default());
//! sync.move_to(25.0).await?;
//! assert!(matches!(sync.state(), MotionState::Converged { .. }));
//! ```

use futures::future::BoxFuture;
use parking_lot::Mutex;
use spim_core::capabilities::Movable;
use spim_core::error::{AppResult, HardwareError, HardwareErrorKind, SpimError};
use spim_core::limits::{MOVE_TIMEOUT, POLL_INTERVAL, POSITION_TOLERANCE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Reads the current value of an axis.
pub type Sampler = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<f64>> + Send + Sync>;

/// Commands a new goal for an axis.
pub type Commander = Arc<dyn Fn(f64) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Invoked once per convergence with the sampled value.
pub type ConvergedCallback = Box<dyn Fn(f64) + Send + Sync>;

// =============================================================================
// State
// =============================================================================

/// Convergence state of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionState {
    /// No goal, or the last move failed or was cancelled.
    Idle,
    /// Travelling towards `goal`.
    Moving {
        /// Commanded goal
        goal: f64,
    },
    /// Reached `goal`; `position` is the sample that satisfied the tolerance.
    Converged {
        /// Commanded goal
        goal: f64,
        /// Sampled value at convergence
        position: f64,
    },
}

/// Snapshot published on every state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionStatus {
    /// Current state
    pub state: MotionState,
    /// Incremented for every issued move
    pub generation: u64,
    /// Why the last move ended in `Idle`, if it failed
    pub error: Option<SpimError>,
}

impl MotionStatus {
    fn idle() -> Self {
        Self {
            state: MotionState::Idle,
            generation: 0,
            error: None,
        }
    }
}

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    /// Interval between samples
    pub poll_interval: Duration,
    /// Maximum |sample - goal| that counts as converged
    pub tolerance: f64,
    /// Maximum time a move may take; `None` waits forever
    pub move_timeout: Option<Duration>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            tolerance: POSITION_TOLERANCE,
            move_timeout: Some(MOVE_TIMEOUT),
        }
    }
}

#[derive(Debug, Default)]
struct Control {
    generation: u64,
    started: Option<Instant>,
    polling: bool,
}

struct Inner {
    device: String,
    sample: Sampler,
    command: Commander,
    settings: SyncSettings,
    status: watch::Sender<MotionStatus>,
    shutdown: watch::Sender<bool>,
    control: Mutex<Control>,
    on_converged: Mutex<Option<ConvergedCallback>>,
}

// =============================================================================
// MotionSynchronizer
// =============================================================================

/// Drives one axis to commanded goals and wakes waiters on convergence.
///
/// Cloning yields another handle on the same axis.
#[derive(Clone)]
pub struct MotionSynchronizer {
    inner: Arc<Inner>,
}

impl MotionSynchronizer {
    /// Synchronizer over arbitrary sample/command closures.
    pub fn new(device: impl Into<String>, sample: Sampler, command: Commander, settings: SyncSettings) -> Self {
        let (status, _) = watch::channel(MotionStatus::idle());
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                device: device.into(),
                sample,
                command,
                settings,
                status,
                shutdown,
                control: Mutex::new(Control::default()),
                on_converged: Mutex::new(None),
            }),
        }
    }

    /// Synchronizer over a [`Movable`] stage.
    pub fn for_stage(device: impl Into<String>, stage: Arc<dyn Movable>, settings: SyncSettings) -> Self {
        let reader = stage.clone();
        let sample: Sampler = Arc::new(move || {
            let stage = reader.clone();
            Box::pin(async move { stage.position().await })
        });
        let command: Commander = Arc::new(move |goal| {
            let stage = stage.clone();
            Box::pin(async move { stage.move_abs(goal).await })
        });
        Self::new(device, sample, command, settings)
    }

    /// Device id used in errors and logs.
    pub fn device(&self) -> &str {
        &self.inner.device
    }

    /// Polling parameters.
    pub fn settings(&self) -> SyncSettings {
        self.inner.settings
    }

    /// Current state.
    pub fn state(&self) -> MotionState {
        self.inner.status.borrow().state
    }

    /// Full status snapshot.
    pub fn status(&self) -> MotionStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<MotionStatus> {
        self.inner.status.subscribe()
    }

    /// Install the callback run once per convergence.
    pub fn on_converged(&self, callback: impl Fn(f64) + Send + Sync + 'static) {
        *self.inner.on_converged.lock() = Some(Box::new(callback));
    }

    /// Current goal, if one was commanded and not abandoned.
    pub fn goal(&self) -> Option<f64> {
        match self.state() {
            MotionState::Moving { goal } | MotionState::Converged { goal, .. } => Some(goal),
            MotionState::Idle => None,
        }
    }

    /// Read the axis directly.
    pub async fn sample(&self) -> AppResult<f64> {
        (self.inner.sample)()
            .await
            .map_err(|err| HardwareError::communication(&self.inner.device, &err).into())
    }

    /// Command `goal` and start polling. Returns once the command is issued.
    ///
    /// A goal equal to the one already reached or being approached completes
    /// immediately without touching the hardware.
    pub async fn request(&self, goal: f64) -> AppResult<()> {
        if *self.inner.shutdown.borrow() {
            return Err(SpimError::Cancelled(format!(
                "{}: synchronizer is shut down",
                self.inner.device
            )));
        }
        if self.goal() == Some(goal) {
            tracing::debug!(device = %self.inner.device, goal, "Goal already requested");
            return Ok(());
        }

        if let Err(err) = (self.inner.command)(goal).await {
            let error: SpimError = HardwareError::communication(&self.inner.device, &err).into();
            tracing::error!(device = %self.inner.device, goal, error = %error, "Move command failed");
            self.inner.publish_failure(None, error.clone());
            return Err(error);
        }

        self.inner.start_moving(goal);
        Ok(())
    }

    /// Follow a move to `goal` that was commanded elsewhere.
    ///
    /// Same as [`request`](Self::request) without the command, for axes that
    /// share a device with another axis (one XY command moves two axes).
    pub fn track(&self, goal: f64) -> AppResult<()> {
        if *self.inner.shutdown.borrow() {
            return Err(SpimError::Cancelled(format!(
                "{}: synchronizer is shut down",
                self.inner.device
            )));
        }
        if self.goal() != Some(goal) {
            self.inner.start_moving(goal);
        }
        Ok(())
    }

    /// Wait until the axis is no longer moving.
    ///
    /// # Returns
    /// - Ok(()) once converged, or immediately if nothing is in flight
    /// - Err with the failure that ended the last move
    pub async fn wait_for(&self) -> AppResult<()> {
        let mut status = self.inner.status.subscribe();
        let settled = status
            .wait_for(|s| !matches!(s.state, MotionState::Moving { .. }))
            .await
            .map_err(|_| SpimError::Cancelled(format!("{}: synchronizer dropped", self.inner.device)))?;
        match &settled.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// [`request`](Self::request) followed by [`wait_for`](Self::wait_for).
    pub async fn move_to(&self, goal: f64) -> AppResult<()> {
        self.request(goal).await?;
        self.wait_for().await
    }

    /// Stop polling. Pending and future waits fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        self.inner.cancel();
    }
}

impl std::fmt::Debug for MotionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionSynchronizer")
            .field("device", &self.inner.device)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Polling Loop
// =============================================================================

enum Step {
    Continue,
    Done,
}

impl Inner {
    fn start_moving(self: &Arc<Self>, goal: f64) {
        let spawn = {
            let mut control = self.control.lock();
            control.generation += 1;
            control.started = Some(Instant::now());
            self.status.send_replace(MotionStatus {
                state: MotionState::Moving { goal },
                generation: control.generation,
                error: None,
            });
            !std::mem::replace(&mut control.polling, true)
        };
        tracing::debug!(device = %self.device, goal, "Moving");

        if spawn {
            tokio::spawn(Inner::poll(self.clone()));
        }
    }

    async fn poll(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    self.cancel();
                    return;
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            let Some((generation, goal)) = self.current_goal() else {
                return;
            };

            let sample = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    self.cancel();
                    return;
                }
                sample = (self.sample)() => sample,
            };

            if let Step::Done = self.settle(generation, goal, sample) {
                return;
            }
        }
    }

    /// Goal of the move in flight; clears the polling flag when there is none.
    fn current_goal(&self) -> Option<(u64, f64)> {
        let mut control = self.control.lock();
        match self.status.borrow().state {
            MotionState::Moving { goal } => Some((control.generation, goal)),
            _ => {
                control.polling = false;
                None
            }
        }
    }

    fn settle(&self, generation: u64, goal: f64, sample: anyhow::Result<f64>) -> Step {
        let mut control = self.control.lock();
        if control.generation != generation {
            // Goal changed while sampling.
            return Step::Continue;
        }

        let position = match sample {
            Ok(position) => position,
            Err(err) => {
                control.polling = false;
                drop(control);
                let error: SpimError = HardwareError::communication(&self.device, &err).into();
                tracing::error!(device = %self.device, goal, error = %error, "Position read failed");
                self.publish_failure(Some(generation), error);
                return Step::Done;
            }
        };

        if (position - goal).abs() <= self.settings.tolerance {
            control.polling = false;
            self.status.send_replace(MotionStatus {
                state: MotionState::Converged { goal, position },
                generation,
                error: None,
            });
            drop(control);
            tracing::info!(device = %self.device, goal, position, "Converged");
            if let Some(callback) = self.on_converged.lock().as_ref() {
                callback(position);
            }
            return Step::Done;
        }

        let elapsed = control.started.map(|started| started.elapsed());
        if let (Some(limit), Some(elapsed)) = (self.settings.move_timeout, elapsed) {
            if elapsed > limit {
                control.polling = false;
                drop(control);
                let error = SpimError::Hardware(HardwareError::new(
                    &self.device,
                    HardwareErrorKind::Timeout,
                    format!("goal {goal} not reached within {limit:?} (at {position})"),
                ));
                tracing::error!(device = %self.device, goal, position, "Move timed out");
                self.publish_failure(Some(generation), error);
                return Step::Done;
            }
        }

        tracing::trace!(device = %self.device, goal, position, "Still moving");
        Step::Continue
    }

    fn publish_failure(&self, generation: Option<u64>, error: SpimError) {
        let generation = generation.unwrap_or_else(|| self.control.lock().generation);
        self.status.send_replace(MotionStatus {
            state: MotionState::Idle,
            generation,
            error: Some(error),
        });
    }

    fn cancel(&self) {
        let mut control = self.control.lock();
        control.polling = false;
        let moving = matches!(self.status.borrow().state, MotionState::Moving { .. });
        if moving {
            self.status.send_replace(MotionStatus {
                state: MotionState::Idle,
                generation: control.generation,
                error: Some(SpimError::Cancelled(format!("{}: shutdown during move", self.device))),
            });
            tracing::warn!(device = %self.device, "Move cancelled by shutdown");
        }
    }
}
