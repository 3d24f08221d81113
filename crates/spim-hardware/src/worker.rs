//! Serialized per-device command execution.
//!
//! Some controllers misbehave when commands interleave (a position query
//! arriving mid-move, two moves racing on one serial line). A [`DeviceWorker`]
//! owns one task and one FIFO queue per device: every command submitted to it
//! runs to completion before the next starts, regardless of how many callers
//! share the device.
//!
//! [`SerializedStage`] and [`SerializedXyStage`] wrap a capability so all of
//! its calls go through a worker, and are drop-in replacements for the
//! wrapped device.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use spim_core::capabilities::{Movable, XyStage};
use spim_core::limits::WORKER_QUEUE_DEPTH;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Single-task FIFO executor for one device.
pub struct DeviceWorker {
    device: String,
    queue: mpsc::Sender<Job>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceWorker {
    /// Spawn the worker task for `device`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(device: impl Into<String>) -> Self {
        let device = device.into();
        let (queue, mut jobs) = mpsc::channel::<Job>(WORKER_QUEUE_DEPTH);
        let name = device.clone();
        let task = tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                job().await;
            }
            tracing::debug!(device = %name, "Device worker stopped");
        });
        Self {
            device,
            queue,
            task: Mutex::new(Some(task)),
        }
    }

    /// Device this worker serializes.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Queue `command` and wait for its result.
    ///
    /// # Errors
    /// Returns the command's own error, or an error if the worker has stopped
    /// before the command ran.
    pub async fn submit<T, F, Fut>(&self, command: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done, result) = oneshot::channel();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                // Receiver gone means the caller stopped waiting.
                let _ = done.send(command().await);
            })
        });
        self.queue
            .send(job)
            .await
            .map_err(|_| anyhow!("Worker for '{}' has stopped", self.device))?;
        result
            .await
            .map_err(|_| anyhow!("Worker for '{}' dropped the command", self.device))?
    }

    /// Stop the worker. Queued commands fail; the running one is aborted.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::debug!(device = %self.device, "Device worker aborted");
        }
    }

    /// Whether the worker task is still running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Serialized Capabilities
// =============================================================================

/// A [`Movable`] whose calls all run on one [`DeviceWorker`].
pub struct SerializedStage {
    inner: Arc<dyn Movable>,
    worker: Arc<DeviceWorker>,
}

impl SerializedStage {
    /// Wrap `inner`, serializing through `worker`.
    pub fn new(inner: Arc<dyn Movable>, worker: Arc<DeviceWorker>) -> Self {
        Self { inner, worker }
    }
}

#[async_trait]
impl Movable for SerializedStage {
    async fn move_abs(&self, position: f64) -> Result<()> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.move_abs(position).await })
            .await
    }

    async fn move_rel(&self, distance: f64) -> Result<()> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.move_rel(distance).await })
            .await
    }

    async fn position(&self) -> Result<f64> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.position().await })
            .await
    }

    async fn wait_settled(&self) -> Result<()> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.wait_settled().await })
            .await
    }

    async fn stop(&self) -> Result<()> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.stop().await })
            .await
    }
}

/// An [`XyStage`] whose calls all run on one [`DeviceWorker`].
pub struct SerializedXyStage {
    inner: Arc<dyn XyStage>,
    worker: Arc<DeviceWorker>,
}

impl SerializedXyStage {
    /// Wrap `inner`, serializing through `worker`.
    pub fn new(inner: Arc<dyn XyStage>, worker: Arc<DeviceWorker>) -> Self {
        Self { inner, worker }
    }
}

#[async_trait]
impl XyStage for SerializedXyStage {
    async fn move_xy(&self, x: f64, y: f64) -> Result<()> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.move_xy(x, y).await })
            .await
    }

    async fn position_xy(&self) -> Result<(f64, f64)> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.position_xy().await })
            .await
    }

    async fn wait_settled(&self) -> Result<()> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.wait_settled().await })
            .await
    }

    async fn stop(&self) -> Result<()> {
        let inner = self.inner.clone();
        self.worker
            .submit(move || async move { inner.stop().await })
            .await
    }
}
