use super::queue::Enqueuer;
use crate::error::Error;
use crate::metrics::{MetricsErrorKind, MetricsRecorder};
use crate::prelude::warn;
use crate::tls::ServingConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handle to a controller running on a background task.
///
/// Returned by [`ClientCaController::spawn`](crate::ClientCaController::spawn).
/// Cheap to clone. Dropping every handle does not stop the controller; call one
/// of the shutdown methods.
#[derive(Clone)]
pub struct ControllerHandle {
    inner: Arc<Inner>,
}

struct Inner {
    serving: ServingConfig,
    enqueuer: Enqueuer,
    cancel: CancellationToken,
    closed: AtomicBool,
    shutdown_timeout: Option<Duration>,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("serving", &self.inner.serving)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .field("shutdown_timeout", &self.inner.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl ControllerHandle {
    pub(super) fn new(
        serving: ServingConfig,
        enqueuer: Enqueuer,
        cancel: CancellationToken,
        shutdown_timeout: Option<Duration>,
        metrics: Option<Arc<dyn MetricsRecorder>>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                serving,
                enqueuer,
                cancel,
                closed: AtomicBool::new(false),
                shutdown_timeout,
                metrics,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// Returns the handshake-side accessor.
    pub fn serving_config(&self) -> ServingConfig {
        self.inner.serving.clone()
    }

    /// Returns a trigger handle.
    pub fn enqueuer(&self) -> Enqueuer {
        self.inner.enqueuer.clone()
    }

    /// Stops the controller and waits for the worker to exit.
    ///
    /// A reload in progress is allowed to finish. Idempotent; a call racing
    /// another shutdown returns once the worker has exited.
    ///
    /// **Note:** This may wait indefinitely if a reload never completes. Prefer
    /// [`shutdown_with_timeout`](Self::shutdown_with_timeout) or
    /// [`shutdown_configured`](Self::shutdown_configured).
    pub async fn shutdown(&self) {
        self.request_shutdown();

        // Held until the worker is joined so concurrent callers wait too.
        let mut worker = self.inner.worker.lock().await;
        if let Some(handle) = worker.as_mut() {
            if let Err(_e) = handle.await {
                warn!("Error joining controller worker during shutdown: error={}", _e);
                self.record_error(MetricsErrorKind::WorkerJoinFailed);
            }
            *worker = None;
        }
    }

    /// Stops the controller, aborting the worker if it does not exit within `timeout`.
    ///
    /// Idempotent. If another shutdown is already waiting on the worker, this
    /// waits for it within the same `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownTimeout`] if the worker did not exit in time. The
    /// worker is aborted unless another caller is still waiting on it.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), Error> {
        self.request_shutdown();
        let started = Instant::now();

        let Ok(mut worker) = tokio::time::timeout(timeout, self.inner.worker.lock()).await else {
            return Err(Error::ShutdownTimeout);
        };

        let result = match worker.as_mut() {
            None => return Ok(()),
            Some(handle) => match tokio::time::timeout(
                timeout.saturating_sub(started.elapsed()),
                &mut *handle,
            )
            .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_e)) => {
                    warn!("Error joining controller worker during shutdown: error={}", _e);
                    self.record_error(MetricsErrorKind::WorkerJoinFailed);
                    Ok(())
                }
                Err(_) => {
                    warn!("Shutdown timeout exceeded; aborting controller worker");
                    handle.abort();
                    let _ = handle.await;
                    Err(Error::ShutdownTimeout)
                }
            },
        };
        *worker = None;
        result
    }

    /// Stops the controller using the timeout configured on the builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownTimeout`] if the configured timeout is exceeded.
    pub async fn shutdown_configured(&self) -> Result<(), Error> {
        if let Some(timeout) = self.inner.shutdown_timeout {
            self.shutdown_with_timeout(timeout).await
        } else {
            self.shutdown().await;
            Ok(())
        }
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn request_shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.cancel.cancel();
    }

    fn record_error(&self, kind: MetricsErrorKind) {
        if let Some(m) = &self.inner.metrics {
            m.record_error(kind);
        }
    }
}
