//! The reload controller.
//!
//! A [`ClientCaController`] owns the reconciler and its trigger queue. Reloads
//! run strictly one at a time on a single worker; readers go through the
//! [`ServingConfig`] and never wait for the worker.

mod builder;
mod handle;
mod queue;
mod reconciler;
mod supervisor;

pub use builder::{ClientCaControllerBuilder, ResourceLimits, RetryConfig};
pub use handle::ControllerHandle;
pub use queue::{Enqueued, Enqueuer};
pub use reconciler::SyncOutcome;

use crate::error::Result;
use crate::metrics::{MetricsErrorKind, MetricsRecorder};
use crate::prelude::{info, warn};
use crate::provider::CaContentProvider;
use crate::tls::{BaseServerConfig, ServingConfig};
use reconciler::Reconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Keeps the client CA pool of a rustls server in sync with a [`CaContentProvider`].
///
/// # Example
///
/// ```no_run
/// use dynamic_client_ca::{BaseServerConfig, ClientCaController, StaticCaBundle};
/// use std::sync::Arc;
///
/// # async fn example(base: BaseServerConfig, pem: Vec<u8>) -> dynamic_client_ca::Result<()> {
/// let bundle = Arc::new(StaticCaBundle::new("client-ca", pem));
/// let mut controller = ClientCaController::builder(Arc::clone(&bundle), base).build();
///
/// // Prime before accepting connections. A failure leaves the server not ready.
/// controller.run_once()?;
///
/// let handle = controller.spawn();
/// let serving = handle.serving_config();
/// let config = serving.server_config()?;
/// # let _ = config;
///
/// // Later, when the bundle changes:
/// bundle.set(b"...".to_vec());
/// handle.enqueuer().enqueue();
///
/// handle.shutdown_configured().await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientCaController {
    reconciler: Reconciler,
    queue: mpsc::Receiver<()>,
    enqueuer: Enqueuer,
    serving: ServingConfig,
    retry: RetryConfig,
    resync_interval: Duration,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    shutdown_timeout: Option<Duration>,
}

impl std::fmt::Debug for ClientCaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCaController")
            .field("reconciler", &self.reconciler)
            .field("serving", &self.serving)
            .field("retry", &self.retry)
            .field("resync_interval", &self.resync_interval)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl ClientCaController {
    /// Returns a builder reading bundles from `provider` and serving with `base`.
    pub fn builder<P>(provider: P, base: BaseServerConfig) -> ClientCaControllerBuilder
    where
        P: CaContentProvider,
    {
        ClientCaControllerBuilder::new(Arc::new(provider), base)
    }

    /// Creates a controller with default settings.
    pub fn new<P>(provider: P, base: BaseServerConfig) -> Self
    where
        P: CaContentProvider,
    {
        Self::builder(provider, base).build()
    }

    fn from_builder(builder: ClientCaControllerBuilder) -> Self {
        let (publisher, serving) = crate::tls::channel();
        let (enqueuer, queue) = queue::work_queue();
        let reconciler = Reconciler::new(
            builder.provider,
            builder.base,
            builder.limits,
            builder.metrics.clone(),
            builder.events,
            publisher,
        );

        Self {
            reconciler,
            queue,
            enqueuer,
            serving,
            retry: builder.retry,
            resync_interval: builder.resync_interval,
            metrics: builder.metrics,
            shutdown_timeout: builder.shutdown_timeout,
        }
    }

    /// Returns the handshake-side accessor. Valid for the controller's whole life
    /// and beyond: after shutdown it keeps returning the last published configuration.
    pub fn serving_config(&self) -> ServingConfig {
        self.serving.clone()
    }

    /// Returns a handle for requesting reloads.
    pub fn enqueuer(&self) -> Enqueuer {
        self.enqueuer.clone()
    }

    /// Requests a reload. Equivalent to `self.enqueuer().enqueue()`.
    pub fn enqueue(&self) -> Enqueued {
        self.enqueuer.enqueue()
    }

    /// Runs one reconciliation synchronously.
    ///
    /// Used to prime the serving configuration before accepting connections, and
    /// in tests. Does not touch the retry schedule of a running loop.
    ///
    /// Reads the provider and parses the bundle on the calling thread. From
    /// async code, prefer [`run`](Self::run) or [`spawn`](Self::spawn), which
    /// move this work onto the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the reconciliation error; the previously published configuration, if
    /// any, stays in effect.
    pub fn run_once(&mut self) -> Result<SyncOutcome> {
        self.reconciler.sync()
    }

    /// Runs the controller until `shutdown` is cancelled.
    ///
    /// Primes with one reconciliation (a failure is reported, not returned),
    /// then starts the periodic resync and processes triggers on this
    /// task. Triggers enqueued after this returns report [`Enqueued::Closed`].
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            reconciler,
            queue,
            enqueuer,
            retry,
            resync_interval,
            metrics,
            ..
        } = self;

        info!(
            "Starting client CA controller: resync_interval_ms={}",
            resync_interval.as_millis()
        );

        let reconciler = match supervisor::sync_blocking(reconciler).await {
            Ok((reconciler, primed)) => {
                if primed.is_err() {
                    if let Some(m) = &metrics {
                        m.record_error(MetricsErrorKind::InitialSyncFailed);
                    }
                }
                reconciler
            }
            Err(_e) => {
                warn!("Initial client CA reload task failed; stopping controller: error={}", _e);
                if let Some(m) = &metrics {
                    m.record_error(MetricsErrorKind::WorkerJoinFailed);
                }
                return;
            }
        };

        let ticker_token = shutdown.child_token();
        let ticker = tokio::spawn(supervisor::run_resync_ticker(
            enqueuer,
            resync_interval,
            ticker_token.clone(),
        ));

        supervisor::run_worker(reconciler, queue, retry, metrics, shutdown).await;

        ticker_token.cancel();
        let _ = ticker.await;

        info!("Client CA controller stopped");
    }

    /// Runs the controller on a new tokio task.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn(self) -> ControllerHandle {
        let cancel = CancellationToken::new();
        let serving = self.serving.clone();
        let enqueuer = self.enqueuer.clone();
        let metrics = self.metrics.clone();
        let shutdown_timeout = self.shutdown_timeout;

        let worker = tokio::spawn(self.run(cancel.clone()));

        ControllerHandle::new(serving, enqueuer, cancel, shutdown_timeout, metrics, worker)
    }
}
