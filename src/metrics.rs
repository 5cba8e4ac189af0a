//! Metrics hooks for the reload controller.

/// Structured error kinds reported to a [`MetricsRecorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MetricsErrorKind {
    /// The provider returned an empty bundle.
    EmptyBundle,
    /// The bundle could not be parsed.
    ParseBundle,
    /// The bundle exceeded the byte size limit.
    LimitMaxBundleBytes,
    /// The bundle exceeded the authority count limit.
    LimitMaxAuthorities,
    /// The rustls configuration could not be assembled from the trust pool.
    BuildConfig,
    /// The priming reconciliation failed.
    InitialSyncFailed,
    /// A worker or reload task panicked or was cancelled.
    WorkerJoinFailed,
    /// Any other error.
    Other,
}

impl MetricsErrorKind {
    /// Stable label value for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricsErrorKind::EmptyBundle => "empty_bundle",
            MetricsErrorKind::ParseBundle => "parse_bundle",
            MetricsErrorKind::LimitMaxBundleBytes => "limit_max_bundle_bytes",
            MetricsErrorKind::LimitMaxAuthorities => "limit_max_authorities",
            MetricsErrorKind::BuildConfig => "build_config",
            MetricsErrorKind::InitialSyncFailed => "initial_sync_failed",
            MetricsErrorKind::WorkerJoinFailed => "worker_join_failed",
            MetricsErrorKind::Other => "other",
        }
    }
}

/// Trait for recording metrics from the controller.
///
/// Implement this trait to integrate with your metrics system (e.g., Prometheus, `StatsD`).
/// Every failed reconciliation is reported through [`record_error`] with its specific
/// kind. A failed priming reconciliation in [`ClientCaController::run`] is additionally
/// reported as [`MetricsErrorKind::InitialSyncFailed`].
///
/// [`ClientCaController::run`]: crate::ClientCaController::run
///
/// # Example
///
/// ```no_run
/// use dynamic_client_ca::{MetricsErrorKind, MetricsRecorder};
/// use std::sync::Arc;
///
/// struct MyMetrics;
///
/// impl MetricsRecorder for MyMetrics {
///     fn record_update(&self) {}
///
///     fn record_retry(&self) {}
///
///     fn record_error(&self, kind: MetricsErrorKind) {
///         println!("reload error: {}", kind.as_str());
///     }
/// }
///
/// let metrics = Arc::new(MyMetrics);
/// ```
///
/// [`record_error`]: MetricsRecorder::record_error
pub trait MetricsRecorder: Send + Sync {
    /// Records that a new serving configuration was published.
    fn record_update(&self);

    /// Records that a failed reconciliation was scheduled for retry.
    fn record_retry(&self);

    /// Records an error with a structured error kind.
    fn record_error(&self, kind: MetricsErrorKind);
}
