use super::ClientCaController;
use crate::events::EventRecorder;
use crate::metrics::MetricsRecorder;
use crate::provider::CaContentProvider;
use crate::tls::BaseServerConfig;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub(super) const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);
const MIN_RESYNC_INTERVAL: Duration = Duration::from_millis(1);
const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(1);

/// Retry/backoff configuration for failed reloads.
///
/// A failed reload is retried after `min_backoff`, doubling on every consecutive
/// failure up to `max_backoff`, with small jitter. A success resets the delay.
///
/// If `min_backoff > max_backoff`, they will be swapped to ensure valid configuration.
/// A zero `min_backoff` is raised to one millisecond.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub min_backoff: Duration,
    /// Maximum delay between retries.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_secs(1000),
        }
    }
}

impl RetryConfig {
    /// Normalizes the configuration to ensure `0 < min_backoff <= max_backoff`.
    pub(crate) fn normalize(mut self) -> Self {
        if self.min_backoff > self.max_backoff {
            std::mem::swap(&mut self.min_backoff, &mut self.max_backoff);
        }
        self.min_backoff = self.min_backoff.max(MIN_RETRY_BACKOFF);
        self.max_backoff = self.max_backoff.max(self.min_backoff);
        self
    }
}

/// Resource limits applied to incoming CA bundles.
///
/// A bundle exceeding a limit fails the reload like a malformed bundle does: the
/// previously published configuration stays in effect.
///
/// Use `None` for unlimited (no limit enforced), or `Some(usize)` for a specific limit.
///
/// # Examples
///
/// ```rust
/// use dynamic_client_ca::ResourceLimits;
///
/// let limits = ResourceLimits {
///     max_bundle_bytes: Some(1024 * 1024),
///     max_authorities: None,
/// };
///
/// let unlimited = ResourceLimits::unlimited();
/// assert_eq!(unlimited.max_authorities, None);
/// # let _ = limits;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum length of the raw bundle in bytes.
    pub max_bundle_bytes: Option<usize>,
    /// Maximum number of certificates in the bundle.
    pub max_authorities: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_bundle_bytes: Some(4 * 1024 * 1024), // 4MB
            max_authorities: Some(1000),
        }
    }
}

impl ResourceLimits {
    /// Creates a `ResourceLimits` with all limits disabled.
    pub const fn unlimited() -> Self {
        Self {
            max_bundle_bytes: None,
            max_authorities: None,
        }
    }
}

/// Builder for [`ClientCaController`].
///
/// # Example
///
/// ```no_run
/// use dynamic_client_ca::{BaseServerConfig, ClientCaController, StaticCaBundle};
/// use std::time::Duration;
///
/// # fn example(base: BaseServerConfig) {
/// let provider = StaticCaBundle::new("client-ca", Vec::new());
/// let controller = ClientCaController::builder(provider, base)
///     .retry_backoff(Duration::from_millis(100), Duration::from_secs(30))
///     .resync_interval(Duration::from_secs(30))
///     .build();
/// # let _ = controller;
/// # }
/// ```
pub struct ClientCaControllerBuilder {
    pub(super) provider: Arc<dyn CaContentProvider>,
    pub(super) base: BaseServerConfig,
    pub(super) retry: RetryConfig,
    pub(super) resync_interval: Duration,
    pub(super) limits: ResourceLimits,
    pub(super) metrics: Option<Arc<dyn MetricsRecorder>>,
    pub(super) events: Option<Arc<dyn EventRecorder>>,
    pub(super) shutdown_timeout: Option<Duration>,
}

impl Debug for ClientCaControllerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCaControllerBuilder")
            .field("provider", &self.provider.name())
            .field("base", &self.base)
            .field("retry", &self.retry)
            .field("resync_interval", &self.resync_interval)
            .field("limits", &self.limits)
            .field(
                "metrics",
                &self.metrics.as_ref().map(|_| "<MetricsRecorder>"),
            )
            .field("events", &self.events.as_ref().map(|_| "<EventRecorder>"))
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl ClientCaControllerBuilder {
    pub(super) fn new(provider: Arc<dyn CaContentProvider>, base: BaseServerConfig) -> Self {
        Self {
            provider,
            base,
            retry: RetryConfig::default(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            limits: ResourceLimits::default(),
            metrics: None,
            events: None,
            shutdown_timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Sets the retry backoff range for failed reloads.
    ///
    /// Values are stored as given and normalized by [`build`](Self::build).
    #[must_use]
    pub const fn retry_backoff(mut self, min_backoff: Duration, max_backoff: Duration) -> Self {
        self.retry = RetryConfig {
            min_backoff,
            max_backoff,
        };
        self
    }

    /// Sets the period of the safety-net resync. Default is 60 seconds.
    #[must_use]
    pub const fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Sets resource limits for incoming bundles.
    #[must_use]
    pub const fn resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets a metrics recorder.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets a recorder for per-certificate audit events.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventRecorder>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the timeout used by [`ControllerHandle::shutdown_configured`].
    ///
    /// If `None`, shutdown waits indefinitely. Default is 30 seconds.
    ///
    /// [`ControllerHandle::shutdown_configured`]: crate::ControllerHandle::shutdown_configured
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Builds the controller.
    ///
    /// No reload happens here; call [`ClientCaController::run_once`] to prime the
    /// serving configuration or [`ClientCaController::run`] to start the loop.
    pub fn build(mut self) -> ClientCaController {
        self.retry = self.retry.normalize();
        self.resync_interval = self.resync_interval.max(MIN_RESYNC_INTERVAL);
        ClientCaController::from_builder(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_normalization() {
        let config = RetryConfig {
            min_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(1),
        };
        let normalized = config.normalize();
        assert_eq!(normalized.min_backoff, Duration::from_secs(1));
        assert_eq!(normalized.max_backoff, Duration::from_secs(10));

        let config = RetryConfig::default();
        assert_eq!(config.normalize(), config);

        let zero = RetryConfig {
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
        .normalize();
        assert_eq!(zero.min_backoff, Duration::from_millis(1));
        assert_eq!(zero.max_backoff, Duration::from_millis(1));
    }

    #[test]
    fn default_limits() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_bundle_bytes, Some(4 * 1024 * 1024));
        assert_eq!(limits.max_authorities, Some(1000));
        assert_eq!(
            ResourceLimits::unlimited(),
            ResourceLimits {
                max_bundle_bytes: None,
                max_authorities: None,
            }
        );
    }
}
