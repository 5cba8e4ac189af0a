//! Error types for trust reloading and the handshake accessor.

use crate::cert::CertificateError;
use crate::metrics::MetricsErrorKind;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The serving configuration has not been published yet.
///
/// Returned by the handshake accessor before the first successful
/// reconciliation. This is a retryable condition, not a permanent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("serving TLS configuration is not ready")]
pub struct NotReady;

/// Kinds of resource limits enforced on incoming CA bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum LimitKind {
    /// Total byte length of the raw bundle.
    MaxBundleBytes,
    /// Number of certificate authorities parsed from the bundle.
    MaxAuthorities,
}

impl LimitKind {
    /// Stable, low-cardinality name of the limit.
    pub const fn as_str(self) -> &'static str {
        match self {
            LimitKind::MaxBundleBytes => "max_bundle_bytes",
            LimitKind::MaxAuthorities => "max_authorities",
        }
    }
}

/// Errors returned by `dynamic-client-ca`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The content provider returned no bytes. The previous trust state is kept.
    #[error("not loading an empty client CA bundle from {source_name:?}")]
    EmptyBundle {
        /// Name of the provider that returned the empty bundle.
        source_name: String,
    },

    /// The CA bundle could not be decoded into trust anchors.
    #[error("unable to load client CA bundle from {source_name:?}: {source}")]
    ParseBundle {
        /// Name of the provider that returned the bundle.
        source_name: String,
        /// Underlying certificate error.
        #[source]
        source: CertificateError,
    },

    /// The CA bundle exceeds a configured resource limit.
    #[error("client CA bundle exceeds {} (limit={limit}, actual={actual})", kind.as_str())]
    ResourceLimitExceeded {
        /// Which limit was exceeded.
        kind: LimitKind,
        /// Configured limit.
        limit: usize,
        /// Observed value.
        actual: usize,
    },

    /// Failed to build a rustls client certificate verifier from the trust pool.
    #[error("rustls verifier builder error: {0}")]
    VerifierBuilder(String),

    /// A rustls error occurred while assembling the serving configuration.
    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),

    /// No serving configuration has been published yet.
    #[error(transparent)]
    NotReady(#[from] NotReady),

    /// The controller has been shut down.
    #[error("controller is closed")]
    Closed,

    /// Graceful shutdown did not complete within the timeout; the worker was aborted.
    #[error("controller shutdown timed out")]
    ShutdownTimeout,

    /// An I/O error occurred while accepting a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps a reconciliation failure to its metrics label.
    pub fn metrics_kind(&self) -> MetricsErrorKind {
        match self {
            Error::EmptyBundle { .. } => MetricsErrorKind::EmptyBundle,
            Error::ParseBundle { .. } => MetricsErrorKind::ParseBundle,
            Error::ResourceLimitExceeded {
                kind: LimitKind::MaxBundleBytes,
                ..
            } => MetricsErrorKind::LimitMaxBundleBytes,
            Error::ResourceLimitExceeded {
                kind: LimitKind::MaxAuthorities,
                ..
            } => MetricsErrorKind::LimitMaxAuthorities,
            Error::VerifierBuilder(_) | Error::Rustls(_) => MetricsErrorKind::BuildConfig,
            Error::NotReady(_) | Error::Closed | Error::ShutdownTimeout | Error::Io(_) => {
                MetricsErrorKind::Other
            }
        }
    }
}
