use crate::cert::CertificateDetail;
use crate::error::{Error, NotReady};
use arc_swap::ArcSwapOption;
use rustls::{RootCertStore, ServerConfig};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// One published serving configuration and the trust material it was built from.
pub struct ServingSnapshot {
    generation: u64,
    source_name: String,
    config: Arc<ServerConfig>,
    roots: Arc<RootCertStore>,
    authorities: Vec<CertificateDetail>,
}

impl ServingSnapshot {
    pub(crate) fn new(
        generation: u64,
        source_name: String,
        config: ServerConfig,
        roots: Arc<RootCertStore>,
        authorities: Vec<CertificateDetail>,
    ) -> Self {
        Self {
            generation,
            source_name,
            config: Arc::new(config),
            roots,
            authorities,
        }
    }

    /// Publish sequence number, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Name of the provider the trust pool was loaded from.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// The ready-to-use server configuration.
    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// The client CA pool the configuration verifies against.
    pub fn roots(&self) -> &Arc<RootCertStore> {
        &self.roots
    }

    /// Descriptions of the loaded authorities, in bundle order.
    pub fn authorities(&self) -> &[CertificateDetail] {
        &self.authorities
    }
}

impl fmt::Debug for ServingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServingSnapshot")
            .field("generation", &self.generation)
            .field("source_name", &self.source_name)
            .field("authorities", &self.authorities.len())
            .finish_non_exhaustive()
    }
}

/// Creates the single write side and the shared read side of a serving configuration.
pub(crate) fn channel() -> (Publisher, ServingConfig) {
    let current = Arc::new(ArcSwapOption::empty());
    let (tx, rx) = watch::channel(0);
    (
        Publisher {
            current: Arc::clone(&current),
            tx,
        },
        ServingConfig { current, rx },
    )
}

/// Write side, owned by the reconciler.
pub(crate) struct Publisher {
    current: Arc<ArcSwapOption<ServingSnapshot>>,
    tx: watch::Sender<u64>,
}

impl Publisher {
    /// Makes `snapshot` visible to every reader, then notifies update watchers.
    pub(crate) fn publish(&self, snapshot: ServingSnapshot) -> Arc<ServingSnapshot> {
        let generation = snapshot.generation;
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(Arc::clone(&snapshot)));
        self.tx.send_replace(generation);
        snapshot
    }

    pub(crate) fn current(&self) -> Option<Arc<ServingSnapshot>> {
        self.current.load_full()
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("generation", &*self.tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Handshake-side view of the current serving configuration.
///
/// Cheap to clone. Reads never block and never wait for a reload in progress:
/// they see the last fully published configuration, and once a reader has seen a
/// generation it never sees an older one.
#[derive(Clone)]
pub struct ServingConfig {
    current: Arc<ArcSwapOption<ServingSnapshot>>,
    rx: watch::Receiver<u64>,
}

impl fmt::Debug for ServingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServingConfig")
            .field("generation", &self.generation())
            .finish()
    }
}

impl ServingConfig {
    /// Returns the configuration to use for a handshake.
    ///
    /// The returned configuration is immutable and shared; hand it to
    /// `tokio_rustls::TlsAcceptor` or a `LazyConfigAcceptor` as is.
    ///
    /// # Errors
    ///
    /// Returns [`NotReady`] until the first successful reload. Callers should treat
    /// this as retryable.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, NotReady> {
        self.current
            .load_full()
            .map(|snapshot| Arc::clone(&snapshot.config))
            .ok_or(NotReady)
    }

    /// Returns a private copy of the current configuration that the caller may modify.
    ///
    /// # Errors
    ///
    /// Returns [`NotReady`] until the first successful reload.
    pub fn server_config_owned(&self) -> Result<ServerConfig, NotReady> {
        self.server_config().map(|config| (*config).clone())
    }

    /// Returns the current snapshot, including the trust material behind it.
    ///
    /// # Errors
    ///
    /// Returns [`NotReady`] until the first successful reload.
    pub fn snapshot(&self) -> Result<Arc<ServingSnapshot>, NotReady> {
        self.current.load_full().ok_or(NotReady)
    }

    /// Returns `true` once a configuration has been published.
    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    /// Generation of the current configuration, `0` if none was published.
    pub fn generation(&self) -> u64 {
        self.current
            .load_full()
            .map_or(0, |snapshot| snapshot.generation)
    }

    /// Returns a receiver for publish notifications.
    pub fn updated(&self) -> ServingConfigUpdates {
        ServingConfigUpdates {
            rx: self.rx.clone(),
        }
    }
}

/// Receiver for serving configuration updates.
///
/// The sequence number is the generation of the latest published configuration.
/// It is `0` before the first publish.
///
/// # Examples
///
/// ```no_run
/// # async fn example(serving: dynamic_client_ca::ServingConfig) -> dynamic_client_ca::Result<()> {
/// let mut updates = serving.updated();
///
/// // Wait until the first configuration is published.
/// updates.wait_for(|generation| *generation > 0).await?;
/// assert!(serving.is_ready());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ServingConfigUpdates {
    rx: watch::Receiver<u64>,
}

impl ServingConfigUpdates {
    /// Waits for the next publish and returns its generation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once the controller has stopped and can no
    /// longer publish.
    pub async fn changed(&mut self) -> Result<u64, Error> {
        self.rx.changed().await.map_err(|_| Error::Closed)?;
        Ok(*self.rx.borrow_and_update())
    }

    /// Returns the last generation without waiting.
    pub fn last(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Waits for the generation to satisfy a predicate.
    ///
    /// Returns immediately if the current generation already satisfies it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the controller stops first.
    pub async fn wait_for<F>(&mut self, mut f: F) -> Result<u64, Error>
    where
        F: FnMut(&u64) -> bool,
    {
        let current = self.last();
        if f(&current) {
            return Ok(current);
        }
        loop {
            let generation = self.changed().await?;
            if f(&generation) {
                return Ok(generation);
            }
        }
    }
}
