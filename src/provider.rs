//! Sources of CA bundle content.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

/// Provides the current client CA bundle as raw bytes.
///
/// Implementations are usually backed by a file watcher, a secret store client or
/// a config map informer. Errors reading the underlying store are contained by the
/// implementation: by the time `current_ca_bundle_content` is called it returns the
/// latest value it knows about. An empty value is treated by the controller as
/// "nothing to load" and never replaces previously published trust.
///
/// A running controller calls `current_ca_bundle_content` on tokio's blocking
/// pool, so it may perform I/O.
pub trait CaContentProvider: Send + Sync + 'static {
    /// Identifier used in logs and events.
    fn name(&self) -> &str;

    /// Returns the latest known CA bundle content (PEM).
    fn current_ca_bundle_content(&self) -> Vec<u8>;
}

impl<T: CaContentProvider + ?Sized> CaContentProvider for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn current_ca_bundle_content(&self) -> Vec<u8> {
        (**self).current_ca_bundle_content()
    }
}

/// In-memory [`CaContentProvider`] whose content is replaced by the caller.
///
/// Useful when another component already watches the trust material and only needs
/// to hand the bytes over: call [`set`](Self::set) and then trigger the controller
/// with [`Enqueuer::enqueue`](crate::Enqueuer::enqueue).
///
/// # Examples
///
/// ```
/// use dynamic_client_ca::{CaContentProvider, StaticCaBundle};
///
/// let bundle = StaticCaBundle::new("client-ca", b"-----BEGIN CERTIFICATE-----".to_vec());
/// assert_eq!(bundle.name(), "client-ca");
///
/// bundle.clear();
/// assert!(bundle.current_ca_bundle_content().is_empty());
/// ```
pub struct StaticCaBundle {
    name: String,
    content: ArcSwap<Vec<u8>>,
}

impl StaticCaBundle {
    /// Creates a provider with the given name and initial content.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: ArcSwap::from_pointee(content.into()),
        }
    }

    /// Replaces the content returned by subsequent reads.
    pub fn set(&self, content: impl Into<Vec<u8>>) {
        self.content.store(Arc::new(content.into()));
    }

    /// Empties the content. The controller will keep serving the previous bundle.
    pub fn clear(&self) {
        self.content.store(Arc::new(Vec::new()));
    }
}

impl fmt::Debug for StaticCaBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCaBundle")
            .field("name", &self.name)
            .field("content_len", &self.content.load().len())
            .finish()
    }
}

impl CaContentProvider for StaticCaBundle {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_ca_bundle_content(&self) -> Vec<u8> {
        self.content.load().as_ref().clone()
    }
}
