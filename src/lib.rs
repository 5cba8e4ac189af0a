#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Live client CA reloading for [rustls] servers.
//!
//! A [`ClientCaController`] keeps the set of certificate authorities used to verify
//! client certificates in sync with a [`CaContentProvider`] (a file watcher, a secret
//! store client, ...) without restarting the server or interrupting handshakes.
//!
//! - Reloads run on a single worker: on startup, on explicit triggers through an
//!   [`Enqueuer`], periodically as a safety net, and with exponential backoff after
//!   a failure.
//! - A bundle that is byte-for-byte identical to the last accepted one is not
//!   reparsed or republished.
//! - An empty or malformed bundle never replaces the trust currently in effect.
//! - Handshakes read the current [`rustls::ServerConfig`] through a [`ServingConfig`]
//!   with a lock-free load. Before the first successful reload it reports
//!   [`NotReady`].
//!
//! # Example
//!
//! ```no_run
//! use dynamic_client_ca::{
//!     BaseServerConfig, ClientCaController, DynamicTlsAcceptor, StaticCaBundle,
//! };
//! use rustls::pki_types::{CertificateDer, PrivateKeyDer};
//!
//! # async fn example(
//! #     chain: Vec<CertificateDer<'static>>,
//! #     key: PrivateKeyDer<'static>,
//! #     ca_pem: Vec<u8>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let base = BaseServerConfig::with_single_cert(chain, key)?;
//! let mut controller = ClientCaController::new(StaticCaBundle::new("client-ca", ca_pem), base);
//! controller.run_once()?;
//!
//! let handle = controller.spawn();
//! let acceptor = DynamicTlsAcceptor::new(handle.serving_config());
//! # let _ = acceptor;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `ring` (default) or `aws-lc-rs`: the rustls crypto provider. Exactly one must be enabled.
//! - `logging` (default): emit records through the `log` crate.
//! - `tracing`: emit events through the `tracing` crate instead.

#[cfg(all(feature = "ring", feature = "aws-lc-rs"))]
compile_error!("Enable only one crypto provider feature: `ring` or `aws-lc-rs`.");

#[cfg(not(any(feature = "ring", feature = "aws-lc-rs")))]
compile_error!("Enable one crypto provider feature: `ring` (default) or `aws-lc-rs`.");

mod observability;
mod prelude;

mod acceptor;
pub mod cert;
mod content;
mod controller;
mod crypto;
mod error;
mod events;
mod metrics;
mod provider;
mod tls;

pub use acceptor::DynamicTlsAcceptor;
pub use content::ContentSnapshot;
pub use controller::{
    ClientCaController, ClientCaControllerBuilder, ControllerHandle, Enqueued, Enqueuer,
    ResourceLimits, RetryConfig, SyncOutcome,
};
pub use error::{Error, LimitKind, NotReady, Result};
pub use events::{EventRecorder, TlsConfigChanged};
pub use metrics::{MetricsErrorKind, MetricsRecorder};
pub use provider::{CaContentProvider, StaticCaBundle};
pub use tls::{BaseServerConfig, ClientAuthMode, ServingConfig, ServingConfigUpdates, ServingSnapshot};
