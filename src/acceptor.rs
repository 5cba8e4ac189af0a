//! TLS acceptor that picks up the current client CA pool on every handshake.

use crate::error::Error;
use crate::tls::ServingConfig;
use rustls::server::Acceptor;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;

/// A TLS acceptor backed by a [`ServingConfig`].
///
/// The configuration is looked up after the ClientHello is read, so every new
/// connection uses the latest published client CA pool. A connection keeps the
/// configuration it started with for its whole life.
///
/// # Example
///
/// ```no_run
/// # use dynamic_client_ca::{DynamicTlsAcceptor, ServingConfig};
/// # use tokio::net::TcpListener;
/// # async fn example(serving: ServingConfig) -> Result<(), Box<dyn std::error::Error>> {
/// let acceptor = DynamicTlsAcceptor::new(serving);
/// let listener = TcpListener::bind("127.0.0.1:8443").await?;
///
/// loop {
///     let (stream, _) = listener.accept().await?;
///     let acceptor = acceptor.clone();
///
///     tokio::spawn(async move {
///         match acceptor.accept(stream).await {
///             Ok(_tls_stream) => { /* serve */ }
///             Err(e) => eprintln!("TLS connection failed: {e}"),
///         }
///     });
/// }
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct DynamicTlsAcceptor {
    serving: ServingConfig,
}

impl DynamicTlsAcceptor {
    /// Creates an acceptor reading its configuration from `serving`.
    pub fn new(serving: ServingConfig) -> Self {
        Self { serving }
    }

    /// Performs a server-side TLS handshake on `io`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] if no configuration has been published yet and
    /// [`Error::Io`] if reading the ClientHello or the handshake fails.
    pub async fn accept<IO>(&self, io: IO) -> Result<TlsStream<IO>, Error>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let start = LazyConfigAcceptor::new(Acceptor::default(), io).await?;
        let config = self.serving.server_config()?;
        Ok(start.into_stream(config).await?)
    }
}

impl From<ServingConfig> for DynamicTlsAcceptor {
    fn from(serving: ServingConfig) -> Self {
        Self::new(serving)
    }
}
