use crate::error::{Error, Result};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{
    ClientHello, ResolvesServerCert, ServerSessionMemoryCache, StoresServerSessions,
    WebPkiClientVerifier,
};
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, ServerConfig, SupportedProtocolVersion};
use std::fmt;
use std::sync::Arc;

// rustls defaults for the copied public fields.
const DEFAULT_SESSION_CACHE_SIZE: usize = 256;
const DEFAULT_TLS13_TICKETS: usize = 2;

/// Whether connecting clients must present a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthMode {
    /// Clients without a certificate are accepted. A certificate that is presented
    /// must chain to the current client CA pool.
    #[default]
    Optional,
    /// Every client must present a certificate chaining to the current client CA pool.
    Required,
}

/// The static part of the serving configuration.
///
/// Holds everything except the client CA pool: the server certificate resolver,
/// crypto provider, protocol versions and the public tuning fields of
/// [`rustls::ServerConfig`]. It is never mutated once handed to the controller;
/// every reload builds a fresh [`ServerConfig`] from it plus the new pool.
///
/// Session storage is shared by every configuration built from the same base so
/// resumption survives a trust reload.
#[derive(Clone)]
pub struct BaseServerConfig {
    resolver: Arc<dyn ResolvesServerCert>,
    provider: Arc<CryptoProvider>,
    versions: Vec<&'static SupportedProtocolVersion>,
    client_auth: ClientAuthMode,
    alpn_protocols: Vec<Vec<u8>>,
    ignore_client_order: bool,
    max_fragment_size: Option<usize>,
    send_tls13_tickets: usize,
    session_storage: Arc<dyn StoresServerSessions>,
}

impl fmt::Debug for BaseServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseServerConfig")
            .field("resolver", &self.resolver)
            .field("versions", &self.versions)
            .field("client_auth", &self.client_auth)
            .field("alpn_protocols", &self.alpn_protocols)
            .field("ignore_client_order", &self.ignore_client_order)
            .field("max_fragment_size", &self.max_fragment_size)
            .field("send_tls13_tickets", &self.send_tls13_tickets)
            .finish_non_exhaustive()
    }
}

impl BaseServerConfig {
    /// Creates a base configuration serving certificates from `resolver`.
    ///
    /// Uses the process default crypto provider and its default protocol versions.
    pub fn new(resolver: Arc<dyn ResolvesServerCert>) -> Self {
        Self {
            resolver,
            provider: crate::crypto::default_provider(),
            versions: rustls::DEFAULT_VERSIONS.to_vec(),
            client_auth: ClientAuthMode::default(),
            alpn_protocols: Vec::new(),
            ignore_client_order: false,
            max_fragment_size: None,
            send_tls13_tickets: DEFAULT_TLS13_TICKETS,
            session_storage: ServerSessionMemoryCache::new(DEFAULT_SESSION_CACHE_SIZE),
        }
    }

    /// Creates a base configuration that always presents `cert_chain`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rustls`] if the crypto provider cannot load `key`.
    pub fn with_single_cert(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self> {
        let provider = crate::crypto::default_provider();
        let signing_key = provider.key_provider.load_private_key(key)?;
        let certified = Arc::new(CertifiedKey::new(cert_chain, signing_key));

        let mut base = Self::new(Arc::new(SingleCertResolver(certified)));
        base.provider = provider;
        Ok(base)
    }

    /// Uses `provider` instead of the process default.
    #[must_use]
    pub fn crypto_provider(mut self, provider: Arc<CryptoProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Restricts the protocol versions offered.
    #[must_use]
    pub fn protocol_versions(mut self, versions: &[&'static SupportedProtocolVersion]) -> Self {
        self.versions = versions.to_vec();
        self
    }

    /// Sets whether clients must present a certificate.
    #[must_use]
    pub fn client_auth(mut self, mode: ClientAuthMode) -> Self {
        self.client_auth = mode;
        self
    }

    /// Sets the ALPN protocols offered, in preference order.
    #[must_use]
    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Prefers the server's cipher suite order over the client's.
    #[must_use]
    pub fn ignore_client_order(mut self, ignore: bool) -> Self {
        self.ignore_client_order = ignore;
        self
    }

    /// Limits the size of outgoing TLS records.
    #[must_use]
    pub fn max_fragment_size(mut self, size: Option<usize>) -> Self {
        self.max_fragment_size = size;
        self
    }

    /// Number of TLS 1.3 session tickets issued per connection.
    #[must_use]
    pub fn send_tls13_tickets(mut self, count: usize) -> Self {
        self.send_tls13_tickets = count;
        self
    }

    /// Replaces the session storage shared across reloads.
    #[must_use]
    pub fn session_storage(mut self, storage: Arc<dyn StoresServerSessions>) -> Self {
        self.session_storage = storage;
        self
    }

    /// Returns the configured client authentication mode.
    pub fn client_auth_mode(&self) -> ClientAuthMode {
        self.client_auth
    }

    /// Builds a complete server configuration verifying clients against `roots`.
    pub(crate) fn build(&self, roots: Arc<RootCertStore>) -> Result<ServerConfig> {
        let mut verifier =
            WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(&self.provider));
        if self.client_auth == ClientAuthMode::Optional {
            verifier = verifier.allow_unauthenticated();
        }
        let verifier = verifier
            .build()
            .map_err(|e| Error::VerifierBuilder(e.to_string()))?;

        let mut config = ServerConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_protocol_versions(&self.versions)?
            .with_client_cert_verifier(verifier)
            .with_cert_resolver(Arc::clone(&self.resolver));

        config.alpn_protocols.clone_from(&self.alpn_protocols);
        config.ignore_client_order = self.ignore_client_order;
        config.max_fragment_size = self.max_fragment_size;
        config.send_tls13_tickets = self.send_tls13_tickets;
        config.session_storage = Arc::clone(&self.session_storage);

        Ok(config)
    }
}

#[derive(Debug)]
struct SingleCertResolver(Arc<CertifiedKey>);

impl ResolvesServerCert for SingleCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use rustls::pki_types::PrivatePkcs8KeyDer;

    fn base() -> BaseServerConfig {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        BaseServerConfig::with_single_cert(
            vec![cert.der().clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
        )
        .unwrap()
    }

    fn roots() -> Arc<RootCertStore> {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let key = KeyPair::generate().unwrap();
        let ca = params.self_signed(&key).unwrap();

        let mut store = RootCertStore::empty();
        store.add(ca.der().clone()).unwrap();
        Arc::new(store)
    }

    #[test]
    fn build_copies_public_fields() {
        let base = base()
            .alpn_protocols(vec![b"h2".to_vec()])
            .ignore_client_order(true)
            .max_fragment_size(Some(1024))
            .send_tls13_tickets(0);

        let config = base.build(roots()).unwrap();

        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
        assert!(config.ignore_client_order);
        assert_eq!(config.max_fragment_size, Some(1024));
        assert_eq!(config.send_tls13_tickets, 0);
    }

    #[test]
    fn session_storage_is_shared_across_builds() {
        let base = base();
        let a = base.build(roots()).unwrap();
        let b = base.build(roots()).unwrap();

        assert!(Arc::ptr_eq(&a.session_storage, &b.session_storage));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let err = BaseServerConfig::with_single_cert(
            Vec::new(),
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![0u8; 8])),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Rustls(_)));
    }

    #[test]
    fn default_client_auth_is_optional() {
        assert_eq!(base().client_auth_mode(), ClientAuthMode::Optional);
    }
}
