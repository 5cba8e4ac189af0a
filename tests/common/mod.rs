#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use dynamic_client_ca::{
    BaseServerConfig, CaContentProvider, MetricsErrorKind, MetricsRecorder, StaticCaBundle,
};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A certificate authority generated at test time.
pub struct TestCa {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCa {
    pub fn new(cn: &str) -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, cn);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    /// Issues a leaf certificate for `san` with the given usage.
    pub fn issue(
        &self,
        san: &str,
        usage: ExtendedKeyUsagePurpose,
    ) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        let mut params = CertificateParams::new(vec![san.to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, san);
        params.extended_key_usages = vec![usage];
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (
            vec![cert.der().clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
        )
    }
}

pub fn ca_pem(cn: &str) -> String {
    TestCa::new(cn).pem()
}

/// Base configuration serving a `localhost` certificate issued by `server_ca`.
pub fn base_with(server_ca: &TestCa) -> BaseServerConfig {
    let (chain, key) = server_ca.issue("localhost", ExtendedKeyUsagePurpose::ServerAuth);
    BaseServerConfig::with_single_cert(chain, key).unwrap()
}

pub fn base() -> BaseServerConfig {
    base_with(&TestCa::new("server-ca"))
}

#[derive(Debug, Default)]
pub struct TestMetricsRecorder {
    pub updates: Mutex<u64>,
    pub retries: Mutex<u64>,
    pub errors: Mutex<Vec<MetricsErrorKind>>,
}

impl TestMetricsRecorder {
    pub fn updates(&self) -> u64 {
        *self.updates.lock().unwrap()
    }

    pub fn retries(&self) -> u64 {
        *self.retries.lock().unwrap()
    }

    pub fn errors(&self) -> Vec<MetricsErrorKind> {
        self.errors.lock().unwrap().clone()
    }
}

impl MetricsRecorder for TestMetricsRecorder {
    fn record_update(&self) {
        *self.updates.lock().unwrap() += 1;
    }

    fn record_retry(&self) {
        *self.retries.lock().unwrap() += 1;
    }

    fn record_error(&self, kind: MetricsErrorKind) {
        self.errors.lock().unwrap().push(kind);
    }
}

/// Provider that blocks the calling thread on every read, like a slow disk or
/// remote store.
#[derive(Debug)]
pub struct SlowProvider {
    pub bundle: Arc<StaticCaBundle>,
    pub delay: Duration,
}

impl CaContentProvider for SlowProvider {
    fn name(&self) -> &str {
        self.bundle.name()
    }

    fn current_ca_bundle_content(&self) -> Vec<u8> {
        std::thread::sleep(self.delay);
        self.bundle.current_ca_bundle_content()
    }
}
