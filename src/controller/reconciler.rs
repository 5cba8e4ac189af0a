use super::builder::ResourceLimits;
use super::supervisor::{ErrorTracker, MAX_CONSECUTIVE_SAME_ERROR};
use crate::cert::{parse_certs_pem, CertificateError};
use crate::content::ContentSnapshot;
use crate::error::{Error, LimitKind, Result};
use crate::events::{EventRecorder, TlsConfigChanged};
use crate::metrics::MetricsRecorder;
use crate::prelude::{debug, info, warn};
use crate::provider::CaContentProvider;
use crate::tls::{BaseServerConfig, Publisher, ServingSnapshot};
use rustls::RootCertStore;
use std::sync::Arc;

/// Result of a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncOutcome {
    /// The bundle matches the last accepted one; nothing was published.
    Unchanged,
    /// A new serving configuration was published.
    Published {
        /// Generation of the new configuration.
        generation: u64,
        /// Number of authorities in the new trust pool.
        authorities: usize,
    },
}

/// The sync step. Owned by exactly one worker; the last accepted snapshot is
/// never shared.
pub(crate) struct Reconciler {
    provider: Arc<dyn CaContentProvider>,
    base: BaseServerConfig,
    limits: ResourceLimits,
    metrics: Option<Arc<dyn MetricsRecorder>>,
    events: Option<Arc<dyn EventRecorder>>,
    publisher: Publisher,
    last_accepted: Option<ContentSnapshot>,
    generation: u64,
    errors: ErrorTracker,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("provider", &self.provider.name())
            .field("limits", &self.limits)
            .field("last_accepted", &self.last_accepted)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub(crate) fn new(
        provider: Arc<dyn CaContentProvider>,
        base: BaseServerConfig,
        limits: ResourceLimits,
        metrics: Option<Arc<dyn MetricsRecorder>>,
        events: Option<Arc<dyn EventRecorder>>,
        publisher: Publisher,
    ) -> Self {
        Self {
            provider,
            base,
            limits,
            metrics,
            events,
            publisher,
            last_accepted: None,
            generation: 0,
            errors: ErrorTracker::new(MAX_CONSECUTIVE_SAME_ERROR),
        }
    }

    /// Runs one reconciliation and reports its outcome to logs and metrics.
    pub(crate) fn sync(&mut self) -> Result<SyncOutcome> {
        let result = self.try_sync();
        match &result {
            Ok(outcome) => {
                if self.errors.consecutive_count() > 0 {
                    info!(
                        "Client CA reload recovered after {} consecutive failures",
                        self.errors.consecutive_count()
                    );
                    self.errors.reset();
                }
                if matches!(outcome, SyncOutcome::Published { .. }) {
                    if let Some(m) = &self.metrics {
                        m.record_update();
                    }
                }
            }
            Err(e) => self.report_failure(e),
        }
        result
    }

    fn try_sync(&mut self) -> Result<SyncOutcome> {
        let source_name = self.provider.name().to_owned();
        let content = self.provider.current_ca_bundle_content();
        if content.is_empty() {
            return Err(Error::EmptyBundle { source_name });
        }

        if let Some(limit) = self.limits.max_bundle_bytes {
            if content.len() > limit {
                return Err(Error::ResourceLimitExceeded {
                    kind: LimitKind::MaxBundleBytes,
                    limit,
                    actual: content.len(),
                });
            }
        }

        let snapshot = ContentSnapshot::new(content);
        if ContentSnapshot::same(Some(&snapshot), self.last_accepted.as_ref()) {
            debug!(
                "Client CA bundle from {:?} unchanged; keeping generation {}",
                source_name, self.generation
            );
            return Ok(SyncOutcome::Unchanged);
        }

        let parsed = parse_certs_pem(snapshot.as_bytes()).map_err(|source| Error::ParseBundle {
            source_name: source_name.clone(),
            source,
        })?;

        if let Some(limit) = self.limits.max_authorities {
            if parsed.len() > limit {
                return Err(Error::ResourceLimitExceeded {
                    kind: LimitKind::MaxAuthorities,
                    limit,
                    actual: parsed.len(),
                });
            }
        }

        let mut roots = RootCertStore::empty();
        let mut authorities = Vec::with_capacity(parsed.len());
        for (index, cert) in parsed.into_iter().enumerate() {
            let (der, detail) = cert.into_parts();
            roots.add(der).map_err(|e| Error::ParseBundle {
                source_name: source_name.clone(),
                source: CertificateError::TrustAnchor {
                    index,
                    reason: e.to_string(),
                },
            })?;

            let event = TlsConfigChanged {
                index,
                source_name: source_name.clone(),
                detail,
            };
            info!("{}", event.note());
            if let Some(events) = &self.events {
                events.record(&event);
            }
            authorities.push(event.detail);
        }

        let roots = Arc::new(roots);
        let config = self.base.build(Arc::clone(&roots))?;
        let generation = self.generation + 1;
        let count = authorities.len();

        self.publisher.publish(ServingSnapshot::new(
            generation,
            source_name.clone(),
            config,
            roots,
            authorities,
        ));
        self.generation = generation;
        self.last_accepted = Some(snapshot);

        info!(
            "Published serving TLS configuration: generation={}, source={:?}, authorities={}",
            generation, source_name, count
        );

        Ok(SyncOutcome::Published {
            generation,
            authorities: count,
        })
    }

    fn report_failure(&mut self, err: &Error) {
        let kind = err.metrics_kind();
        if let Some(m) = &self.metrics {
            m.record_error(kind);
        }

        let message = match err {
            Error::EmptyBundle { source_name } if self.publisher.current().is_none() => {
                format!("No client CA bundle available from {source_name:?} yet; not ready")
            }
            Error::EmptyBundle { source_name } => format!(
                "Refusing to replace client CA bundle with empty content from {source_name:?}; keeping generation {}",
                self.generation
            ),
            other => format!("Client CA reload failed: error={other}"),
        };

        if self.errors.record_error(kind) {
            warn!("{}", message);
        } else {
            debug!(
                "{} (repeated): consecutive_failures={}",
                message,
                self.errors.consecutive_count()
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::provider::StaticCaBundle;
    use crate::tls::{channel, ServingConfig};
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use std::sync::Mutex;

    fn ca_pem(cn: &str) -> String {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, cn);
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

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

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TlsConfigChanged>>,
        updates: Mutex<u32>,
        errors: Mutex<Vec<crate::MetricsErrorKind>>,
    }

    impl EventRecorder for Recorder {
        fn record(&self, event: &TlsConfigChanged) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    impl MetricsRecorder for Recorder {
        fn record_update(&self) {
            *self.updates.lock().unwrap() += 1;
        }

        fn record_retry(&self) {}

        fn record_error(&self, kind: crate::MetricsErrorKind) {
            self.errors.lock().unwrap().push(kind);
        }
    }

    fn reconciler(
        provider: Arc<StaticCaBundle>,
        limits: ResourceLimits,
        recorder: &Arc<Recorder>,
    ) -> (Reconciler, ServingConfig) {
        let (publisher, serving) = channel();
        let reconciler = Reconciler::new(
            provider,
            base(),
            limits,
            Some(Arc::clone(recorder) as Arc<dyn MetricsRecorder>),
            Some(Arc::clone(recorder) as Arc<dyn EventRecorder>),
            publisher,
        );
        (reconciler, serving)
    }

    #[test]
    fn one_event_per_certificate() {
        let bundle = format!("{}{}", ca_pem("first"), ca_pem("second"));
        let provider = Arc::new(StaticCaBundle::new("client-ca", bundle));
        let recorder = Arc::new(Recorder::default());
        let (mut reconciler, serving) =
            reconciler(provider, ResourceLimits::default(), &recorder);

        let outcome = reconciler.sync().unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Published {
                generation: 1,
                authorities: 2
            }
        );
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].index, 0);
        assert_eq!(events[0].source_name, "client-ca");
        assert_eq!(events[1].detail.common_name(), "second");
        assert_eq!(*recorder.updates.lock().unwrap(), 1);

        let snapshot = serving.snapshot().unwrap();
        assert_eq!(snapshot.roots().len(), 2);
        assert_eq!(snapshot.source_name(), "client-ca");
    }

    #[test]
    fn unchanged_bundle_is_not_republished() {
        let provider = Arc::new(StaticCaBundle::new("client-ca", ca_pem("ca")));
        let recorder = Arc::new(Recorder::default());
        let (mut reconciler, serving) =
            reconciler(provider, ResourceLimits::default(), &recorder);

        reconciler.sync().unwrap();
        let first = serving.server_config().unwrap();

        assert_eq!(reconciler.sync().unwrap(), SyncOutcome::Unchanged);
        assert!(Arc::ptr_eq(&first, &serving.server_config().unwrap()));
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
        assert_eq!(*recorder.updates.lock().unwrap(), 1);
    }

    #[test]
    fn byte_limit_is_checked_before_parsing() {
        let provider = Arc::new(StaticCaBundle::new("client-ca", ca_pem("ca")));
        let recorder = Arc::new(Recorder::default());
        let limits = ResourceLimits {
            max_bundle_bytes: Some(16),
            max_authorities: None,
        };
        let (mut reconciler, serving) = reconciler(provider, limits, &recorder);

        let err = reconciler.sync().unwrap_err();

        assert!(matches!(
            err,
            Error::ResourceLimitExceeded {
                kind: LimitKind::MaxBundleBytes,
                limit: 16,
                ..
            }
        ));
        assert!(!serving.is_ready());
        assert_eq!(
            *recorder.errors.lock().unwrap(),
            vec![crate::MetricsErrorKind::LimitMaxBundleBytes]
        );
    }

    #[test]
    fn authority_limit_keeps_previous_configuration() {
        let provider = Arc::new(StaticCaBundle::new("client-ca", ca_pem("one")));
        let recorder = Arc::new(Recorder::default());
        let limits = ResourceLimits {
            max_bundle_bytes: None,
            max_authorities: Some(1),
        };
        let (mut reconciler, serving) =
            reconciler(Arc::clone(&provider), limits, &recorder);
        reconciler.sync().unwrap();
        let before = serving.server_config().unwrap();

        provider.set(format!("{}{}", ca_pem("one"), ca_pem("two")));
        let err = reconciler.sync().unwrap_err();

        assert!(matches!(
            err,
            Error::ResourceLimitExceeded {
                kind: LimitKind::MaxAuthorities,
                actual: 2,
                ..
            }
        ));
        assert!(Arc::ptr_eq(&before, &serving.server_config().unwrap()));
        assert_eq!(serving.generation(), 1);
    }

    #[test]
    fn failure_then_revert_is_a_no_op() {
        let good = ca_pem("ca");
        let provider = Arc::new(StaticCaBundle::new("client-ca", good.clone()));
        let recorder = Arc::new(Recorder::default());
        let (mut reconciler, serving) =
            reconciler(Arc::clone(&provider), ResourceLimits::default(), &recorder);
        reconciler.sync().unwrap();

        provider.set(b"not a bundle".to_vec());
        assert!(matches!(
            reconciler.sync().unwrap_err(),
            Error::ParseBundle { .. }
        ));

        provider.set(good);
        assert_eq!(reconciler.sync().unwrap(), SyncOutcome::Unchanged);
        assert_eq!(serving.generation(), 1);
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }
}
