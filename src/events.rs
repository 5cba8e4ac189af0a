//! Audit events emitted when trust material is loaded.

use crate::cert::CertificateDetail;

/// A client CA certificate was added to a newly published trust pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfigChanged {
    /// Position of the certificate within the bundle.
    pub index: usize,
    /// Name of the provider the bundle came from.
    pub source_name: String,
    /// Description of the loaded certificate.
    pub detail: CertificateDetail,
}

impl TlsConfigChanged {
    /// Machine-readable reason attached to the event.
    pub const REASON: &'static str = "TLSConfigChanged";

    /// Action attached to the event.
    pub const ACTION: &'static str = "CACertificateReload";

    /// Human-readable note, in the same shape as the log line.
    pub fn note(&self) -> String {
        format!(
            "loaded client CA [{}/{:?}]: {}",
            self.index, self.source_name, self.detail
        )
    }
}

/// Sink for audit events.
///
/// Implement this to forward events to an event bus or an audit log. It is called
/// from the controller's worker once per loaded certificate and should not block.
pub trait EventRecorder: Send + Sync {
    /// Records a loaded certificate.
    fn record(&self, event: &TlsConfigChanged);
}
