//! CA bundle decoding and certificate descriptions.

use x509_parser::error::X509Error;

mod detail;
pub(crate) mod parsing;

pub use detail::CertificateDetail;
pub use parsing::{parse_certs_pem, ParsedCertificate};

/// An error that may arise decoding a PEM CA bundle.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// The PEM framing or base64 payload is malformed.
    #[error("failed decoding PEM block: {0}")]
    Pem(String),

    /// A `CERTIFICATE` block is not a valid X.509 certificate.
    #[error("failed parsing X.509 certificate at index {index}")]
    X509 {
        /// Position of the certificate within the bundle.
        index: usize,
        /// Error returned by the X.509 parsing library.
        #[source]
        source: X509Error,
    },

    /// The bundle does not contain any `CERTIFICATE` block.
    #[error("data does not contain any valid certificates")]
    NoCertificates,

    /// The certificate parsed but was refused as a trust anchor.
    #[error("certificate at index {index} is not a usable trust anchor: {reason}")]
    TrustAnchor {
        /// Position of the certificate within the bundle.
        index: usize,
        /// Reason reported by the TLS library.
        reason: String,
    },
}
