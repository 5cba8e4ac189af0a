//! PEM bundle decoding into parsed certificates.

use super::{CertificateDetail, CertificateError};
use rustls::pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::error::X509Error;
use x509_parser::nom::Err;
use x509_parser::pem::Pem;

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// A certificate decoded from a PEM bundle.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    der: CertificateDer<'static>,
    detail: CertificateDetail,
}

impl ParsedCertificate {
    /// DER encoding of the certificate.
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// Human-readable description of the certificate.
    pub fn detail(&self) -> &CertificateDetail {
        &self.detail
    }

    pub(crate) fn into_parts(self) -> (CertificateDer<'static>, CertificateDetail) {
        (self.der, self.detail)
    }
}

/// Decodes every `CERTIFICATE` block of a PEM bundle, in order.
///
/// Blocks with other labels are skipped. Decoding stops at the first malformed
/// block or invalid certificate.
///
/// # Errors
///
/// Returns [`CertificateError::NoCertificates`] if the bundle holds no certificate,
/// [`CertificateError::Pem`] on broken PEM framing and [`CertificateError::X509`] when
/// a certificate block does not parse.
pub fn parse_certs_pem(bundle: &[u8]) -> Result<Vec<ParsedCertificate>, CertificateError> {
    let mut certs = Vec::new();

    for pem in Pem::iter_from_buffer(bundle) {
        let pem = pem.map_err(|e| CertificateError::Pem(e.to_string()))?;
        if pem.label != CERTIFICATE_LABEL {
            continue;
        }

        let index = certs.len();
        let detail = {
            let x509 = parse_der_encoded_bytes_as_x509_certificate(&pem.contents)
                .map_err(|source| CertificateError::X509 { index, source })?;
            CertificateDetail::from_x509(&x509)
        };

        certs.push(ParsedCertificate {
            der: CertificateDer::from(pem.contents),
            detail,
        });
    }

    if certs.is_empty() {
        return Err(CertificateError::NoCertificates);
    }
    Ok(certs)
}

fn parse_der_encoded_bytes_as_x509_certificate(
    der_bytes: &[u8],
) -> Result<X509Certificate<'_>, X509Error> {
    match x509_parser::parse_x509_certificate(der_bytes) {
        Ok((_, cert)) => Ok(cert),
        Err(Err::Incomplete(_)) => Err(X509Error::InvalidCertificate),
        Err(Err::Error(e) | Err::Failure(e)) => Err(e),
    }
}
