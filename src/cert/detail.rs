use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::x509::X509Name;

const SELF_ISSUED: &str = "<self>";

/// Human-readable identity of a loaded certificate.
///
/// Rendered in logs and events as
/// `"<cn>" [<usages>] validServingFor=[<names>] issuer="<issuer cn>" (<not before> to <not after>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetail {
    common_name: String,
    issuer: String,
    usages: Vec<String>,
    serving_names: Vec<String>,
    serial: String,
    not_before: String,
    not_after: String,
    is_ca: bool,
}

impl CertificateDetail {
    pub(crate) fn from_x509(cert: &X509Certificate<'_>) -> Self {
        let common_name = first_common_name(cert.subject());
        let issuer_cn = first_common_name(cert.issuer());
        let issuer = if issuer_cn == common_name {
            SELF_ISSUED.to_owned()
        } else {
            issuer_cn
        };

        let mut usages = Vec::new();
        if let Ok(Some(eku)) = cert.extended_key_usage() {
            let eku = eku.value;
            if eku.client_auth {
                usages.push("client".to_owned());
            }
            if eku.server_auth {
                usages.push("serving".to_owned());
            }
            for (set, name) in [
                (eku.any, "any"),
                (eku.code_signing, "code_signing"),
                (eku.email_protection, "email_protection"),
                (eku.time_stamping, "time_stamping"),
                (eku.ocsp_signing, "ocsp_signing"),
            ] {
                if set {
                    usages.push(name.to_owned());
                }
            }
            usages.extend(eku.other.iter().map(ToString::to_string));
        }

        let mut dns_names = Vec::new();
        let mut ip_names = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push((*dns).to_owned()),
                    GeneralName::IPAddress(raw) => {
                        if let Some(ip) = ip_from_bytes(raw) {
                            ip_names.push(ip.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        dns_names.extend(ip_names);

        let validity = cert.validity();
        Self {
            common_name,
            issuer,
            usages,
            serving_names: dns_names,
            serial: cert.raw_serial_as_string(),
            not_before: validity.not_before.to_string(),
            not_after: validity.not_after.to_string(),
            is_ca: cert.is_ca(),
        }
    }

    /// Subject common name, empty if absent.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Issuer common name, or `<self>` when the issuer matches the subject.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Extended key usages (`client`, `serving`, ...).
    pub fn usages(&self) -> &[String] {
        &self.usages
    }

    /// DNS names followed by IP addresses from the subject alternative names.
    pub fn serving_names(&self) -> &[String] {
        &self.serving_names
    }

    /// Colon-separated hex serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> &str {
        &self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> &str {
        &self.not_after
    }

    /// Whether the basic constraints mark the certificate as a CA.
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }
}

impl fmt::Display for CertificateDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [{}] ", self.common_name, self.usages.join(","))?;
        if !self.serving_names.is_empty() {
            write!(f, "validServingFor=[{}] ", self.serving_names.join(","))?;
        }
        write!(
            f,
            "issuer={:?} ({} to {})",
            self.issuer, self.not_before, self.not_after
        )
    }
}

fn first_common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map_or_else(String::new, str::to_owned)
}

fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(raw)
            .ok()
            .map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use rcgen::{
        BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    };

    fn detail_of(params: &CertificateParams) -> CertificateDetail {
        let key = KeyPair::generate().unwrap();
        let cert = params.clone().self_signed(&key).unwrap();
        let (_, x509) = x509_parser::parse_x509_certificate(cert.der()).unwrap();
        CertificateDetail::from_x509(&x509)
    }

    #[test]
    fn self_signed_ca() {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "client-ca");

        let detail = detail_of(&params);

        assert_eq!(detail.common_name(), "client-ca");
        assert_eq!(detail.issuer(), "<self>");
        assert!(detail.is_ca());
        assert!(detail.usages().is_empty());
        assert!(!detail.serial().is_empty());
    }

    #[test]
    fn serving_names_and_usages() {
        let mut params =
            CertificateParams::new(vec!["api.example.org".to_string(), "10.0.0.1".to_string()])
                .unwrap();
        params.distinguished_name.push(DnType::CommonName, "api");
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let detail = detail_of(&params);

        assert_eq!(detail.usages(), ["client", "serving"]);
        assert_eq!(detail.serving_names(), ["api.example.org", "10.0.0.1"]);
        assert!(!detail.is_ca());

        let rendered = detail.to_string();
        assert!(rendered.starts_with("\"api\" [client,serving] validServingFor=[api.example.org,10.0.0.1] issuer=\"<self>\" ("));
    }
}
