//! Peer-certificate validation.
//!
//! Checks the validity window and, when trusted CAs are supplied, the
//! signature chain. Returns a structured result with a SHA-256 fingerprint
//! for audit correlation rather than panicking or collapsing everything
//! into a boolean.

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use crate::errors::{Error, Result};

/// Outcome of validating a certificate.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateValidation {
    pub valid: bool,
    /// Why validation failed, when it did.
    pub reason: Option<String>,
    /// Hex SHA-256 fingerprint of the DER encoding.
    pub fingerprint: String,
}

impl CertificateValidation {
    fn invalid(reason: impl Into<String>, fingerprint: String) -> Self {
        Self { valid: false, reason: Some(reason.into()), fingerprint }
    }
}

/// Hex SHA-256 fingerprint of DER bytes.
pub fn fingerprint_sha256(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

fn first_pem(pem: &str) -> Result<Pem> {
    Pem::iter_from_buffer(pem.as_bytes())
        .next()
        .ok_or_else(|| Error::validation("No PEM block found"))?
        .map_err(|e| Error::validation(format!("Invalid PEM: {}", e)))
}

fn asn1_to_chrono(time: &ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.timestamp(), 0).single().unwrap_or_else(Utc::now)
}

/// `notAfter` of the first certificate in a PEM document.
pub fn parse_not_after(cert_pem: &str) -> Result<DateTime<Utc>> {
    let pem = first_pem(cert_pem)?;
    let cert = pem
        .parse_x509()
        .map_err(|e| Error::validation(format!("Invalid certificate: {}", e)))?;
    Ok(asn1_to_chrono(&cert.validity().not_after))
}

/// Validate a PEM certificate: validity window, plus signature chain when
/// trusted CAs are supplied.
pub fn validate_certificate(
    cert_pem: &str,
    trusted_cas_pem: Option<&str>,
) -> Result<CertificateValidation> {
    let pem = first_pem(cert_pem)?;
    let fingerprint = fingerprint_sha256(&pem.contents);

    let cert = match pem.parse_x509() {
        Ok(cert) => cert,
        Err(e) => {
            return Ok(CertificateValidation::invalid(
                format!("Certificate parse error: {}", e),
                fingerprint,
            ))
        }
    };

    let now = Utc::now();
    let not_before = asn1_to_chrono(&cert.validity().not_before);
    let not_after = asn1_to_chrono(&cert.validity().not_after);

    if now < not_before {
        return Ok(CertificateValidation::invalid(
            format!("Certificate not valid before {}", not_before),
            fingerprint,
        ));
    }
    if now > not_after {
        return Ok(CertificateValidation::invalid(
            format!("Certificate expired at {}", not_after),
            fingerprint,
        ));
    }

    if let Some(cas_pem) = trusted_cas_pem {
        let mut chain_ok = false;
        let mut saw_ca = false;
        for ca_pem in Pem::iter_from_buffer(cas_pem.as_bytes()) {
            let ca_pem =
                ca_pem.map_err(|e| Error::validation(format!("Invalid CA PEM: {}", e)))?;
            let ca = match ca_pem.parse_x509() {
                Ok(ca) => ca,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unparseable trusted CA");
                    continue;
                }
            };
            saw_ca = true;
            if cert.verify_signature(Some(ca.public_key())).is_ok() {
                chain_ok = true;
                break;
            }
        }
        if !saw_ca {
            return Err(Error::validation("Trusted CA bundle contains no certificates"));
        }
        if !chain_ok {
            return Ok(CertificateValidation::invalid(
                "Certificate is not signed by any trusted CA",
                fingerprint,
            ));
        }
    }

    Ok(CertificateValidation { valid: true, reason: None, fingerprint })
}

/// DNS subject-alternative names of the first certificate in a PEM document.
pub fn parse_san_dns_names(cert_pem: &str) -> Result<Vec<String>> {
    let pem = first_pem(cert_pem)?;
    let cert = pem
        .parse_x509()
        .map_err(|e| Error::validation(format!("Invalid certificate: {}", e)))?;

    let mut names = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    names.push(dns.to_string());
                }
            }
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed(valid_for_hours: i64) -> (String, String) {
        let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "trustplane-test".to_string());
        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now - ::time::Duration::hours(1);
        params.not_after = now + ::time::Duration::hours(valid_for_hours);
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        (cert.pem(), key_pair.serialize_pem())
    }

    #[test]
    fn valid_certificate_passes_window_check() {
        let (pem, _) = self_signed(24);
        let result = validate_certificate(&pem, None).unwrap();
        assert!(result.valid, "reason: {:?}", result.reason);
        assert_eq!(result.fingerprint.len(), 64);
    }

    #[test]
    fn expired_certificate_is_rejected() {
        let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now - ::time::Duration::days(30);
        params.not_after = now - ::time::Duration::days(1);
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key_pair).unwrap();

        let result = validate_certificate(&cert.pem(), None).unwrap();
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("expired"));
    }

    #[test]
    fn self_signed_verifies_against_itself_as_ca() {
        let (pem, _) = self_signed(24);
        let result = validate_certificate(&pem, Some(&pem)).unwrap();
        assert!(result.valid, "reason: {:?}", result.reason);
    }

    #[test]
    fn unrelated_ca_fails_chain_check() {
        let (pem, _) = self_signed(24);
        let (other_ca, _) = self_signed(24);
        let result = validate_certificate(&pem, Some(&other_ca)).unwrap();
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("trusted CA"));
    }

    #[test]
    fn garbage_input_is_an_error_not_a_panic() {
        assert!(validate_certificate("not a pem", None).is_err());
    }

    #[test]
    fn not_after_matches_issued_window() {
        let (pem, _) = self_signed(24);
        let not_after = parse_not_after(&pem).unwrap();
        let delta = not_after - Utc::now();
        assert!(delta > chrono::Duration::hours(23));
        assert!(delta <= chrono::Duration::hours(24));
    }

    #[test]
    fn san_names_extracted() {
        let (pem, _) = self_signed(24);
        let names = parse_san_dns_names(&pem).unwrap();
        assert_eq!(names, vec!["localhost"]);
    }

    #[test]
    fn fingerprints_are_stable_and_distinct() {
        let (a, _) = self_signed(24);
        let (b, _) = self_signed(24);
        let fa = validate_certificate(&a, None).unwrap().fingerprint;
        let fa2 = validate_certificate(&a, None).unwrap().fingerprint;
        let fb = validate_certificate(&b, None).unwrap().fingerprint;
        assert_eq!(fa, fa2);
        assert_ne!(fa, fb);
    }
}
