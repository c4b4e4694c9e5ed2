//! Certificate chain domain types.
//!
//! A `CertificateChain` is built once during signature verification, leaf
//! first, and never mutated afterwards. The chain stores the decoded facts
//! the verifier needs (validity windows, issuer linkage, revocation source)
//! so the finding logic never has to re-touch DER.

use crate::infra::error::{VerifyError, VerifyResult};
use chrono::{DateTime, TimeZone, Utc};
use der::Encode;
use x509_cert::Certificate;

/// Revocation status of one chain certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Certificate declares no revocation source.
    NoSourceDeclared,
    /// Revocation source consulted; serial not listed.
    Good,
    /// Serial listed as revoked.
    Revoked { at: Option<DateTime<Utc>> },
    /// A source is declared but could not be consulted.
    Unavailable { reason: String },
}

/// Decoded facts about one certificate in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCertificate {
    pub subject: String,
    pub issuer: String,
    pub serial_hex: String,
    /// DER of the subject name, used for issuer linkage.
    pub subject_der: Vec<u8>,
    /// DER of the issuer name, used for issuer linkage.
    pub issuer_der: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// First HTTP CRL distribution point declared by the certificate.
    pub crl_uri: Option<String>,
}

impl ChainCertificate {
    /// Decode the facts this engine needs out of a parsed certificate.
    pub fn from_certificate(cert: &Certificate) -> VerifyResult<Self> {
        let tbs = &cert.tbs_certificate;
        let subject_der = tbs.subject.to_der()?;
        let issuer_der = tbs.issuer.to_der()?;

        Ok(Self {
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            serial_hex: hex::encode(tbs.serial_number.as_bytes()),
            subject_der,
            issuer_der,
            not_before: time_to_utc(&tbs.validity.not_before)?,
            not_after: time_to_utc(&tbs.validity.not_after)?,
            crl_uri: crl_distribution_uri(cert),
        })
    }

    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.subject_der == self.issuer_der
    }

    /// True when the instant falls outside the validity window's end.
    #[must_use]
    pub fn expired_at(&self, at: DateTime<Utc>) -> bool {
        at > self.not_after
    }

    /// True when the instant precedes the validity window's start.
    #[must_use]
    pub fn not_yet_valid_at(&self, at: DateTime<Utc>) -> bool {
        at < self.not_before
    }
}

/// Ordered chain from the signer certificate towards a trusted root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    /// Leaf first.
    pub certificates: Vec<ChainCertificate>,
    /// Whether the chain terminated at a configured trusted root.
    pub anchored: bool,
    /// Issuer name of the link that could not be resolved, when the chain
    /// is incomplete.
    pub missing_issuer: Option<String>,
}

impl CertificateChain {
    #[must_use]
    pub fn leaf(&self) -> Option<&ChainCertificate> {
        self.certificates.first()
    }
}

fn time_to_utc(time: &x509_cert::time::Time) -> VerifyResult<DateTime<Utc>> {
    let secs = time.to_unix_duration().as_secs() as i64;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| VerifyError::Asn1Error(format!("unrepresentable certificate time: {secs}")))
}

/// Extract the first HTTP URI from a cRLDistributionPoints extension.
///
/// The URI lives in a `GeneralName` with context tag [6] (IA5String); a
/// targeted scan over the extension value is sufficient and avoids decoding
/// the full DistributionPoint structure.
fn crl_distribution_uri(cert: &Certificate) -> Option<String> {
    const CRL_DISTRIBUTION_POINTS_OID: &str = "2.5.29.31";
    const GENERAL_NAME_URI_TAG: u8 = 0x86;

    let extensions = cert.tbs_certificate.extensions.as_ref()?;
    let ext = extensions
        .iter()
        .find(|e| e.extn_id.to_string() == CRL_DISTRIBUTION_POINTS_OID)?;
    let value = ext.extn_value.as_bytes();

    let mut pos = 0usize;
    while pos + 2 <= value.len() {
        if value[pos] == GENERAL_NAME_URI_TAG {
            let len = value[pos + 1] as usize;
            // URIs in practice use short-form lengths
            if len & 0x80 == 0 && pos + 2 + len <= value.len() {
                if let Ok(uri) = std::str::from_utf8(&value[pos + 2..pos + 2 + len]) {
                    if uri.starts_with("http://") || uri.starts_with("https://") {
                        return Some(uri.to_string());
                    }
                }
            }
        }
        pos += 1;
    }
    None
}
