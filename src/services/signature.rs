//! Certification signature verifier service.
//!
//! Produces the cryptographic findings for a run: digest recomputation
//! against the covered `messageDigest`, chain construction towards the
//! trusted root set, validity windows against the trusted time, and
//! revocation status where a source is declared. Findings are independent;
//! a digest mismatch never suppresses the chain checks, because the report
//! must carry the complete evidence set.

use crate::adapters::revocation_http_client::RevocationHttpClient;
use crate::domain::chain::{CertificateChain, ChainCertificate, RevocationStatus};
use crate::domain::cms::{self, DigestAlgorithm};
use crate::domain::finding::{Evidence, Finding, FindingCategory};
use crate::domain::message::CertificationBlock;
use crate::domain::types::TrustedTime;
use chrono::{DateTime, TimeZone, Utc};
use der::Decode;
use x509_cert::crl::CertificateList;

/// Service producing signature, chain and revocation findings.
pub struct SignatureVerifierService<'a> {
    roots: &'a [ChainCertificate],
    revocation: Option<&'a RevocationHttpClient>,
}

impl<'a> SignatureVerifierService<'a> {
    #[must_use]
    pub fn new(
        roots: &'a [ChainCertificate],
        revocation: Option<&'a RevocationHttpClient>,
    ) -> Self {
        Self { roots, revocation }
    }

    /// Run all signature-related checks over the certification block.
    ///
    /// `certification_time` is the artifact's own certification claim;
    /// `trusted` the authority time, absent when the time source failed
    /// (`time_unavailable_reason` carries why).
    #[must_use]
    pub fn verify(
        &self,
        block: &CertificationBlock,
        certification_time: Option<DateTime<Utc>>,
        trusted: Option<&TrustedTime>,
        time_unavailable_reason: Option<&str>,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();

        findings.push(digest_finding(block));

        let certificates: Vec<ChainCertificate> = cms::scan_certificates(&block.signature_der)
            .iter()
            .filter_map(|cert| match ChainCertificate::from_certificate(cert) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    log::warn!("skipping undecodable embedded certificate: {e}");
                    None
                }
            })
            .collect();

        if certificates.is_empty() {
            findings.push(Finding::failed(
                FindingCategory::ChainTrust,
                "signature embeds no certificates; chain cannot be built",
            ));
            return findings;
        }

        let chain = build_chain(certificates, self.roots);
        findings.push(chain_trust_finding(&chain));

        for cert in &chain.certificates {
            findings.push(expiry_finding(
                cert,
                certification_time,
                trusted,
                time_unavailable_reason,
            ));
        }

        for cert in &chain.certificates {
            let status = self.revocation_status(cert);
            if let Some(finding) = revocation_finding(cert, &status) {
                findings.push(finding);
            }
        }

        findings
    }

    fn revocation_status(&self, cert: &ChainCertificate) -> RevocationStatus {
        let Some(uri) = &cert.crl_uri else {
            return RevocationStatus::NoSourceDeclared;
        };
        let Some(client) = self.revocation else {
            return RevocationStatus::Unavailable {
                reason: "revocation checking disabled".to_string(),
            };
        };
        let crl_der = match client.fetch_crl(uri) {
            Ok(bytes) => bytes,
            Err(e) => {
                return RevocationStatus::Unavailable {
                    reason: format!("revocation source unreachable: {e}"),
                }
            }
        };
        let crl = match CertificateList::from_der(&crl_der) {
            Ok(crl) => crl,
            Err(e) => {
                return RevocationStatus::Unavailable {
                    reason: format!("revocation list undecodable: {e}"),
                }
            }
        };

        let revoked = crl
            .tbs_cert_list
            .revoked_certificates
            .iter()
            .flatten()
            .find(|entry| hex::encode(entry.serial_number.as_bytes()) == cert.serial_hex);
        match revoked {
            Some(entry) => RevocationStatus::Revoked {
                at: Utc
                    .timestamp_opt(entry.revocation_date.to_unix_duration().as_secs() as i64, 0)
                    .single(),
            },
            None => RevocationStatus::Good,
        }
    }
}

/// Recompute the digest of the signed bytes and compare with the covered one.
fn digest_finding(block: &CertificationBlock) -> Finding {
    let Some(covered) = cms::find_message_digest(&block.signature_der) else {
        return Finding::failed(
            FindingCategory::SignatureValidity,
            "signature carries no messageDigest attribute",
        );
    };
    let Some(algorithm) = DigestAlgorithm::from_digest_len(covered.len()) else {
        return Finding::failed(
            FindingCategory::SignatureValidity,
            format!("covered digest has unsupported length {}", covered.len()),
        );
    };
    let computed = algorithm.compute(&block.signed_data);
    let evidence = Evidence::DigestComparison {
        covered_hex: hex::encode(&covered),
        computed_hex: hex::encode(&computed),
    };
    if computed == covered {
        Finding::passed(
            FindingCategory::SignatureValidity,
            format!(
                "recomputed {} digest matches the digest covered by the signature",
                algorithm.as_str()
            ),
        )
        .with_evidence(evidence)
    } else {
        Finding::failed(
            FindingCategory::SignatureValidity,
            format!(
                "recomputed {} digest does not match the digest covered by the signature",
                algorithm.as_str()
            ),
        )
        .with_evidence(evidence)
    }
}

/// Order the embedded certificates leaf-first and walk issuer links towards
/// the trusted root set.
fn build_chain(certificates: Vec<ChainCertificate>, roots: &[ChainCertificate]) -> CertificateChain {
    // The leaf is the certificate that issues no other embedded certificate
    let leaf_idx = certificates
        .iter()
        .position(|candidate| {
            !certificates.iter().any(|other| {
                other.issuer_der == candidate.subject_der
                    && other.subject_der != candidate.subject_der
            })
        })
        .unwrap_or(0);

    let mut remaining = certificates;
    let mut ordered = vec![remaining.swap_remove(leaf_idx)];
    let mut anchored = false;
    let mut missing_issuer = None;

    loop {
        let (issuer_der, issuer_name, subject_name, self_signed) = {
            let current = ordered.last().expect("chain is never empty");
            (
                current.issuer_der.clone(),
                current.issuer.clone(),
                current.subject.clone(),
                current.is_self_signed(),
            )
        };

        if let Some(root) = roots.iter().find(|root| root.subject_der == issuer_der) {
            if !self_signed {
                ordered.push(root.clone());
            }
            anchored = true;
            break;
        }

        if self_signed {
            // Untrusted self-signed terminus
            missing_issuer = Some(subject_name);
            break;
        }

        let next = remaining
            .iter()
            .position(|candidate| candidate.subject_der == issuer_der);
        match next {
            Some(idx) => ordered.push(remaining.swap_remove(idx)),
            None => {
                missing_issuer = Some(issuer_name);
                break;
            }
        }
    }

    CertificateChain {
        certificates: ordered,
        anchored,
        missing_issuer,
    }
}

fn chain_trust_finding(chain: &CertificateChain) -> Finding {
    if chain.anchored {
        let anchor = chain
            .certificates
            .last()
            .map(|c| c.subject.clone())
            .unwrap_or_default();
        Finding::passed(
            FindingCategory::ChainTrust,
            format!(
                "chain of {} certificate(s) anchors at trusted root {anchor}",
                chain.certificates.len()
            ),
        )
    } else {
        let missing = chain
            .missing_issuer
            .clone()
            .unwrap_or_else(|| "unknown issuer".to_string());
        Finding::failed(
            FindingCategory::ChainTrust,
            format!("chain cannot be completed to a trusted root; missing link: {missing}"),
        )
    }
}

/// Validity-window finding for one chain certificate.
///
/// A certificate already expired (or not yet valid) at the artifact's own
/// certification time fails. Expiry strictly between certification time and
/// the trusted verification time is informational only; certificates
/// naturally expire after use.
fn expiry_finding(
    cert: &ChainCertificate,
    certification_time: Option<DateTime<Utc>>,
    trusted: Option<&TrustedTime>,
    time_unavailable_reason: Option<&str>,
) -> Finding {
    let Some(at_certification) = certification_time else {
        return Finding::indeterminate(
            FindingCategory::ChainExpiry,
            format!(
                "validity of {} at certification time cannot be established",
                cert.subject
            ),
            "no certification time claim in artifact",
        );
    };

    let window_evidence = |reference_label: &str, reference: DateTime<Utc>| {
        Evidence::CertificateWindow {
            subject: cert.subject.clone(),
            not_before: cert.not_before,
            not_after: cert.not_after,
            reference_label: reference_label.to_string(),
            reference,
        }
    };

    if cert.expired_at(at_certification) || cert.not_yet_valid_at(at_certification) {
        return Finding::failed(
            FindingCategory::ChainExpiry,
            format!(
                "certificate {} was outside its validity window at certification time",
                cert.subject
            ),
        )
        .with_evidence(window_evidence("certification-time", at_certification));
    }

    match trusted {
        Some(trusted) => {
            if cert.expired_at(trusted.at) {
                Finding::passed(
                    FindingCategory::ChainExpiry,
                    format!(
                        "certificate {} was valid at certification time; it has since expired, \
                         which does not invalidate the certification",
                        cert.subject
                    ),
                )
                .with_evidence(window_evidence("trusted-verification-time", trusted.at))
            } else {
                Finding::passed(
                    FindingCategory::ChainExpiry,
                    format!(
                        "certificate {} valid at certification time and at trusted verification time",
                        cert.subject
                    ),
                )
                .with_evidence(window_evidence("trusted-verification-time", trusted.at))
            }
        }
        None => Finding::indeterminate(
            FindingCategory::ChainExpiry,
            format!(
                "certificate {} validity at verification time could not be checked",
                cert.subject
            ),
            time_unavailable_reason.unwrap_or("trusted time unavailable"),
        ),
    }
}

fn revocation_finding(cert: &ChainCertificate, status: &RevocationStatus) -> Option<Finding> {
    match status {
        // Present-if-available: nothing to check, nothing to report
        RevocationStatus::NoSourceDeclared => None,
        RevocationStatus::Good => Some(Finding::passed(
            FindingCategory::ChainRevocation,
            format!("certificate {} is not listed by its revocation source", cert.subject),
        )),
        RevocationStatus::Revoked { at } => {
            let when = at
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
                .unwrap_or_else(|| "unknown time".to_string());
            Some(Finding::failed(
                FindingCategory::ChainRevocation,
                format!("certificate {} is revoked (since {when})", cert.subject),
            ))
        }
        RevocationStatus::Unavailable { reason } => Some(Finding::indeterminate(
            FindingCategory::ChainRevocation,
            format!("revocation status of {} could not be determined", cert.subject),
            reason.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cms::OID_MESSAGE_DIGEST_COMPLETE;
    use crate::domain::finding::FindingStatus;
    use sha2::{Digest, Sha256};

    fn synthetic_cert(subject: &str, issuer: &str, nb: i64, na: i64) -> ChainCertificate {
        ChainCertificate {
            subject: subject.to_string(),
            issuer: issuer.to_string(),
            serial_hex: format!("{:02x}", subject.len()),
            subject_der: subject.as_bytes().to_vec(),
            issuer_der: issuer.as_bytes().to_vec(),
            not_before: Utc.timestamp_opt(nb, 0).unwrap(),
            not_after: Utc.timestamp_opt(na, 0).unwrap(),
            crl_uri: None,
        }
    }

    fn signature_with_digest(digest: &[u8]) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&OID_MESSAGE_DIGEST_COMPLETE);
        blob.push(0x31);
        blob.push((digest.len() + 2) as u8);
        blob.push(0x04);
        blob.push(digest.len() as u8);
        blob.extend_from_slice(digest);
        blob
    }

    fn block_with(signed_data: &[u8], covered: &[u8]) -> CertificationBlock {
        CertificationBlock {
            signed_data: signed_data.to_vec(),
            signature_der: signature_with_digest(covered),
            provider: None,
            receipt_type: None,
            message_id: None,
            certification_time: None,
        }
    }

    #[test]
    fn digest_match_passes() {
        let data = b"<postacert>certified</postacert>";
        let covered = Sha256::digest(data).to_vec();
        let finding = digest_finding(&block_with(data, &covered));
        assert_eq!(finding.status, FindingStatus::Passed);
        assert!(finding.evidence.is_some());
    }

    #[test]
    fn digest_mismatch_fails() {
        let data = b"<postacert>certified</postacert>";
        let finding = digest_finding(&block_with(data, &[0u8; 32]));
        assert_eq!(finding.status, FindingStatus::Failed);
        assert_eq!(finding.category, FindingCategory::SignatureValidity);
    }

    #[test]
    fn missing_digest_attribute_fails() {
        let block = CertificationBlock {
            signed_data: b"data".to_vec(),
            signature_der: vec![0x30, 0x03, 0x01, 0x02, 0x03],
            provider: None,
            receipt_type: None,
            message_id: None,
            certification_time: None,
        };
        assert_eq!(digest_finding(&block).status, FindingStatus::Failed);
    }

    #[test]
    fn chain_builds_towards_root() {
        let leaf = synthetic_cert("CN=signer", "CN=intermediate", 0, 10_000);
        let intermediate = synthetic_cert("CN=intermediate", "CN=root", 0, 10_000);
        let root = synthetic_cert("CN=root", "CN=root", 0, 10_000);

        let chain = build_chain(vec![intermediate, leaf], &[root]);
        assert!(chain.anchored);
        assert_eq!(chain.certificates.len(), 3);
        assert_eq!(chain.leaf().unwrap().subject, "CN=signer");
        assert_eq!(chain_trust_finding(&chain).status, FindingStatus::Passed);
    }

    #[test]
    fn broken_chain_names_missing_link() {
        let leaf = synthetic_cert("CN=signer", "CN=absent-ca", 0, 10_000);
        let chain = build_chain(vec![leaf], &[]);
        assert!(!chain.anchored);
        let finding = chain_trust_finding(&chain);
        assert_eq!(finding.status, FindingStatus::Failed);
        assert!(finding.detail.contains("CN=absent-ca"));
    }

    #[test]
    fn untrusted_self_signed_is_not_anchored() {
        let cert = synthetic_cert("CN=self", "CN=self", 0, 10_000);
        let chain = build_chain(vec![cert], &[]);
        assert!(!chain.anchored);
    }

    #[test]
    fn expired_between_certification_and_verification_passes() {
        let cert = synthetic_cert("CN=signer", "CN=ca", 0, 5_000);
        let certification = Utc.timestamp_opt(4_000, 0).unwrap();
        let trusted = TrustedTime::new(Utc.timestamp_opt(9_000, 0).unwrap(), "test");
        let finding = expiry_finding(&cert, Some(certification), Some(&trusted), None);
        assert_eq!(finding.status, FindingStatus::Passed);
        assert!(finding.detail.contains("since expired"));
    }

    #[test]
    fn expired_at_certification_time_fails() {
        let cert = synthetic_cert("CN=signer", "CN=ca", 0, 5_000);
        let certification = Utc.timestamp_opt(6_000, 0).unwrap();
        let trusted = TrustedTime::new(Utc.timestamp_opt(9_000, 0).unwrap(), "test");
        let finding = expiry_finding(&cert, Some(certification), Some(&trusted), None);
        assert_eq!(finding.status, FindingStatus::Failed);
    }

    #[test]
    fn expiry_without_trusted_time_is_indeterminate() {
        let cert = synthetic_cert("CN=signer", "CN=ca", 0, 5_000);
        let certification = Utc.timestamp_opt(4_000, 0).unwrap();
        let finding = expiry_finding(&cert, Some(certification), None, Some("time source unreachable"));
        match finding.status {
            FindingStatus::Indeterminate { reason } => {
                assert_eq!(reason, "time source unreachable");
            }
            other => panic!("expected indeterminate, got {other:?}"),
        }
    }

    #[test]
    fn revocation_mapping() {
        let cert = synthetic_cert("CN=signer", "CN=ca", 0, 5_000);
        assert!(revocation_finding(&cert, &RevocationStatus::NoSourceDeclared).is_none());
        assert_eq!(
            revocation_finding(&cert, &RevocationStatus::Good).unwrap().status,
            FindingStatus::Passed
        );
        assert_eq!(
            revocation_finding(&cert, &RevocationStatus::Revoked { at: None })
                .unwrap()
                .status,
            FindingStatus::Failed
        );
        let unavailable = RevocationStatus::Unavailable {
            reason: "CRL endpoint unreachable".to_string(),
        };
        assert!(revocation_finding(&cert, &unavailable)
            .unwrap()
            .status
            .is_indeterminate());
    }
}
