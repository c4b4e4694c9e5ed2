//! Timestamp consistency checker service.
//!
//! Applies ordering and source-agreement rules over the timestamp claims a
//! transport artifact carries, against the trusted time. When no trusted
//! time is available every dependent rule still emits a finding, marked
//! indeterminate with the failure reason; silent omission would lose
//! forensic information.

use crate::domain::finding::{Evidence, Finding, FindingCategory};
use crate::domain::message::{EmbeddedTimestamp, TimestampLabel};
use crate::domain::types::TrustedTime;
use chrono::Duration;

/// Service producing timestamp ordering and agreement findings.
pub struct TimestampConsistencyService {
    skew_tolerance: Duration,
}

impl TimestampConsistencyService {
    #[must_use]
    pub fn new(skew_tolerance: Duration) -> Self {
        Self { skew_tolerance }
    }

    /// Check every defined ordering relation among the claims.
    #[must_use]
    pub fn check(
        &self,
        timestamps: &[EmbeddedTimestamp],
        trusted: Option<&TrustedTime>,
        time_unavailable_reason: Option<&str>,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();

        let declared_send = claim(timestamps, TimestampLabel::DeclaredSend);
        let certification = claim(timestamps, TimestampLabel::Certification);
        let signature_declared = claim(timestamps, TimestampLabel::SignatureDeclared);

        // Certification must not precede the declared send time
        if let (Some(send), Some(cert)) = (declared_send, certification) {
            let evidence = compared(cert, send);
            if cert.claimed < send.claimed {
                findings.push(
                    Finding::failed(
                        FindingCategory::TimestampOrdering,
                        format!(
                            "certification time {} precedes declared send time {}",
                            iso(cert), iso(send)
                        ),
                    )
                    .with_evidence(evidence),
                );
            } else {
                findings.push(
                    Finding::passed(
                        FindingCategory::TimestampOrdering,
                        "certification time does not precede declared send time",
                    )
                    .with_evidence(evidence),
                );
            }
        }

        // No claim may sit in the future relative to the trusted time
        for ts in timestamps {
            findings.push(self.future_dating_finding(ts, trusted, time_unavailable_reason));
        }

        // Independent sources claiming the certification event must agree
        if let (Some(cert), Some(signed)) = (certification, signature_declared) {
            findings.push(self.source_agreement_finding(cert, signed));
        }

        findings
    }

    fn future_dating_finding(
        &self,
        ts: &EmbeddedTimestamp,
        trusted: Option<&TrustedTime>,
        time_unavailable_reason: Option<&str>,
    ) -> Finding {
        let Some(trusted) = trusted else {
            return Finding::indeterminate(
                FindingCategory::TimestampOrdering,
                format!("{} time vs trusted time could not be checked", ts.label),
                time_unavailable_reason.unwrap_or("trusted time unavailable"),
            );
        };

        let limit = trusted.at + self.skew_tolerance;
        let evidence = Evidence::ComparedTimestamps {
            first_label: ts.label.to_string(),
            first: ts.claimed,
            second_label: "trusted-time".to_string(),
            second: trusted.at,
        };
        if ts.claimed > limit {
            Finding::failed(
                FindingCategory::TimestampOrdering,
                format!(
                    "{} time {} lies in the future of trusted time {} beyond the {}s tolerance",
                    ts.label,
                    iso(ts),
                    trusted.at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    self.skew_tolerance.num_seconds()
                ),
            )
            .with_evidence(evidence)
        } else {
            Finding::passed(
                FindingCategory::TimestampOrdering,
                format!("{} time is not in the future of the trusted time", ts.label),
            )
            .with_evidence(evidence)
        }
    }

    fn source_agreement_finding(
        &self,
        certification: &EmbeddedTimestamp,
        signature_declared: &EmbeddedTimestamp,
    ) -> Finding {
        let gap = (certification.claimed - signature_declared.claimed).abs();
        let evidence = compared(certification, signature_declared);
        if gap > self.skew_tolerance {
            Finding::failed(
                FindingCategory::TimestampSourceMismatch,
                format!(
                    "certification data and signature disagree on the certification \
                     instant by {}s (tolerance {}s)",
                    gap.num_seconds(),
                    self.skew_tolerance.num_seconds()
                ),
            )
            .with_evidence(evidence)
        } else {
            Finding::passed(
                FindingCategory::TimestampSourceMismatch,
                "certification data and signature agree on the certification instant",
            )
            .with_evidence(evidence)
        }
    }
}

fn claim(
    timestamps: &[EmbeddedTimestamp],
    label: TimestampLabel,
) -> Option<&EmbeddedTimestamp> {
    timestamps.iter().find(|t| t.label == label)
}

fn compared(a: &EmbeddedTimestamp, b: &EmbeddedTimestamp) -> Evidence {
    Evidence::ComparedTimestamps {
        first_label: a.label.to_string(),
        first: a.claimed,
        second_label: b.label.to_string(),
        second: b.claimed,
    }
}

fn iso(ts: &EmbeddedTimestamp) -> String {
    ts.claimed
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
