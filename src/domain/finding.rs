//! Atomic verification results.
//!
//! A `Finding` is one independent check outcome. Findings are append-only
//! within a run and are never short-circuited: a failed digest comparison
//! does not suppress chain or timestamp findings, because the forensic
//! report must carry the complete evidence set.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Category of an atomic verification result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingCategory {
    SignatureValidity,
    ChainTrust,
    ChainExpiry,
    ChainRevocation,
    TimestampOrdering,
    TimestampSourceMismatch,
    ParseError,
    InternalError,
}

impl FindingCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::SignatureValidity => "signature-validity",
            FindingCategory::ChainTrust => "chain-trust",
            FindingCategory::ChainExpiry => "chain-expiry",
            FindingCategory::ChainRevocation => "chain-revocation",
            FindingCategory::TimestampOrdering => "timestamp-ordering",
            FindingCategory::TimestampSourceMismatch => "timestamp-source-mismatch",
            FindingCategory::ParseError => "parse-error",
            FindingCategory::InternalError => "internal-error",
        }
    }

    /// Categories whose outcome depends on a trusted time value.
    #[must_use]
    pub fn is_timestamp_dependent(&self) -> bool {
        matches!(
            self,
            FindingCategory::TimestampOrdering | FindingCategory::ChainExpiry
        )
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single check.
///
/// `Indeterminate` means the check could not be completed (unreachable
/// revocation source, no trusted time); it is distinct from both passing
/// and failing and is never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingStatus {
    Passed,
    Failed,
    Indeterminate { reason: String },
}

impl FindingStatus {
    /// Two-valued view; `None` when the check could not be performed.
    #[must_use]
    pub fn passed(&self) -> Option<bool> {
        match self {
            FindingStatus::Passed => Some(true),
            FindingStatus::Failed => Some(false),
            FindingStatus::Indeterminate { .. } => None,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, FindingStatus::Failed)
    }

    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, FindingStatus::Indeterminate { .. })
    }

    /// Short marker used in report rendering.
    #[must_use]
    pub fn marker(&self) -> &'static str {
        match self {
            FindingStatus::Passed => "PASS",
            FindingStatus::Failed => "FAIL",
            FindingStatus::Indeterminate { .. } => "INDETERMINATE",
        }
    }
}

/// Structured payload attached to a finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Two timestamp claims that were compared.
    ComparedTimestamps {
        first_label: String,
        first: DateTime<Utc>,
        second_label: String,
        second: DateTime<Utc>,
    },
    /// Expected vs recomputed digest, hex-encoded.
    DigestComparison {
        covered_hex: String,
        computed_hex: String,
    },
    /// A certificate validity window against a reference instant.
    CertificateWindow {
        subject: String,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        reference_label: String,
        reference: DateTime<Utc>,
    },
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iso = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
        match self {
            Evidence::ComparedTimestamps {
                first_label,
                first,
                second_label,
                second,
            } => write!(
                f,
                "{first_label}={} {second_label}={}",
                iso(first),
                iso(second)
            ),
            Evidence::DigestComparison {
                covered_hex,
                computed_hex,
            } => write!(f, "covered={covered_hex} computed={computed_hex}"),
            Evidence::CertificateWindow {
                subject,
                not_before,
                not_after,
                reference_label,
                reference,
            } => write!(
                f,
                "{subject}: validity [{}, {}] vs {reference_label}={}",
                iso(not_before),
                iso(not_after),
                iso(reference)
            ),
        }
    }
}

/// One atomic verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub category: FindingCategory,
    pub status: FindingStatus,
    pub detail: String,
    pub evidence: Option<Evidence>,
}

impl Finding {
    #[must_use]
    pub fn passed(category: FindingCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            status: FindingStatus::Passed,
            detail: detail.into(),
            evidence: None,
        }
    }

    #[must_use]
    pub fn failed(category: FindingCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            status: FindingStatus::Failed,
            detail: detail.into(),
            evidence: None,
        }
    }

    #[must_use]
    pub fn indeterminate(
        category: FindingCategory,
        detail: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            category,
            status: FindingStatus::Indeterminate {
                reason: reason.into(),
            },
            detail: detail.into(),
            evidence: None,
        }
    }

    #[must_use]
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_tristate() {
        assert_eq!(FindingStatus::Passed.passed(), Some(true));
        assert_eq!(FindingStatus::Failed.passed(), Some(false));
        let ind = FindingStatus::Indeterminate {
            reason: "revocation source unreachable".into(),
        };
        assert_eq!(ind.passed(), None);
        assert!(ind.is_indeterminate());
    }

    #[test]
    fn category_names() {
        assert_eq!(
            FindingCategory::SignatureValidity.as_str(),
            "signature-validity"
        );
        assert_eq!(
            FindingCategory::TimestampSourceMismatch.as_str(),
            "timestamp-source-mismatch"
        );
    }

    #[test]
    fn evidence_rendering_is_stable() {
        let ev = Evidence::ComparedTimestamps {
            first_label: "certification".into(),
            first: Utc.with_ymd_and_hms(2023, 6, 15, 10, 30, 45).unwrap(),
            second_label: "declared-send".into(),
            second: Utc.with_ymd_and_hms(2023, 6, 15, 10, 29, 0).unwrap(),
        };
        assert_eq!(
            ev.to_string(),
            "certification=2023-06-15T10:30:45Z declared-send=2023-06-15T10:29:00Z"
        );
    }
}
