//! Aggregate verdict over a verification run.
//!
//! Aggregation invariant: the verdict is `Valid` iff every finding passed;
//! any failed finding forces `Invalid`; an unresolved required check forces
//! `Indeterminate` unless some other finding already failed (failure wins).

use crate::domain::finding::{Finding, FindingStatus};
use crate::domain::types::TrustedTime;
use chrono::{DateTime, Utc};
use std::fmt;

/// Overall outcome of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overall {
    Valid,
    Invalid,
    Indeterminate,
}

impl Overall {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Overall::Valid => "VALID",
            Overall::Invalid => "INVALID",
            Overall::Indeterminate => "INDETERMINATE",
        }
    }
}

impl fmt::Display for Overall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate over all findings of a single verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationVerdict {
    pub overall: Overall,
    /// Findings in production order.
    pub findings: Vec<Finding>,
    /// Trusted time the run used, when one was obtainable.
    pub trusted_time_used: Option<TrustedTime>,
    pub generated_at: DateTime<Utc>,
}

impl VerificationVerdict {
    /// Aggregate findings into a verdict per the invariant above.
    #[must_use]
    pub fn aggregate(
        findings: Vec<Finding>,
        trusted_time_used: Option<TrustedTime>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let overall = Self::overall_of(&findings);
        Self {
            overall,
            findings,
            trusted_time_used,
            generated_at,
        }
    }

    fn overall_of(findings: &[Finding]) -> Overall {
        let mut indeterminate = false;
        for finding in findings {
            match finding.status {
                FindingStatus::Failed => return Overall::Invalid,
                FindingStatus::Indeterminate { .. } => indeterminate = true,
                FindingStatus::Passed => {}
            }
        }
        if indeterminate {
            Overall::Indeterminate
        } else {
            Overall::Valid
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.overall == Overall::Valid
    }

    /// Number of findings with the given two-valued outcome.
    #[must_use]
    pub fn count_where(&self, passed: Option<bool>) -> usize {
        self.findings
            .iter()
            .filter(|f| f.status.passed() == passed)
            .count()
    }
}
