//! PEC Integrity Verification Engine
//!
//! A self-contained library for verifying certified-email (PEC) transport
//! receipts: signature and certificate-chain validation, timestamp
//! cross-checking against a trusted network time source, and deterministic
//! forensic PDF reporting.

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

use std::path::Path;

pub use domain::chain::{CertificateChain, ChainCertificate, RevocationStatus};
pub use domain::finding::{Evidence, Finding, FindingCategory, FindingStatus};
pub use domain::message::{CertifiedMessage, EmbeddedTimestamp, TimestampLabel};
pub use domain::types::{CaseInfo, NtpServerAddr, TrustedTime, TrustedTimeSource};
pub use domain::verdict::{Overall, VerificationVerdict};
pub use infra::config::{ConfigManager, VerificationConfiguration};
pub use infra::error::{MalformedReason, VerifyError, VerifyResult};
pub use pipelines::verify::VerifyWorkflow;
pub use services::verification::{VerificationService, VerifyRequest};

/// Main verification function - verifies a certified-email artifact.
///
/// Reads the artifact, runs every check, writes the forensic report next to
/// the input file and returns the aggregated verdict. Verdict-preventing
/// failures (unreadable file, non-certification input, unwritable report)
/// come back as typed errors.
pub fn verify_pec_file<P: AsRef<Path>>(
    eml_path: P,
    case: CaseInfo,
    time_source: TrustedTimeSource,
    config: VerificationConfiguration,
) -> VerifyResult<VerificationVerdict> {
    log::info!("starting certified-email verification");
    let service = VerificationService::new(config)?;
    let request = VerifyRequest {
        eml_path: eml_path.as_ref().to_path_buf(),
        case,
        time_source,
    };
    service.verify(&request)
}
