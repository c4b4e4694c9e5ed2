//! Verification orchestrator service.
//!
//! The sole public entry point of the engine. Sequences parser → signature
//! verifier + timestamp checker → verdict aggregation → report rendering.
//! Only verdict-preventing failures (unreadable file, unparseable artifact,
//! unwritable report) surface as errors; a failure inside a sub-check is
//! absorbed as an internal-error finding so partial results stay usable.

use crate::adapters::ntp_client::{NtpClient, NtpClientConfig};
use crate::adapters::revocation_http_client::RevocationHttpClient;
use crate::domain::chain::ChainCertificate;
use crate::domain::finding::{Finding, FindingCategory};
use crate::domain::types::{CaseInfo, NtpServerAddr, TrustedTime, TrustedTimeSource};
use crate::domain::verdict::VerificationVerdict;
use crate::infra::config::VerificationConfiguration;
use crate::infra::error::{VerifyError, VerifyResult};
use crate::services::parser::MessageParserService;
use crate::services::report::{ReportRenderService, REPORT_FILE_NAME};
use crate::services::signature::SignatureVerifierService;
use crate::services::timestamps::TimestampConsistencyService;
use chrono::Utc;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use x509_cert::Certificate;

/// Strongly typed request for one verification run.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    /// Path to the transport artifact (`.eml`).
    pub eml_path: PathBuf,
    /// Case metadata from the case-management collaborator.
    pub case: CaseInfo,
    /// Trusted time, or the authority to obtain it from.
    pub time_source: TrustedTimeSource,
}

/// Service orchestrating a full verification run.
pub struct VerificationService {
    config: VerificationConfiguration,
    roots: Vec<ChainCertificate>,
}

impl VerificationService {
    /// Build the service, loading the trusted root store when configured.
    pub fn new(config: VerificationConfiguration) -> VerifyResult<Self> {
        let roots = match &config.trusted_roots_path {
            Some(path) => load_root_store(path)?,
            None => Vec::new(),
        };
        log::debug!("trusted root store holds {} certificate(s)", roots.len());
        Ok(Self { config, roots })
    }

    /// Verify one artifact and write its report next to the input file.
    pub fn verify(&self, request: &VerifyRequest) -> VerifyResult<VerificationVerdict> {
        log::info!(
            "verifying {} for case {}",
            request.eml_path.display(),
            request.case.name()
        );

        let raw = fs::read(&request.eml_path).map_err(|e| {
            VerifyError::IoFailure(format!("cannot read {}: {e}", request.eml_path.display()))
        })?;

        let message = MessageParserService::parse(&raw)?;

        let (trusted, time_failure) = self.resolve_trusted_time(&request.time_source);
        if let Some(reason) = &time_failure {
            log::warn!("trusted time unavailable, timestamp checks degrade: {reason}");
        }

        let mut findings: Vec<Finding> = Vec::new();

        let revocation_client = self
            .config
            .check_revocation
            .then(|| RevocationHttpClient::new(self.config.network_timeout()));

        let signature_findings = catch_unwind(AssertUnwindSafe(|| {
            let verifier =
                SignatureVerifierService::new(&self.roots, revocation_client.as_ref());
            verifier.verify(
                &message.certification,
                message.certification.certification_time,
                trusted.as_ref(),
                time_failure.as_deref(),
            )
        }));
        absorb(&mut findings, signature_findings, "signature verifier");

        let timestamp_findings = catch_unwind(AssertUnwindSafe(|| {
            let checker =
                TimestampConsistencyService::new(self.config.clock_skew_tolerance());
            checker.check(&message.timestamps, trusted.as_ref(), time_failure.as_deref())
        }));
        absorb(&mut findings, timestamp_findings, "timestamp checker");

        let verdict = VerificationVerdict::aggregate(findings, trusted, Utc::now());
        log::info!(
            "verdict: {} ({} finding(s), {} failing)",
            verdict.overall,
            verdict.findings.len(),
            verdict.count_where(Some(false))
        );

        let report_path = report_path_for(&request.eml_path);
        ReportRenderService::render(&verdict, &request.case, &request.eml_path, &report_path)?;

        Ok(verdict)
    }

    /// Resolve the trusted time for this run. Failure never falls back to
    /// the local clock; it is recorded so dependent findings can carry it.
    fn resolve_trusted_time(
        &self,
        source: &TrustedTimeSource,
    ) -> (Option<TrustedTime>, Option<String>) {
        match source {
            TrustedTimeSource::Provided(time) => (Some(time.clone()), None),
            TrustedTimeSource::Authority(addr) => {
                let fallbacks: Vec<NtpServerAddr> = self
                    .config
                    .fallback_ntp_servers
                    .iter()
                    .filter_map(|s| NtpServerAddr::new(s).ok())
                    .collect();
                let client = NtpClient::new(NtpClientConfig {
                    primary: addr.clone(),
                    fallbacks,
                    timeout: self.config.network_timeout(),
                    retries_per_server: self.config.retry_attempts,
                    retry_delay: self.config.retry_delay(),
                });
                match client.fetch_trusted_time() {
                    Ok(time) => (Some(time), None),
                    Err(e) => (None, Some(e.to_string())),
                }
            }
        }
    }
}

/// The report always lands next to the examined file, under a fixed name.
#[must_use]
pub fn report_path_for(eml_path: &Path) -> PathBuf {
    eml_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(REPORT_FILE_NAME)
}

fn absorb(
    findings: &mut Vec<Finding>,
    result: std::thread::Result<Vec<Finding>>,
    stage: &str,
) {
    match result {
        Ok(produced) => findings.extend(produced),
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("{stage} aborted: {detail}");
            findings.push(Finding::failed(
                FindingCategory::InternalError,
                format!("{stage} aborted unexpectedly ({detail}); partial results retained"),
            ));
        }
    }
}

fn load_root_store(path: &Path) -> VerifyResult<Vec<ChainCertificate>> {
    let pem = fs::read(path).map_err(|e| {
        VerifyError::ConfigurationError(format!(
            "cannot read trusted root store {}: {e}",
            path.display()
        ))
    })?;
    let certificates = Certificate::load_pem_chain(&pem).map_err(|e| {
        VerifyError::ConfigurationError(format!(
            "trusted root store {} is not a PEM certificate bundle: {e}",
            path.display()
        ))
    })?;
    certificates
        .iter()
        .map(ChainCertificate::from_certificate)
        .collect()
}
