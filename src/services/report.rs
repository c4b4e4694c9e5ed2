//! Forensic report rendering service.
//!
//! Lays the verdict out as a fixed sequence of text lines and hands them to
//! the deterministic PDF writer. Findings are rendered in production order;
//! everything above the final generation-timestamp line is a pure function
//! of the verdict, so repeated runs over the same input diff clean.

use crate::adapters::pdf_writer::{self, PdfLine};
use crate::domain::finding::{Finding, FindingStatus};
use crate::domain::types::CaseInfo;
use crate::domain::verdict::VerificationVerdict;
use crate::infra::error::{VerifyError, VerifyResult};
use chrono::SecondsFormat;
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed name of the report artifact, written next to the examined file.
pub const REPORT_FILE_NAME: &str = "report_integrity_pec_verification.pdf";

/// Handle to a written report artifact.
#[derive(Debug, Clone)]
pub struct ReportHandle {
    pub path: PathBuf,
    pub bytes_written: usize,
}

/// Service rendering verdicts into PDF report artifacts.
pub struct ReportRenderService;

impl ReportRenderService {
    /// Render the verdict and write the artifact to `output_path`.
    pub fn render(
        verdict: &VerificationVerdict,
        case: &CaseInfo,
        source_file: &Path,
        output_path: &Path,
    ) -> VerifyResult<ReportHandle> {
        let lines = Self::layout(verdict, case, source_file);
        let pdf = pdf_writer::render_document(&lines);
        fs::write(output_path, &pdf).map_err(|e| {
            VerifyError::WriteFailure(format!(
                "cannot write report {}: {e}",
                output_path.display()
            ))
        })?;
        log::info!(
            "report written: {} ({} bytes)",
            output_path.display(),
            pdf.len()
        );
        Ok(ReportHandle {
            path: output_path.to_path_buf(),
            bytes_written: pdf.len(),
        })
    }

    /// The fixed document layout.
    ///
    /// Every line except the trailing generation timestamp is a
    /// deterministic function of the verdict.
    #[must_use]
    pub fn layout(
        verdict: &VerificationVerdict,
        case: &CaseInfo,
        source_file: &Path,
    ) -> Vec<PdfLine> {
        let mut lines = Vec::new();

        lines.push(PdfLine::title("CERTIFIED EMAIL INTEGRITY VERIFICATION"));
        lines.push(PdfLine::body(""));

        lines.push(PdfLine::heading("Case identification"));
        lines.push(PdfLine::body(format!("Case: {}", case.name())));
        lines.push(PdfLine::body(format!(
            "Case folder: {}",
            case.cases_folder().display()
        )));
        lines.push(PdfLine::body(format!(
            "Examined file: {}",
            source_file.display()
        )));
        lines.push(PdfLine::body(""));

        lines.push(PdfLine::heading(format!(
            "Overall verdict: {}",
            verdict.overall
        )));
        match &verdict.trusted_time_used {
            Some(trusted) => lines.push(PdfLine::body(format!("Trusted time used: {trusted}"))),
            None => lines.push(PdfLine::body("Trusted time used: unavailable")),
        }
        lines.push(PdfLine::body(""));

        lines.push(PdfLine::heading("Findings"));
        if verdict.findings.is_empty() {
            lines.push(PdfLine::body("(no findings produced)"));
        }
        for (index, finding) in verdict.findings.iter().enumerate() {
            render_finding(&mut lines, index + 1, finding);
        }
        lines.push(PdfLine::body(""));

        lines.push(PdfLine::body(format!(
            "Generated at: {}",
            verdict
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        )));

        lines
    }
}

fn render_finding(lines: &mut Vec<PdfLine>, number: usize, finding: &Finding) {
    lines.push(PdfLine::body(format!(
        "{number}. [{}] {} - {}",
        finding.status.marker(),
        finding.category,
        finding.detail
    )));
    if let FindingStatus::Indeterminate { reason } = &finding.status {
        lines.push(PdfLine::body(format!("      reason: {reason}")));
    }
    if let Some(evidence) = &finding.evidence {
        lines.push(PdfLine::body(format!("      evidence: {evidence}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::finding::{Finding, FindingCategory};
    use crate::domain::types::TrustedTime;
    use chrono::{TimeZone, Utc};

    fn verdict() -> VerificationVerdict {
        VerificationVerdict::aggregate(
            vec![
                Finding::passed(FindingCategory::SignatureValidity, "digest matches"),
                Finding::indeterminate(
                    FindingCategory::ChainRevocation,
                    "revocation status of CN=signer",
                    "CRL endpoint unreachable",
                ),
            ],
            Some(TrustedTime::new(
                Utc.with_ymd_and_hms(2023, 6, 15, 10, 30, 45).unwrap(),
                "pool.ntp.org",
            )),
            Utc.with_ymd_and_hms(2023, 6, 15, 10, 31, 0).unwrap(),
        )
    }

    fn case() -> CaseInfo {
        CaseInfo::new("case-042", "/cases").unwrap()
    }

    #[test]
    fn layout_lists_findings_in_order() {
        let lines = ReportRenderService::layout(&verdict(), &case(), Path::new("receipt.eml"));
        let text: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        let sig_idx = text
            .iter()
            .position(|l| l.contains("signature-validity"))
            .unwrap();
        let rev_idx = text
            .iter()
            .position(|l| l.contains("chain-revocation"))
            .unwrap();
        assert!(sig_idx < rev_idx);
        assert!(text.iter().any(|l| l.contains("reason: CRL endpoint unreachable")));
        assert!(text
            .iter()
            .any(|l| l.contains("Overall verdict: INDETERMINATE")));
    }

    #[test]
    fn salient_layout_is_deterministic() {
        let a = ReportRenderService::layout(&verdict(), &case(), Path::new("receipt.eml"));
        let b = ReportRenderService::layout(&verdict(), &case(), Path::new("receipt.eml"));
        assert_eq!(a, b);
    }

    #[test]
    fn generation_timestamp_is_last_line() {
        let lines = ReportRenderService::layout(&verdict(), &case(), Path::new("receipt.eml"));
        assert!(lines.last().unwrap().text.starts_with("Generated at: "));
    }

    #[test]
    fn render_writes_pdf() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join(REPORT_FILE_NAME);
        let handle =
            ReportRenderService::render(&verdict(), &case(), Path::new("receipt.eml"), &out)
                .unwrap();
        assert!(out.exists());
        assert_eq!(handle.bytes_written, fs::read(&out).unwrap().len());
    }

    #[test]
    fn render_fails_on_unwritable_destination() {
        let err = ReportRenderService::render(
            &verdict(),
            &case(),
            Path::new("receipt.eml"),
            Path::new("/nonexistent-dir/deep/report.pdf"),
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::WriteFailure(_)));
    }
}
