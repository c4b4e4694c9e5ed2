//! Error types for certified-email verification operations.
//! Error handling types and result definitions for the verification engine.

use thiserror::Error;

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Sub-reason for inputs that do not match the transport-certification structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// The file is not parseable as an email message at all.
    NotAnEmail,
    /// The message parses but carries no certification envelope
    /// (certification data part and/or detached signature missing).
    MissingCertificationBlock,
    /// A body part uses a content-transfer-encoding the engine does not support.
    UnsupportedEncoding,
}

impl MalformedReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedReason::NotAnEmail => "not-an-email",
            MalformedReason::MissingCertificationBlock => "missing-certification-block",
            MalformedReason::UnsupportedEncoding => "unsupported-encoding",
        }
    }
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comprehensive error types for verification operations.
///
/// Failures that prevent producing any verdict (unreadable file, input that is
/// not a certification artifact, unwritable report destination) surface through
/// these variants. Failures that defeat only a single check are absorbed into
/// the finding set instead and never reach the caller as an error.
#[derive(Error, Debug, miette::Diagnostic)]
pub enum VerifyError {
    #[error("IO failure: {0}")]
    IoFailure(String),

    #[error("malformed input ({reason}): {detail}")]
    MalformedInput {
        reason: MalformedReason,
        detail: String,
    },

    #[error("time source unreachable: {0}")]
    TimeSourceUnreachable(String),

    #[error("time source returned an invalid response: {0}")]
    TimeSourceInvalidResponse(String),

    #[error("report write failure: {0}")]
    WriteFailure(String),

    #[error("cryptographic error: {0}")]
    CryptoError(String),

    #[error("ASN.1 encoding/decoding error: {0}")]
    Asn1Error(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("invalid input: {0}")]
    ValidationError(String),
}

impl VerifyError {
    /// Shorthand for a `MalformedInput` with the given sub-reason.
    pub fn malformed(reason: MalformedReason, detail: impl Into<String>) -> Self {
        VerifyError::MalformedInput {
            reason,
            detail: detail.into(),
        }
    }
}

impl From<der::Error> for VerifyError {
    fn from(error: der::Error) -> Self {
        VerifyError::Asn1Error(error.to_string())
    }
}

impl From<reqwest::Error> for VerifyError {
    fn from(error: reqwest::Error) -> Self {
        VerifyError::NetworkError(error.to_string())
    }
}

impl From<std::io::Error> for VerifyError {
    fn from(error: std::io::Error) -> Self {
        VerifyError::IoFailure(error.to_string())
    }
}
