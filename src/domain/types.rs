//! Type-safe wrappers using new-type pattern
//!
//! This module provides type-safe wrappers for the inputs to a verification
//! run: case metadata, time-authority addresses and trusted-time values.

use crate::infra::error::{VerifyError, VerifyResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Type-safe wrapper for network time authority addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtpServerAddr(String);

impl NtpServerAddr {
    /// Create a new `NtpServerAddr` after validation
    pub fn new(addr: impl AsRef<str>) -> VerifyResult<Self> {
        let addr = addr.as_ref();
        Self::validate_addr(addr)?;
        Ok(NtpServerAddr(addr.to_string()))
    }

    /// Get the address as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address in `host:port` form; port 123 is assumed when absent.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        if self.0.contains(':') {
            self.0.clone()
        } else {
            format!("{}:123", self.0)
        }
    }

    /// Validate that the address is reasonable for a time query
    fn validate_addr(addr: &str) -> VerifyResult<()> {
        if addr.is_empty() {
            return Err(VerifyError::ValidationError(
                "Time authority address is empty".to_string(),
            ));
        }

        // Bare host or host:port, never a URL
        if addr.contains("://") {
            return Err(VerifyError::ValidationError(format!(
                "Time authority address must be a host, not a URL: {addr}"
            )));
        }

        if addr.chars().any(char::is_whitespace) {
            return Err(VerifyError::ValidationError(format!(
                "Time authority address contains whitespace: {addr}"
            )));
        }

        // Basic domain validation - must contain at least one dot
        let host = addr.split(':').next().unwrap_or(addr);
        if !host.contains('.') {
            return Err(VerifyError::ValidationError(format!(
                "Time authority address must contain a valid domain: {addr}"
            )));
        }

        if let Some(port) = addr.split(':').nth(1) {
            port.parse::<u16>().map_err(|_| {
                VerifyError::ValidationError(format!("Invalid port in time authority: {addr}"))
            })?;
        }

        Ok(())
    }
}

impl FromStr for NtpServerAddr {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for NtpServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Case metadata supplied by the case-management collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInfo {
    name: String,
    cases_folder: PathBuf,
}

impl CaseInfo {
    /// Create case metadata after validating the case name.
    pub fn new(name: impl Into<String>, cases_folder: impl Into<PathBuf>) -> VerifyResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(VerifyError::ValidationError(
                "Case name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            cases_folder: cases_folder.into(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn cases_folder(&self) -> &PathBuf {
        &self.cases_folder
    }
}

/// A time value obtained from a trusted network authority.
///
/// The engine compares embedded timestamp claims against this value and
/// never against the local clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedTime {
    /// The authoritative instant.
    pub at: DateTime<Utc>,
    /// Human-readable origin (authority address).
    pub source: String,
}

impl TrustedTime {
    #[must_use]
    pub fn new(at: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            at,
            source: source.into(),
        }
    }
}

impl fmt::Display for TrustedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.source
        )
    }
}

/// Where the trusted time for a run comes from: an already-obtained value,
/// or an authority the engine must query itself.
#[derive(Debug, Clone)]
pub enum TrustedTimeSource {
    /// Caller supplies the trusted time directly.
    Provided(TrustedTime),
    /// Engine queries this authority (with configured fallbacks).
    Authority(NtpServerAddr),
}
