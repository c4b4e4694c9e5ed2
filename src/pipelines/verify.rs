//! `VerifyWorkflow`: high-level facade for verifying transport artifacts.
//!
//! Delegates to `VerificationService`; gives embedding callers a ready-made
//! entry object carrying the engine configuration.

use crate::{
    domain::verdict::VerificationVerdict,
    infra::config::VerificationConfiguration,
    services::verification::{VerificationService, VerifyRequest},
    VerifyResult,
};

/// Orchestrates verification runs over certified-email artifacts.
pub struct VerifyWorkflow {
    svc: VerificationService,
}

impl VerifyWorkflow {
    /// Build the workflow from an engine configuration.
    pub fn new(config: VerificationConfiguration) -> VerifyResult<Self> {
        Ok(Self {
            svc: VerificationService::new(config)?,
        })
    }

    /// Run verification for the given request.
    pub fn run(&self, request: &VerifyRequest) -> VerifyResult<VerificationVerdict> {
        self.svc.verify(request)
    }
}
