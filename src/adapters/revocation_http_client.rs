//! Revocation source HTTP adapter.
//! Fetches certificate revocation lists from the distribution points
//! declared by chain certificates. All requests are bounded by the
//! configured network timeout so a dead endpoint can never stall a run.

use crate::infra::error::{VerifyError, VerifyResult};
use std::time::Duration;

/// HTTP adapter performing CRL retrievals.
pub struct RevocationHttpClient {
    http: reqwest::blocking::Client,
}

impl RevocationHttpClient {
    /// Create a new client with the given request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("pec-verifier/1.0")
            .build()
            .expect("reqwest client build");
        Self { http }
    }

    /// Fetch the DER CRL published at the given distribution point.
    pub fn fetch_crl(&self, uri: &str) -> VerifyResult<Vec<u8>> {
        log::debug!("fetching CRL from {uri}");
        let resp = self
            .http
            .get(uri)
            .header("Accept", "application/pkix-crl")
            .send()
            .map_err(|e| VerifyError::NetworkError(format!("CRL request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(VerifyError::NetworkError(format!(
                "HTTP {} from {uri}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .map_err(|e| VerifyError::NetworkError(format!("CRL body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}
