// ABOUTME: Error taxonomy shared by the POS and marketing API clients
// ABOUTME: Classifies failures as auth, transient, or permanent so the orchestrator can act on them

use reqwest::StatusCode;
use thiserror::Error;

/// How a failed API call should be treated by the orchestrator.
///
/// The variant decides the record's fate: `Transient` leaves no trace so
/// the record is retried on the next run, `Permanent` quarantines it in
/// the ledger, and `Auth` aborts the run because every later call with
/// the same credentials would fail too.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }

    /// Classify a non-success HTTP status plus whatever body text came with it.
    ///
    /// 401/403 are credential problems. Timeouts, rate limits and 5xx are
    /// worth retrying on a later run. Every other 4xx means the request
    /// itself was rejected and a retry would be rejected the same way.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ApiError::Auth(detail)
        } else if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            ApiError::Transient(detail)
        } else {
            ApiError::Permanent(detail)
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            // Malformed URL or headers in the request itself
            ApiError::Permanent(err.to_string())
        } else {
            // Timeouts, connection failures, response-decoding trouble
            ApiError::Transient(err.to_string())
        }
    }
}
