//! Failure taxonomy for registry and API lookups.
//!
//! Every external call in the pipeline fails with one of these variants so
//! that the retry layer can decide locally what is worth retrying and the
//! resolution engine can fall through tiers on everything else.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    /// The page or payload loaded, but the expected structure (detail table,
    /// success envelope) was absent.
    #[error("expected structure absent: {0}")]
    NotFound(String),

    /// A search entry point returned zero candidates.
    #[error("search returned no results")]
    NoResults,

    /// Bot-mitigation content was still present after the operator pause.
    #[error("blocked by bot-mitigation challenge")]
    Blocked,

    /// A bounded wait (page load, element wait) expired.
    #[error("timed out: {0}")]
    Timeout(String),

    /// HTTP 429. Carries the server-supplied retry delay when parseable.
    #[error("rate limited (HTTP 429)")]
    RateLimited { retry_after: Option<f64> },

    /// HTTP 5xx, or a success response whose body could not be parsed.
    #[error("server fault: {0}")]
    ServerFault(String),

    /// Transport-level failure (DNS, connect, TLS, mid-body timeout).
    #[error("network fault: {0}")]
    NetworkFault(String),
}

impl LookupError {
    /// Whether the backoff controller may retry this failure. Everything
    /// else propagates immediately as a tier failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LookupError::RateLimited { .. }
                | LookupError::ServerFault(_)
                | LookupError::NetworkFault(_)
        )
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LookupError::NetworkFault(format!("request timed out: {err}"))
        } else if err.is_decode() {
            // Body arrived but was not what we asked reqwest to decode.
            LookupError::ServerFault(format!("malformed response body: {err}"))
        } else {
            LookupError::NetworkFault(err.to_string())
        }
    }
}
