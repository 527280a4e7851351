//! Fetch Error Types

use thiserror::Error;

/// Errors that can occur while talking to the explorer API
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport level failure (connection, TLS, timeout)
    #[error("HTTP error requesting {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Response body is missing expected fields
    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    /// Transient failures kept happening until the retry budget ran out
    #[error("Giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// Every batch of a batched fetch failed, so there is no data at all
    #[error("All {batches} batches failed while fetching validator {what}")]
    AllBatchesFailed { what: &'static str, batches: usize },
}

impl FetchError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Malformed { .. }
            | FetchError::RetriesExhausted { .. }
            | FetchError::AllBatchesFailed { .. } => false,
        }
    }
}
