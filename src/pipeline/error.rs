//! Pipeline error taxonomy.
//!
//! Unit-level failures are contained by the scheduler (the batch keeps
//! going); errors surfacing from `run_batch` itself are batch-fatal.

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Failed to rasterize {unit}: {reason}")]
    Rasterize { unit: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the hosted recognition service.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("Recognition service unreachable: {0}")]
    Unreachable(String),

    #[error("Recognition service rate limited the request")]
    RateLimited,

    #[error("Transient recognition failure: {0}")]
    Transient(String),

    #[error("Recognition API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed recognition payload: {0}")]
    Payload(String),
}

impl RecognitionError {
    /// Whether a retry with backoff has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecognitionError::RateLimited
                | RecognitionError::Transient(_)
                | RecognitionError::Unreachable(_)
        )
    }

    /// Rate limits get a longer, exponential backoff than other
    /// transient failures.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RecognitionError::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(RecognitionError::RateLimited.is_retryable());
        assert!(RecognitionError::Transient("503".into()).is_retryable());
        assert!(RecognitionError::Unreachable("refused".into()).is_retryable());
        assert!(!RecognitionError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!RecognitionError::Payload("truncated".into()).is_retryable());
    }
}
