//! Error types.
//!
//! `OracleError` is the transport taxonomy shared with `examlens-providers`;
//! it lives here so the extraction protocol can downcast and classify
//! failures without string matching. `ExtractionError` is the reason an
//! individual attempt failed. Neither reaches callers of the analysis paths.

use thiserror::Error;

/// Errors that can occur when talking to an oracle backend.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl OracleError {
    /// Returns `true` if retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            OracleError::AuthenticationFailed(_) | OracleError::ModelNotFound(_)
        )
    }
}

/// Why a single oracle attempt did not yield an acceptable record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    /// The oracle call itself failed.
    #[error("oracle transport failure: {0}")]
    Transport(String),

    /// The attempt exceeded the per-attempt timeout.
    #[error("oracle attempt timed out after {0}ms")]
    Timeout(u64),

    /// The reply was not a JSON object.
    #[error("reply is not a JSON object: {0}")]
    Parse(String),

    /// A required field was absent.
    #[error("reply is missing field '{0}'")]
    MissingField(String),

    /// A required field had the wrong JSON type.
    #[error("field '{field}' should be {expected}, got {found}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: String,
    },

    /// The record was well-formed but failed a semantic check.
    #[error("reply rejected: {0}")]
    Rejected(String),
}

impl ExtractionError {
    /// Transport-level failures (as opposed to format failures).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ExtractionError::Transport(_) | ExtractionError::Timeout(_)
        )
    }
}

/// Input validation failures for score judgment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradingError {
    #[error("full score must be greater than 0")]
    ZeroFullScore,

    #[error("question type '{0}' is not graded by judgment (objective or unknown)")]
    UnsupportedQuestionType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_oracle_errors() {
        assert!(OracleError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(OracleError::ModelNotFound("x".into()).is_permanent());
        assert!(!OracleError::RateLimited { retry_after_ms: 10 }.is_permanent());
        assert!(!OracleError::Timeout(5).is_permanent());
    }

    #[test]
    fn extraction_error_messages() {
        let e = ExtractionError::WrongType {
            field: "score".into(),
            expected: "an integer",
            found: "\"seven\"".into(),
        };
        assert_eq!(e.to_string(), "field 'score' should be an integer, got \"seven\"");
        assert!(ExtractionError::Timeout(100).is_transport());
        assert!(!ExtractionError::MissingField("a".into()).is_transport());
    }
}
