//! Error taxonomy for the arbitration layer.
//!
//! None of these ever surface to the end user; the turn pipeline maps every
//! branch to a safe no-op or a single clarifying question.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NelaError {
    /// The classifier endpoint could not be reached or timed out
    #[error("classifier request failed: {0}")]
    ClassifierUnavailable(String),

    /// Classifier returned text that is not valid per the output contract,
    /// carrying the problems found so the repair pass can quote them
    #[error("classifier output malformed: {}", problems.join("; "))]
    MalformedOutput { problems: Vec<String> },

    /// The session store could not load or save a state blob
    #[error("session store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
