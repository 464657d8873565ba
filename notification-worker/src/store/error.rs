use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error types for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The platform API could not be reached
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The platform API answered with a non-success status
    #[error("store returned {status} for {context}")]
    Status {
        /// HTTP status of the response
        status: reqwest::StatusCode,
        /// Operation that failed
        context: String,
    },

    /// A stored record could not be decoded
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}
