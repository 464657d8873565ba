use thiserror::Error;

/// Result type alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Error types for broker operations
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Error from the underlying AMQP client
    #[error("broker operation failed: {0}")]
    Amqp(#[from] lapin::Error),

    /// The broker refused or never confirmed a published message
    #[error("publish was not confirmed by the broker: {0}")]
    Unconfirmed(String),

    /// Error serializing a message body to JSON
    #[error("failed to serialize message")]
    Serialization(#[from] serde_json::Error),
}
