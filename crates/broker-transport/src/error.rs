use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid broker url: {0}")]
    InvalidBrokerUrl(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("timeout")]
    Timeout,
    #[error("disconnected")]
    Disconnected,
}
