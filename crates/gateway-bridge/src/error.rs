use broker_transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = BridgeError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("reading config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("metrics init error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("listener error: {0}")]
    Listen(#[from] std::io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
