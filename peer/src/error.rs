//! Failures of the transport layer.

use shared::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("could not connect to {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl NetError {
    /// Whether the stream this error came from is unusable from now on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetError::Wire(WireError::UnknownKind(_)))
    }
}
