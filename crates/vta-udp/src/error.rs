//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A previous worker has not finished closing yet
    #[error("Transport {0} still has an open worker")]
    AlreadyRunning(String),

    #[error("Bind failed on port {port}: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("Cannot resolve remote address {0}")]
    Resolve(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
}
