//! Common error types for the core models

use thiserror::Error;

/// Result type for core conversions
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while converting raw values into core models
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Raw bus type identifier is not one we know about
    #[error("Unknown bus type: 0x{0:02X}")]
    UnknownBusType(u8),

    /// Bus name could not be parsed
    #[error("Invalid bus name: {0}")]
    InvalidBusName(String),
}
