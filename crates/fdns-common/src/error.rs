//! Error types shared across the FDNS loader workspace

use thiserror::Error;

/// Result type alias for FDNS loader operations
pub type Result<T> = std::result::Result<T, FdnsError>;

/// Shared error type for concerns that cross crate boundaries
#[derive(Error, Debug)]
pub enum FdnsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),
}
