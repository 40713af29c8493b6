//! FDNS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, error handling and logging setup for the FDNS loader
//! workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the shared [`FdnsError`] type and `Result` alias
//! - **Logging**: `tracing` subscriber configuration used by every binary
//! - **Types**: the normalized FDNS record persisted by the ingest pipeline

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{FdnsError, Result};
pub use types::NormalizedRecord;
