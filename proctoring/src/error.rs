//! Top-level error type for monitor operations
//!
//! Decode and analysis failures never reach this type; they are settled to
//! "no violation" inside the dispatcher. What remains are failures of the
//! external collaborators the monitor drives.

use thiserror::Error;

use crate::config::ConfigError;
use crate::session::StoreError;

/// Result type alias for monitor operations
pub type ProctorResult<T> = Result<T, ProctorError>;

/// Error type for monitor and escalation operations
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
