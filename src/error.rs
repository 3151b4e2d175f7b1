//! Error types for n6pack.
//!
//! # Error Message Style Guide
//!
//! - **Format**: `"<operation> failed: <reason>"` or `"<thing> mismatch: expected X, got Y"`
//! - **Case**: All lowercase
//! - **Context**: Include the path, field or check that failed
//!
//! ```text
//! "config load failed: n6pack.toml: No such file or directory"
//! "model checksum mismatch: expected 0x1a2b3c4d, got 0x00000000"
//! "version header write failed: Custom/Common/Inc/version.h: permission denied"
//! ```

use n6pack_format::{ErrorKind, PackError};
use thiserror::Error;

/// Result type alias using n6pack's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in n6pack operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Container codec failure.
    #[error(transparent)]
    Pack(#[from] PackError),

    /// Configuration could not be loaded or parsed.
    #[error("config {operation} failed: {reason}")]
    Config {
        /// The operation that failed (e.g., "load", "parse").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Version header generation failed.
    #[error("version header {operation} failed: {reason}")]
    VersionHeader {
        /// The operation that failed (e.g., "read", "write").
        operation: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A verification ran to completion and reported failures.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// I/O error outside the container codec.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a config error.
    pub fn config(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a version header error.
    pub fn version_header(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::VersionHeader {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Classification of the underlying container error, if any.
    pub fn pack_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Pack(e) => Some(e.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_error_is_transparent() {
        let err: Error = PackError::MissingConfigKey("model_info").into();
        assert_eq!(
            err.to_string(),
            "model config missing required field: model_info"
        );
        assert_eq!(err.pack_kind(), Some(ErrorKind::Precondition));
    }

    #[test]
    fn test_config_error_format() {
        let err = Error::config("parse", "n6pack.toml: unknown field `foo`");
        assert_eq!(
            err.to_string(),
            "config parse failed: n6pack.toml: unknown field `foo`"
        );
        assert_eq!(err.pack_kind(), None);
    }
}
