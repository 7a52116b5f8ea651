//! Unified error handling for the jitter buffer.
//!
//! All fallible operations in this crate return [`JitterResult`], keeping
//! error construction and matching in one place.

use thiserror::Error;

/// Main error type for jitter buffer operations.
#[derive(Debug, Error)]
pub enum JitterError {
    /// I/O related errors (virtual memory setup).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Virtual memory mapping or release errors.
    #[error("memory error: {0}")]
    Memory(String),

    /// Operation not supported on this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Convenience type alias for Results using [`JitterError`].
pub type JitterResult<T> = std::result::Result<T, JitterError>;

impl JitterError {
    /// Create an invalid argument error with a custom message.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        JitterError::InvalidArgument(msg.into())
    }

    /// Create a memory error with a custom message.
    pub fn memory<S: Into<String>>(msg: S) -> Self {
        JitterError::Memory(msg.into())
    }

    /// Create an unsupported-platform error with a custom message.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        JitterError::Unsupported(msg.into())
    }
}
