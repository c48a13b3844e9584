//! Custom error types for sbwtq operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sbwtq operations
pub type Result<T> = std::result::Result<T, SbwtqError>;

/// Error type for sbwtq operations
#[derive(Error, Debug)]
pub enum SbwtqError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// The batch planner could not fit a single character into the budget
    #[error("Not enough memory")]
    NotEnoughMemory,

    /// Unknown result-stream encoding name
    #[error("Invalid value passed by user for argument print_mode: '{0}'")]
    UnknownPrintMode(String),

    /// I/O error with the path that produced it
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        /// Path of the file being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Malformed data in a result-stream file
    #[error("Invalid data in '{}' at byte offset {offset}: {reason}", path.display())]
    Format {
        /// Path of the offending file
        path: PathBuf,
        /// Byte offset at which the problem was detected
        offset: u64,
        /// Explanation of the problem
        reason: String,
    },

    /// Device-side failure; always fatal for the current run
    #[error("Accelerator error: {0}")]
    Gpu(String),
}

impl SbwtqError {
    /// Attach a path to a bare I/O error.
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        SbwtqError::Io { path: path.into(), source }
    }

    /// Build a format error for `path` at `offset`.
    pub fn format<P: Into<PathBuf>, S: Into<String>>(path: P, offset: u64, reason: S) -> Self {
        SbwtqError::Format { path: path.into(), offset, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter() {
        let error = SbwtqError::InvalidParameter {
            parameter: "threshold".to_string(),
            reason: "must be between 0 and 1".to_string(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("Invalid parameter 'threshold'"));
        assert!(msg.contains("must be between 0 and 1"));
    }

    #[test]
    fn test_not_enough_memory_message() {
        assert_eq!(format!("{}", SbwtqError::NotEnoughMemory), "Not enough memory");
    }

    #[test]
    fn test_format_error_carries_offset() {
        let error = SbwtqError::format("/tmp/results.pint", 42, "Packed int too large");
        let msg = format!("{error}");
        assert!(msg.contains("/tmp/results.pint"));
        assert!(msg.contains("42"));
        assert!(msg.contains("Packed int too large"));
    }
}
