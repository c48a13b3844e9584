//! Input validation utilities.
//!
//! Common validation for command-line parameters and file paths with
//! consistent error messages, using the structured error types from
//! [`crate::errors`].

use std::path::Path;

use crate::errors::{Result, SbwtqError};

/// Validate that a file exists.
///
/// # Errors
/// Returns an error if the file does not exist.
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(SbwtqError::InvalidParameter {
            parameter: description.to_string(),
            reason: format!("file '{}' does not exist", path_ref.display()),
        });
    }
    Ok(())
}

/// Validate that a fraction lies in `[0, 1]`.
pub fn validate_fraction(value: f64, parameter: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SbwtqError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: format!("{value} is not between 0 and 1"),
        });
    }
    Ok(())
}

/// Validate that a count is non-zero.
pub fn validate_nonzero(value: u64, parameter: &str) -> Result<()> {
    if value == 0 {
        return Err(SbwtqError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
