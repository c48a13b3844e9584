//! Input/output filename expansion.
//!
//! `--query-file` and `--output-file` each accept either one path or a
//! `.list` file naming one path per line; both sides must expand to the
//! same number of entries, pairing input `i` with output `i`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SbwtqError};

/// Expand one CLI argument into its path list.
pub fn expand<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if path.extension().is_some_and(|e| e == "list") {
        let content = fs::read_to_string(path).map_err(|e| SbwtqError::io(path, e))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    } else {
        Ok(vec![path.to_path_buf()])
    }
}

/// Expand both sides and check they pair up.
pub fn expand_pairs<P: AsRef<Path>>(
    query_file: P,
    output_file: P,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let inputs = expand(query_file)?;
    let outputs = expand(output_file)?;
    if inputs.len() != outputs.len() {
        return Err(SbwtqError::InvalidParameter {
            parameter: "output-file".to_string(),
            reason: format!(
                "{} input files but {} output files",
                inputs.len(),
                outputs.len()
            ),
        });
    }
    Ok((inputs, outputs))
}
