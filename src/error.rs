//! Error types for the `hmc-ingest` crate.
//!
//! This module defines [`IngestError`], the unified error type returned by all
//! fallible operations in the crate. Validation and processing failures carry
//! a specific, actionable message; external tool failures additionally carry
//! the command line and the tool's captured output so operators can tell the
//! two apart.

use std::io::Error as IoError;

use thiserror::Error;

/// The unified error type for all `hmc-ingest` operations.
///
/// Every public method that can fail returns `Result<T, IngestError>`.
/// There is no retry policy anywhere in the pipeline; every error aborts the
/// run and is surfaced to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// A validation or processing failure in this tool's own logic.
    ///
    /// The message names the offending file, field, or mismatched count.
    #[error("{0}")]
    Conversion(String),

    /// The external media tool was launched but failed, or could not be
    /// launched at all.
    ///
    /// Carries the full command line and the captured standard output and
    /// standard error text, so "this tool's precondition failed" is
    /// distinguishable from "the external decoder itself failed".
    #[error("External tool failed: {command}\n  stdout: {stdout}\n  stderr: {stderr}")]
    Tool {
        /// The command line that was executed.
        command: String,
        /// Captured standard output of the tool.
        stdout: String,
        /// Captured standard error of the tool.
        stderr: String,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl IngestError {
    /// Build an [`IngestError::Conversion`] from any displayable message.
    pub fn conversion(message: impl Into<String>) -> Self {
        IngestError::Conversion(message.into())
    }
}
