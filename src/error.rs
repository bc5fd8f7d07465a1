// src/error.rs

//! The crate's distinguishable error values.
//!
//! Fallible APIs return `anyhow::Result`; callers that need to react to a
//! specific failure (a corrupt file vs. an I/O problem, say) can downcast
//! to `DocumentError`. Programming-error faults (out-of-bounds checked
//! pixel access, target-size mismatches, bad layer indices) panic instead
//! of returning: they indicate a caller bug, not a runtime condition.

use std::fmt;

/// Recoverable failures the engine can report to a caller.
#[derive(Debug)]
pub enum DocumentError {
    /// The stream is not a valid document: bad magic/marker combination,
    /// malformed header, truncated or inconsistent body.
    InvalidFormat(String),
    /// The body schema version is newer than this build understands.
    UnsupportedVersion(u16),
    /// A layer's surface size does not match the document canvas.
    LayerSizeMismatch {
        expected: (i32, i32),
        actual: (i32, i32),
    },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::InvalidFormat(detail) => {
                write!(f, "stream is not a valid document: {}", detail)
            }
            DocumentError::UnsupportedVersion(version) => {
                write!(f, "document body schema version {} is not supported", version)
            }
            DocumentError::LayerSizeMismatch { expected, actual } => write!(
                f,
                "layer surface is {}x{} but the document canvas is {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
        }
    }
}

impl std::error::Error for DocumentError {}
