// Extraction failures that make a whole document unusable.
//
// Everything softer (bad cells, missing header fields, misaligned rows) is
// handled inline by returning None and skipping.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("document is empty (0 bytes)")]
    EmptyInput,

    #[error("document could not be read: {0}")]
    Unreadable(String),

    #[error("document produced no pages, tables or text")]
    NoContent,

    #[error("PDF support not compiled in (enable the `pdf` feature)")]
    BackendUnavailable,
}
