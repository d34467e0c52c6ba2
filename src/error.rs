//! Error types for PDF generation.
//!
//! A [`Document`](crate::writer::Document) keeps the first error it hits and
//! turns every later call into a no-op, so the error type is cheap to clone.

use std::sync::Arc;

/// Result type alias for PDF generation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while building a document.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Missing or unreadable resource (font definition, font file, image file)
    #[error("Input error: {0}")]
    Input(String),

    /// Malformed resource structure (PNG/JPEG/GIF layout, font width table)
    #[error("Format error: {0}")]
    Format(String),

    /// Invalid configuration value or undefined font
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure writing the final byte stream
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Input(format!("invalid font definition: {}", err))
    }
}
