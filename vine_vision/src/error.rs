//! Error types for vine_vision
//!
//! Rejections ("this is not a grape leaf") are normal outcomes and never show up
//! here. These enums cover transport failures, which end a run in `Failed`, and
//! everything that can go wrong before a run starts.

use thiserror::Error;

/// Failure talking to one of the inference services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection, TLS or request-building failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("Service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not the JSON we expected.
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Crate-level error type
#[derive(Debug, Error)]
pub enum VineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Upload admission refused the file's MIME type.
    #[error("Unsupported image type: {0}")]
    UnsupportedMime(String),

    /// The classifier returned a label outside the known disease table.
    #[error("Unrecognized disease class: {0}")]
    UnknownClass(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for vine_vision operations
pub type Result<T> = std::result::Result<T, VineError>;
