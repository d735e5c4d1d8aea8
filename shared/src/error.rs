//! Error types for the tutoring workspace.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tutoring workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload rejected at the boundary (only PNG is accepted)
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conversational request is already pending for this session
    #[error("A request is already in flight for this session")]
    RequestInFlight,

    /// The remote model could not decode or process the attached image
    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    /// Any other model gateway failure
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::RequestInFlight => 409,
            Error::UnsupportedFileType(_) => 415,
            Error::ImageProcessing(_) | Error::Gateway(_) => 502,
            _ => 500,
        }
    }
}
