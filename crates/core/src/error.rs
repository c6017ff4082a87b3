//! Error types for visreg

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the visreg Error
pub type Result<T> = std::result::Result<T, Error>;

/// visreg error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source is unreachable: {}", path.display())]
    SourceUnreachable { path: PathBuf },

    #[error("Malformed mask filename '{0}': expected <name>.<flags>.<extension>")]
    MalformedMaskFilename(String),

    #[error("Directory is unreadable: {}: {source}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Listener resolution failed: {0}")]
    ListenerResolutionFailed(String),

    #[error("Listener '{listener}' failed: {reason}")]
    ListenerInvocationFailed { listener: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Comparison failed: {0}")]
    Comparison(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Shorthand for a retrieval failure at `path`
    pub fn unreachable(path: impl Into<PathBuf>) -> Self {
        Error::SourceUnreachable { path: path.into() }
    }
}
