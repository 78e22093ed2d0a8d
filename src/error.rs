// src/error.rs

use thiserror::Error;

/// Core error types for Libshelf
#[derive(Error, Debug)]
pub enum Error {
    /// A structured library declaration is missing its URL
    #[error("The library '{library}' declared by '{package}' does not contain a valid URL")]
    InvalidDeclaration { library: String, package: String },

    /// Project or included source file could not be read or parsed
    #[error("Invalid project configuration: {0}")]
    Project(String),

    /// Transport-level download failure
    #[error("Download error: {0}")]
    Download(String),

    /// Fetching one library failed; aborts the run after siblings settle
    #[error("Failed to fetch library '{library}': {reason}")]
    Fetch { library: String, reason: String },

    /// Post-processing (ignore/rename) failed for one library
    #[error("Failed to post-process library '{library}': {reason}")]
    PostProcess { library: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State document (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using Libshelf's Error type
pub type Result<T> = std::result::Result<T, Error>;
