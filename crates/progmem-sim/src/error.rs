//! Error types for the simulated controller

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Simulator errors
#[derive(Debug, Error)]
pub enum SimError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to read an image file
    #[error("Failed to read image '{path}': {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write an image file
    #[error("Failed to write image '{path}': {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Image size does not match the simulated array
    #[error("Image is {found} bytes, flash array is {expected} bytes")]
    ImageSize { expected: usize, found: usize },
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;
