//! Error types for the render pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a poster
#[derive(Error, Debug)]
pub enum Error {
    /// The Markdown source does not exist
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Failed to write the staged content document
    #[error("Failed to stage content at {}: {source}", path.display())]
    StageError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output location could not be determined or prepared
    #[error("Output path unavailable: {0}")]
    OutputError(String),

    /// The front-end server could not be started or exited early
    #[error("Front-end server failed: {0}")]
    ServerError(String),

    /// The front-end server never became reachable
    #[error("Front-end server not ready at {url} after {timeout_ms}ms")]
    ServerStartTimeout { url: String, timeout_ms: u64 },

    /// Failed to launch the browser
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the front-end page
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// The capture anchor never appeared in the page
    #[error("Capture element `{0}` not found")]
    ElementNotFound(String),

    /// Failed to produce the screenshot
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to write the captured image
    #[error("Failed to write image to {}: {source}", path.display())]
    CaptureIoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The render was cancelled by a shutdown signal
    #[error("Render interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
