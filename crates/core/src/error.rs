//! Error types for the roomcast core

use thiserror::Error;

/// Result type alias for roomcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while managing a publisher endpoint
#[derive(Debug, Error)]
pub enum Error {
    /// Operation requires a node or connection that does not exist yet
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A media element with the same id is already part of the chain
    #[error("Media element already exists: {0}")]
    AlreadyExists(String),

    /// No media element with the given id
    #[error("Media element not found: {0}")]
    NotFound(String),

    /// The media engine rejected an operation
    #[error("Engine error: {0}")]
    Engine(String),
}
