//! Error types for the simdex library.
//!
//! All fallible operations return [`Result`], and every failure carries a
//! specific [`SimdexError`] kind so callers can decide whether to retry,
//! skip, or fail the surrounding request.

use std::io;

use thiserror::Error;

/// The main error type for simdex operations.
#[derive(Error, Debug)]
pub enum SimdexError {
    /// A vector's length does not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An external identifier was added twice.
    #[error("duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// An external identifier is unknown to the index.
    #[error("identifier not found: {0}")]
    NotFound(String),

    /// The nearest-neighbor backend failed to initialize or is in a
    /// broken state.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Save/load I/O failure or an incomplete persisted bundle.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The validator detected drift it could not repair.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid index configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for operations that may fail with [`SimdexError`].
pub type Result<T> = std::result::Result<T, SimdexError>;

impl From<Box<bincode::ErrorKind>> for SimdexError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        SimdexError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SimdexError {
    fn from(e: serde_json::Error) -> Self {
        SimdexError::Serialization(e.to_string())
    }
}

impl SimdexError {
    /// Create a new backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        SimdexError::BackendUnavailable(msg.into())
    }

    /// Create a new persistence error.
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        SimdexError::Persistence(msg.into())
    }

    /// Create a new consistency error.
    pub fn consistency<S: Into<String>>(msg: S) -> Self {
        SimdexError::Consistency(msg.into())
    }

    /// Create a new invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        SimdexError::InvalidConfig(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(id: S) -> Self {
        SimdexError::NotFound(id.into())
    }
}
