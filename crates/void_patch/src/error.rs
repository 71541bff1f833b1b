//! Error types for document patching

use thiserror::Error;

/// Errors raised while parsing pointers or applying patch operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Pointer text is not a valid document path
    #[error("Invalid document pointer '{0}'")]
    InvalidPointer(String),

    /// Nothing exists at the addressed path
    #[error("Path not found: '{0}'")]
    PathNotFound(String),

    /// Array index outside the valid range for the operation
    #[error("Index {index} out of bounds at '{path}' (length {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    /// The parent of the addressed path is a scalar
    #[error("Value at '{0}' is not an object or array")]
    NotAContainer(String),

    /// A remove op targeted the document root
    #[error("Cannot remove the document root")]
    RootRemoval,

    /// A patch could not be converted to or from its document form
    #[error("Patch serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PatchError {
    fn from(err: serde_json::Error) -> Self {
        PatchError::Serialization(err.to_string())
    }
}

/// Result type for patch operations
pub type Result<T> = std::result::Result<T, PatchError>;
