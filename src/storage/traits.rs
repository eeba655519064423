//! Storage traits and error types
//!
//! This module defines the trait interface for page storage backends and
//! associated error types.

use crate::transform::Document;
use crate::url::CanonicalUrl;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to move temporary file into place: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for page storage backends
///
/// Implementations must be safe to call from several workers at once and must
/// write each page all-or-nothing.
pub trait PageStore: Send + Sync {
    /// Writes `document` and returns the path it was written to
    ///
    /// Storing the same document twice overwrites the same path.
    fn store(&self, document: &Document) -> StorageResult<PathBuf>;

    /// Path a page with this URL is (or would be) written to
    fn path_for(&self, url: &CanonicalUrl) -> PathBuf;
}
