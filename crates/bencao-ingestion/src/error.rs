//! Import error types.

use std::path::PathBuf;

use bencao_common::ValidationError;
use bencao_db::DbError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("meridian not found: {meridian}")]
    ReferenceNotFound { meridian: String },

    #[error("meridian name is ambiguous: {meridian} matches {matches} rows")]
    AmbiguousReference { meridian: String, matches: usize },

    #[error("storage error: {0}")]
    Storage(#[from] DbError),

    #[error("format error: {0}")]
    Format(String),

    #[error("cannot write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("import cancelled")]
    Cancelled,
}
