//! Error types for geometry operations.

use thiserror::Error;

/// Result type alias using GeometryError.
pub type GeometryResult<T> = Result<T, GeometryError>;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Invalid extent: {message} ({value})")]
    BadExtent { message: String, value: String },

    #[error("Invalid spatial reference: {0}")]
    BadSpatialReference(String),

    #[error("Operation requires a geographic or Web Mercator spatial reference: {0}")]
    UnsupportedProjection(String),

    #[error("Invalid WKT at position {position}: {message}")]
    InvalidWkt { position: usize, message: String },

    #[error("Invalid tile levels: {0}")]
    InvalidTileLevels(String),
}

impl GeometryError {
    pub(crate) fn bad_extent(message: impl Into<String>, value: impl ToString) -> Self {
        GeometryError::BadExtent {
            message: message.into(),
            value: value.to_string(),
        }
    }
}
